//! Stream rate capping for presentation consumers.
//!
//! A plotting GUI polling decoded values has no use for every frame on a
//! busy bus; it wants the freshest value at its own redraw cadence. The
//! [`LatestEveryExt`] combinator caps any stream to one item per
//! interval with latest-wins semantics: items arriving between
//! emissions replace each other and only the newest goes out. The first
//! item is emitted immediately; each emission then arms a full quiet
//! period before the next, so a burst after a lull still renders without
//! the initial lag a free-running ticker would add.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait adding rate capping to any stream.
pub trait LatestEveryExt: Stream {
    /// Emit at most one item per `period`, keeping only the latest item
    /// seen since the previous emission. The first item passes through
    /// without waiting.
    fn latest_every(self, period: Duration) -> LatestEvery<Self>
    where
        Self: Sized,
    {
        LatestEvery::new(self, period)
    }
}

impl<S: Stream> LatestEveryExt for S {}

pin_project! {
    /// Stream combinator produced by [`LatestEveryExt::latest_every`].
    pub struct LatestEvery<S: Stream> {
        #[pin]
        stream: S,
        pacer: Interval,
        pending: Option<S::Item>,
        done: bool,
    }
}

impl<S: Stream> LatestEvery<S> {
    fn new(stream: S, period: Duration) -> Self {
        let mut pacer = interval(period);
        // Catching up after a stall would burst stale emissions.
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { stream, pacer, pending: None, done: false }
    }
}

impl<S: Stream> Stream for LatestEvery<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Pull everything currently available; the newest item wins.
        // An ended inner stream is never polled again.
        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        if this.pending.is_some() {
            // The pacer's first tick is immediate, so the very first
            // item goes straight out. Resetting after each emission
            // arms a full quiet period; an idle stretch with nothing
            // pending consumes no ticks.
            ready!(this.pacer.poll_tick(cx));
            this.pacer.reset();
            return Poll::Ready(this.pending.take());
        }

        if *this.done { Poll::Ready(None) } else { Poll::Pending }
    }
}
