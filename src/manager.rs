//! Reconfiguration manager and task lifecycle.
//!
//! The running core is three tasks in fixed roles: one reader task
//! owning the active byte source (read chunk → transport buffer), one
//! framer task (transport buffer → frame store), and the control loop
//! that drains the two reconfiguration queues. Database requests mark
//! the source registry dirty and trigger a recompile whose result is
//! published atomically over a watch channel; source requests replace
//! the reader task through a [`ReaderHandle`] whose stop is always
//! cancel-then-join, so switching sources is a single
//! replace-the-handle operation on every path.
//!
//! Every `request_*` method only enqueues and returns immediately; the
//! effect becomes visible to `read_frame`/`decode`/`list_*` once the
//! control loop drains its queue. At most one rebuild is ever in
//! flight: requests arriving while one is pending coalesce into the
//! next.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::database::Database;
use crate::frame::Frame;
use crate::framer::Framer;
use crate::registry::SourceRegistry;
use crate::source::{ByteSource, SourceConfig};
use crate::store::FrameStore;
use crate::transport::TransportBuffer;
use crate::{CoreError, Result};

/// Asynchronous description-database operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseRequest {
    /// Enable a built-in description by name.
    LoadBuiltin(String),
    /// Disable a built-in description by name.
    UnloadBuiltin(String),
    /// Add a description file. Idempotent.
    LoadFile(PathBuf),
    /// Remove a description file.
    UnloadFile(PathBuf),
}

/// Asynchronous byte-source operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    /// Tear down the current source (if any) and activate this one.
    Activate(SourceConfig),
    /// Tear down the current source and stay idle.
    Disconnect,
}

/// Current state of the byte-source side of the core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceStatus {
    /// No source active.
    #[default]
    Idle,
    /// A reader task is streaming from this endpoint.
    Streaming {
        /// Endpoint description, e.g. `tcp 10.0.0.5:5700`.
        endpoint: String,
    },
}

impl SourceStatus {
    /// Whether a source is currently streaming.
    pub fn is_connected(&self) -> bool {
        matches!(self, SourceStatus::Streaming { .. })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owned reader-task lifecycle: dropping into [`stop`](Self::stop)
/// always signals cancellation and joins, so no path can leak a
/// half-dead reader or leave two readers running.
struct ReaderHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaderHandle {
    fn spawn(
        source: Box<dyn ByteSource>,
        buffer: Arc<TransportBuffer>,
        chunk: usize,
        status: watch::Sender<SourceStatus>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            reader_task(source, buffer, chunk, status, token).await;
        });
        Self { cancel, task }
    }

    /// Cancel the task and wait for it to return. Teardown latency is
    /// bounded by one pending source read, which the task races against
    /// its token.
    async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Reader task: pull chunks from the source, push them into the
/// transport buffer, until cancelled or the source ends.
async fn reader_task(
    mut source: Box<dyn ByteSource>,
    buffer: Arc<TransportBuffer>,
    chunk: usize,
    status: watch::Sender<SourceStatus>,
    cancel: CancellationToken,
) {
    let endpoint = source.describe();
    info!(source = %endpoint, "reader task started");
    let _ = status.send(SourceStatus::Streaming { endpoint: endpoint.clone() });

    let mut buf = vec![0u8; chunk];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            result = source.read_chunk(&mut buf) => result,
        };
        match read {
            Ok(0) => {
                warn!(source = %endpoint, "byte source ended");
                break;
            }
            Ok(count) => {
                // Backpressure: a full buffer parks the reader here.
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = buffer.write(&buf[..count]) => {}
                }
            }
            Err(err) => {
                warn!(source = %endpoint, %err, "byte source failed");
                break;
            }
        }
    }

    let _ = status.send(SourceStatus::Idle);
    info!(source = %endpoint, "reader task ended");
}

/// Framer task: drain the transport buffer through the line-protocol
/// state machine into the frame store, publishing a running frame count.
async fn framer_task(
    buffer: Arc<TransportBuffer>,
    store: Arc<FrameStore>,
    chunk: usize,
    frames: watch::Sender<u64>,
    cancel: CancellationToken,
) {
    let mut framer = Framer::new(store);
    let mut buf = vec![0u8; chunk];
    let mut total = 0u64;
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            count = buffer.read(&mut buf) => count,
        };
        let dispatched = framer.feed(&buf[..read]);
        if dispatched > 0 {
            total += dispatched as u64;
            let _ = frames.send(total);
        }
    }
    debug!(frames = total, "framer task ended");
}

fn apply_database_request(registry: &Mutex<SourceRegistry>, request: DatabaseRequest) -> bool {
    let mut registry = lock(registry);
    match request {
        DatabaseRequest::LoadBuiltin(name) => registry.enable_builtin(&name),
        DatabaseRequest::UnloadBuiltin(name) => registry.disable_builtin(&name),
        DatabaseRequest::LoadFile(path) => registry.add_file(path),
        DatabaseRequest::UnloadFile(path) => registry.remove_file(&path),
    }
}

/// Control loop: drains both request queues, owns the reader lifecycle,
/// and performs database rebuilds outside the registry lock.
async fn control_loop(
    mut database_rx: mpsc::UnboundedReceiver<DatabaseRequest>,
    mut source_rx: mpsc::UnboundedReceiver<SourceRequest>,
    registry: Arc<Mutex<SourceRegistry>>,
    database_tx: watch::Sender<Arc<Database>>,
    buffer: Arc<TransportBuffer>,
    status_tx: watch::Sender<SourceStatus>,
    chunk: usize,
    cancel: CancellationToken,
) {
    let mut reader: Option<ReaderHandle> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            request = database_rx.recv() => {
                let Some(request) = request else { break };
                let mut dirty = apply_database_request(&registry, request);
                // Coalesce everything already queued into one rebuild.
                while let Ok(next) = database_rx.try_recv() {
                    dirty |= apply_database_request(&registry, next);
                }
                if dirty {
                    let snapshot = lock(&registry).snapshot();
                    let database = snapshot.compile().await;
                    info!(messages = database.message_count(), "publishing rebuilt database");
                    database.debug_dump();
                    let _ = database_tx.send(Arc::new(database));
                }
            }
            request = source_rx.recv() => {
                let Some(mut request) = request else { break };
                // Only the newest outstanding source request matters;
                // switching through intermediate sources would churn
                // connections for nothing.
                while let Ok(next) = source_rx.try_recv() {
                    request = next;
                }
                if let Some(handle) = reader.take() {
                    handle.stop().await;
                }
                match request {
                    SourceRequest::Disconnect => {
                        info!("source cleared by request");
                    }
                    SourceRequest::Activate(config) => match config.open().await {
                        Ok(source) => {
                            reader = Some(ReaderHandle::spawn(
                                source,
                                Arc::clone(&buffer),
                                chunk,
                                status_tx.clone(),
                                &cancel,
                            ));
                        }
                        Err(err) => {
                            // Leave no active source; the operator retries.
                            warn!(source = %config, %err, "failed to activate source");
                        }
                    },
                }
            }
        }
    }

    if let Some(handle) = reader.take() {
        handle.stop().await;
    }
    debug!("control loop ended");
}

/// Clonable query-and-request surface of a running core.
///
/// Reads take short per-entry locks or a watch borrow; requests enqueue
/// and return immediately.
#[derive(Clone)]
pub struct CoreHandle {
    store: Arc<FrameStore>,
    registry: Arc<Mutex<SourceRegistry>>,
    database_rx: watch::Receiver<Arc<Database>>,
    frames_rx: watch::Receiver<u64>,
    status_rx: watch::Receiver<SourceStatus>,
    database_tx: mpsc::UnboundedSender<DatabaseRequest>,
    source_tx: mpsc::UnboundedSender<SourceRequest>,
}

impl CoreHandle {
    /// Latest frame observed for an identifier, if any.
    pub fn read_frame(&self, id: u16) -> Option<Frame> {
        self.store.read(id)
    }

    /// Decode a frame against the active database; `None` when the
    /// identifier has no compiled message (callers typically fall back
    /// to the frame's raw `Display` rendering).
    pub fn decode(&self, id: u16, frame: &Frame) -> Option<String> {
        self.database().decode(u32::from(id), frame)
    }

    /// [`decode`](Self::decode) with a caller-chosen pair separator.
    pub fn decode_with_separator(&self, id: u16, frame: &Frame, separator: &str) -> Option<String> {
        self.database().decode_with_separator(u32::from(id), frame, separator)
    }

    /// Numeric physical values per signal, for plotting consumers.
    pub fn decode_signals(&self, id: u16, frame: &Frame) -> Option<Vec<(String, f64)>> {
        self.database().decode_signals(u32::from(id), frame)
    }

    /// The currently active compiled database.
    pub fn database(&self) -> Arc<Database> {
        self.database_rx.borrow().clone()
    }

    /// Stream of database publications, starting with the current one.
    pub fn database_updates(&self) -> impl Stream<Item = Arc<Database>> + use<> {
        WatchStream::new(self.database_rx.clone())
    }

    /// Watch receiver over the running dispatched-frame count. Await
    /// `changed()` to learn that new data reached the store.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.frames_rx.clone()
    }

    /// Stream of dispatched-frame counts; combine with
    /// [`LatestEveryExt`](crate::stream::LatestEveryExt) to poll at a
    /// redraw cadence.
    pub fn frame_updates(&self) -> impl Stream<Item = u64> + use<> {
        WatchStream::new(self.frames_rx.clone())
    }

    /// Names and enabled flags of the built-in descriptions.
    pub fn list_builtin_sources(&self) -> Vec<(String, bool)> {
        lock(&self.registry).list_builtins()
    }

    /// Paths of the currently loaded description files.
    pub fn list_loaded_files(&self) -> Vec<PathBuf> {
        lock(&self.registry).list_files()
    }

    /// Request enabling a built-in description. Fire-and-forget.
    pub fn request_load_builtin(&self, name: impl Into<String>) {
        let _ = self.database_tx.send(DatabaseRequest::LoadBuiltin(name.into()));
    }

    /// Request disabling a built-in description. Fire-and-forget.
    pub fn request_unload_builtin(&self, name: impl Into<String>) {
        let _ = self.database_tx.send(DatabaseRequest::UnloadBuiltin(name.into()));
    }

    /// Request loading a description file. Fire-and-forget, idempotent.
    pub fn request_load_file(&self, path: impl Into<PathBuf>) {
        let _ = self.database_tx.send(DatabaseRequest::LoadFile(path.into()));
    }

    /// Request unloading a description file. Fire-and-forget.
    pub fn request_unload_file(&self, path: impl Into<PathBuf>) {
        let _ = self.database_tx.send(DatabaseRequest::UnloadFile(path.into()));
    }

    /// Request switching to a serial source. Fire-and-forget.
    pub fn request_serial(&self, path: impl Into<String>, baud: u32) {
        let config = SourceConfig::Serial { path: path.into(), baud };
        let _ = self.source_tx.send(SourceRequest::Activate(config));
    }

    /// Request switching to a network source. An empty address listens
    /// instead of connecting. Fire-and-forget.
    pub fn request_network(&self, address: impl Into<String>, port: u16) {
        let config = SourceConfig::Network { address: address.into(), port };
        let _ = self.source_tx.send(SourceRequest::Activate(config));
    }

    /// Request tearing down the active source. Fire-and-forget.
    pub fn request_disconnect(&self) {
        let _ = self.source_tx.send(SourceRequest::Disconnect);
    }

    /// Current source state.
    pub fn source_status(&self) -> SourceStatus {
        self.status_rx.borrow().clone()
    }

    /// Whether a byte source is currently streaming.
    pub fn is_connected(&self) -> bool {
        self.source_status().is_connected()
    }
}

/// A running telemetry core.
///
/// Owns the worker tasks; dropping it (or calling
/// [`shutdown`](Self::shutdown)) cancels them all. Cheap clonable
/// handles for other tasks come from [`handle`](Self::handle); the core
/// itself derefs to a handle for direct use.
pub struct TelemetryCore {
    handle: CoreHandle,
    cancel: CancellationToken,
}

impl TelemetryCore {
    /// Build and start a core from its configuration.
    ///
    /// The initial database is compiled before this returns, so
    /// `decode` against configured builtins works immediately. The
    /// configured startup source (if any) is activated through the
    /// ordinary request path and may still be connecting on return.
    pub async fn start(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(FrameStore::new());
        let buffer = Arc::new(TransportBuffer::new(config.transport.capacity));
        let chunk = config.transport.read_chunk;

        let mut registry = SourceRegistry::new();
        for name in &config.builtins {
            // A repeated name is harmless; only a name that does not
            // exist at all is a configuration error.
            if !registry.contains_builtin(name) {
                return Err(CoreError::config_error(format!("unknown builtin '{name}'")));
            }
            registry.enable_builtin(name);
        }
        for path in &config.dbc_files {
            registry.add_file(path.clone());
        }
        let initial = registry.snapshot().compile().await;
        info!(messages = initial.message_count(), "initial database compiled");

        let registry = Arc::new(Mutex::new(registry));
        let (database_tx, database_rx) = watch::channel(Arc::new(initial));
        let (frames_tx, frames_rx) = watch::channel(0u64);
        let (status_tx, status_rx) = watch::channel(SourceStatus::Idle);
        let (database_req_tx, database_req_rx) = mpsc::unbounded_channel();
        let (source_req_tx, source_req_rx) = mpsc::unbounded_channel();

        let cancel = CancellationToken::new();

        tokio::spawn(framer_task(
            Arc::clone(&buffer),
            Arc::clone(&store),
            chunk,
            frames_tx,
            cancel.child_token(),
        ));
        tokio::spawn(control_loop(
            database_req_rx,
            source_req_rx,
            Arc::clone(&registry),
            database_tx,
            Arc::clone(&buffer),
            status_tx,
            chunk,
            cancel.child_token(),
        ));

        let handle = CoreHandle {
            store,
            registry,
            database_rx,
            frames_rx,
            status_rx,
            database_tx: database_req_tx,
            source_tx: source_req_tx,
        };

        if let Some(source) = &config.source {
            let _ = handle.source_tx.send(SourceRequest::Activate(source.clone()));
        }

        Ok(Self { handle, cancel })
    }

    /// A clonable handle for other tasks and threads.
    pub fn handle(&self) -> CoreHandle {
        self.handle.clone()
    }

    /// Cancel all worker tasks and return once cancellation is signalled.
    pub fn shutdown(self) {
        self.cancel.cancel();
    }
}

impl std::ops::Deref for TelemetryCore {
    type Target = CoreHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for TelemetryCore {
    fn drop(&mut self) {
        debug!("telemetry core dropped, cancelling tasks");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    async fn settle_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition never settled");
    }

    #[tokio::test]
    async fn starts_idle_and_empty() {
        let core = TelemetryCore::start(CoreConfig::default()).await.expect("start");
        assert!(!core.is_connected());
        assert!(core.database().is_empty());
        assert_eq!(core.read_frame(0x240), None);
        assert!(core.list_loaded_files().is_empty());
    }

    #[tokio::test]
    async fn configured_builtins_decode_immediately() {
        let config = CoreConfig {
            builtins: vec!["controls".to_string()],
            ..CoreConfig::default()
        };
        let core = TelemetryCore::start(config).await.expect("start");
        let frame = Frame::new(1, &[0x02]);
        assert_eq!(core.decode(0x580, &frame).as_deref(), Some("State_name: Drive"));
    }

    #[tokio::test]
    async fn repeated_configured_builtin_is_accepted() {
        let config = CoreConfig {
            builtins: vec!["controls".to_string(), "controls".to_string()],
            ..CoreConfig::default()
        };
        let core = TelemetryCore::start(config).await.expect("start");
        assert!(core.database().message(1408).is_some());
    }

    #[tokio::test]
    async fn unknown_configured_builtin_is_a_config_error() {
        let config = CoreConfig { builtins: vec!["bogus".to_string()], ..CoreConfig::default() };
        let err = TelemetryCore::start(config).await.err().expect("must fail");
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[tokio::test]
    async fn load_builtin_request_rebuilds_the_database() {
        let core = TelemetryCore::start(CoreConfig::default()).await.expect("start");
        core.request_load_builtin("mppt");
        let handle = core.handle();
        settle_until(move || !handle.database().is_empty()).await;
        assert!(core.database().message(1712).is_some());
        assert!(
            core.list_builtin_sources()
                .iter()
                .any(|(name, enabled)| name == "mppt" && *enabled)
        );
    }

    #[tokio::test]
    async fn duplicate_load_does_not_rebuild() {
        let core = TelemetryCore::start(CoreConfig::default()).await.expect("start");
        core.request_load_builtin("mppt");
        let handle = core.handle();
        settle_until(move || !handle.database().is_empty()).await;
        let first = core.database();

        // A duplicate load leaves the enabled set unchanged, so no new
        // database may be published.
        core.request_load_builtin("mppt");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(Arc::ptr_eq(&first, &core.database()));
    }

    #[tokio::test]
    async fn unload_compiles_the_builtin_back_out() {
        let config =
            CoreConfig { builtins: vec!["mppt".to_string()], ..CoreConfig::default() };
        let core = TelemetryCore::start(config).await.expect("start");
        assert!(core.database().message(1712).is_some());

        core.request_unload_builtin("mppt");
        let handle = core.handle();
        settle_until(move || handle.database().is_empty()).await;
    }

    #[tokio::test]
    async fn file_sources_load_and_unload() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "BO_ 100 Speed: 2 ECU").expect("write");
        writeln!(file, " SG_ Value : 0|8@1+ (1,0)").expect("write");

        let core = TelemetryCore::start(CoreConfig::default()).await.expect("start");
        core.request_load_file(file.path());
        let handle = core.handle();
        settle_until(move || !handle.list_loaded_files().is_empty()).await;
        let handle = core.handle();
        settle_until(move || !handle.database().is_empty()).await;

        let frame = Frame::new(2, &[0x2A, 0x00]);
        assert_eq!(core.decode(0x64, &frame).as_deref(), Some("Value: 42"));

        core.request_unload_file(file.path());
        let handle = core.handle();
        settle_until(move || handle.database().is_empty()).await;
        assert!(core.list_loaded_files().is_empty());
    }

    #[tokio::test]
    async fn serial_activation_failure_leaves_no_source() {
        let core = TelemetryCore::start(CoreConfig::default()).await.expect("start");
        core.request_serial("/dev/does-not-exist-chasecar", 115200);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!core.is_connected());
    }

    #[tokio::test]
    async fn disconnect_without_a_source_is_harmless() {
        let core = TelemetryCore::start(CoreConfig::default()).await.expect("start");
        core.request_disconnect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!core.is_connected());
    }

    #[tokio::test]
    async fn shutdown_cancels_cleanly() {
        let core = TelemetryCore::start(CoreConfig::default()).await.expect("start");
        let handle = core.handle();
        core.shutdown();
        // Requests after shutdown are harmless no-ops.
        handle.request_load_builtin("mppt");
        handle.request_disconnect();
    }
}
