//! Async ingestion and decode core for solar-car CAN telemetry.
//!
//! Chasecar turns a raw byte stream from the vehicle's radio link into
//! decoded, human-readable telemetry. It speaks the ASCII serial-line
//! framing used by CAN-to-serial bridges, keeps the latest frame per
//! CAN identifier in a lock-per-entry store, and decodes frames against
//! a database compiled from DBC text. Sources and databases can be
//! swapped at runtime without restarting the pipeline.
//!
//! # Features
//!
//! - **Live ingestion**: serial or TCP byte sources with bounded
//!   backpressure between I/O and parsing
//! - **Latest-value store**: lock-free-feeling reads of the newest
//!   frame per identifier, one short mutex per entry
//! - **DBC decode**: little- and big-endian signals, signedness,
//!   scaling, and value-table labels
//! - **Live reconfiguration**: enable built-in descriptions or load
//!   DBC files while data is flowing; the rebuilt database is
//!   published atomically
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chasecar::{Chasecar, CoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> chasecar::Result<()> {
//!     let core = Chasecar::start().await?;
//!     core.request_load_builtin("wavesculptor22");
//!     core.request_network("10.0.0.5", 5700);
//!
//!     let mut updates = core.updates();
//!     while updates.changed().await.is_ok() {
//!         if let Some(frame) = core.read_frame(0x242) {
//!             match core.decode(0x242, &frame) {
//!                 Some(text) => println!("{text}"),
//!                 None => println!("{frame}"),
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod frame;
pub mod store;

// Ingestion pipeline
pub mod framer;
pub mod source;
pub mod transport;

// Decode
pub mod database;
pub mod registry;

// Orchestration
pub mod config;
pub mod manager;
pub mod stream;

pub use config::{CoreConfig, TransportConfig};
pub use database::{Database, DatabaseBuilder, Message, Signal};
pub use error::{CoreError, Result};
pub use frame::{Frame, MAX_FRAME_IDS, MAX_PAYLOAD};
pub use manager::{CoreHandle, SourceStatus, TelemetryCore};
pub use source::SourceConfig;
pub use stream::LatestEveryExt;

/// Unified entry point for starting a telemetry core.
///
/// # Examples
///
/// ## Default configuration
/// ```rust,no_run
/// use chasecar::Chasecar;
///
/// #[tokio::main]
/// async fn main() -> chasecar::Result<()> {
///     let core = Chasecar::start().await?;
///     core.request_serial("/dev/ttyUSB0", 115200);
///     Ok(())
/// }
/// ```
///
/// ## From a configuration file
/// ```rust,no_run
/// use chasecar::{Chasecar, CoreConfig};
///
/// #[tokio::main]
/// async fn main() -> chasecar::Result<()> {
///     let config = CoreConfig::from_file("chasecar.yaml")?;
///     let core = Chasecar::start_with(config).await?;
///     Ok(())
/// }
/// ```
pub struct Chasecar;

impl Chasecar {
    /// Start an idle core with default configuration: no database
    /// sources enabled and no byte source active.
    pub async fn start() -> Result<TelemetryCore> {
        TelemetryCore::start(CoreConfig::default()).await
    }

    /// Start a core from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration names an unknown built-in
    /// description or the transport sizing is invalid.
    pub async fn start_with(config: CoreConfig) -> Result<TelemetryCore> {
        TelemetryCore::start(config).await
    }
}
