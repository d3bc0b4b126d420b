//! Serial-port byte source.

use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use super::ByteSource;
use crate::{CoreError, Result};

/// Point-to-point serial link source.
///
/// Opening can fail (missing device, permissions, unsupported baud); the
/// reconfiguration manager then stays idle and the operator retries. A
/// serial link that drops mid-stream is not retried automatically.
pub struct SerialSource {
    port: SerialStream,
    path: String,
    baud: u32,
}

impl SerialSource {
    /// Open the device in raw mode at the given baud rate.
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(path, baud)
            .open_native_async()
            .map_err(|err| CoreError::serial_error(path, err))?;
        info!(path, baud, "serial source opened");
        Ok(Self { port, path: path.to_string(), baud })
    }
}

#[async_trait::async_trait]
impl ByteSource for SerialSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.port
            .read(buf)
            .await
            .map_err(|err| CoreError::disconnected(format!("serial read on {}: {err}", self.path)))
    }

    fn describe(&self) -> String {
        format!("serial {} @ {}", self.path, self.baud)
    }
}
