//! Line transport over a device path.
//!
//! Opens the configured port (`/dev/ttyUSB0`, `COM4`, a named pipe, or a
//! plain file) with tokio file I/O.  Baud rate and line discipline must
//! already be set on the device, e.g. by `stty` or the OS driver defaults;
//! the configured rate is logged so a mismatch is easy to spot.

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::debug;

use crate::infrastructure::slider_link::{ConnectionSettings, LineReader, LineTransport, LinkError};

#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceLineTransport;

impl DeviceLineTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LineTransport for DeviceLineTransport {
    async fn open(&self, settings: &ConnectionSettings) -> Result<LineReader, LinkError> {
        if settings.port.trim().is_empty() {
            return Err(LinkError::NoPort);
        }

        let file = File::open(&settings.port)
            .await
            .map_err(|source| LinkError::Open {
                port: settings.port.clone(),
                source,
            })?;

        debug!(
            port = %settings.port,
            baud_rate = settings.baud_rate,
            "opened serial device, expecting the line to be configured externally"
        );
        Ok(Box::new(BufReader::new(file)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use uuid::Uuid;

    fn settings(port: String) -> ConnectionSettings {
        ConnectionSettings {
            port,
            baud_rate: 9600,
        }
    }

    #[tokio::test]
    async fn test_open_reads_lines_from_device_path() {
        // Arrange
        let path = std::env::temp_dir().join(format!("deej_device_{}", Uuid::new_v4()));
        std::fs::write(&path, "512|0\r\n1023|1\r\n").unwrap();
        let transport = DeviceLineTransport::new();

        // Act
        let mut reader = transport
            .open(&settings(path.to_string_lossy().into_owned()))
            .await
            .unwrap();
        let mut first = String::new();
        reader.read_line(&mut first).await.unwrap();

        // Assert
        assert_eq!(first, "512|0\r\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_open_missing_device_reports_port() {
        let transport = DeviceLineTransport::new();
        let missing = format!("/nonexistent/deej_{}", Uuid::new_v4());

        let err = transport.open(&settings(missing.clone())).await.err().unwrap();

        match err {
            LinkError::Open { port, .. } => assert_eq!(port, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_open_blank_port_is_rejected() {
        let transport = DeviceLineTransport::new();

        let err = transport.open(&settings("  ".to_string())).await.err().unwrap();

        assert!(matches!(err, LinkError::NoPort));
    }
}
