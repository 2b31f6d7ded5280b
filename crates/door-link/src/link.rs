//! Door link implementation

use crate::DoorError;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::{AccessAction, AccessRecord, EventLog};
use tokio::io::AsyncWriteExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

/// Door link configuration
#[derive(Debug, Clone)]
pub struct DoorLinkConfig {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM7")
    pub port: String,
    /// Baud rate
    pub baud: u32,
    /// Settle delay after opening the port, for the board to boot
    pub settle: Duration,
}

impl Default for DoorLinkConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            settle: Duration::from_secs(2),
        }
    }
}

/// Alert kinds the board understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Face present but not recognized (red LED)
    Unknown,
    /// System fault
    Error,
}

impl AlertKind {
    fn token(&self) -> &'static [u8] {
        match self {
            AlertKind::Unknown => b"INCONNU\n",
            AlertKind::Error => b"ERREUR\n",
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            AlertKind::Unknown => "unknown",
            AlertKind::Error => "error",
        }
    }
}

enum Transport {
    Serial(tokio_serial::SerialStream),
    /// Captures written bytes instead of touching hardware
    Mock(Arc<Mutex<Vec<u8>>>),
}

impl Transport {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), DoorError> {
        match self {
            Transport::Serial(stream) => stream
                .write_all(bytes)
                .await
                .map_err(|e| DoorError::Write(e.to_string())),
            Transport::Mock(written) => {
                written
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend_from_slice(bytes);
                Ok(())
            }
        }
    }
}

/// Exclusive owner of the physical door channel.
///
/// Every failure is absorbed at this boundary: callers get a bool, never an
/// error, and a disconnected link turns every action into a no-op.
pub struct DoorLink {
    config: DoorLinkConfig,
    transport: Option<Transport>,
    connected: bool,
    log: Arc<EventLog>,
}

impl DoorLink {
    pub fn new(config: DoorLinkConfig, log: Arc<EventLog>) -> Self {
        Self {
            config,
            transport: None,
            connected: false,
            log,
        }
    }

    /// Create a pre-connected mock link for tests and hardware-less runs.
    pub fn mock(log: Arc<EventLog>) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let link = Self {
            config: DoorLinkConfig::default(),
            transport: Some(Transport::Mock(Arc::clone(&written))),
            connected: true,
            log,
        };
        (link, written)
    }

    /// Open the serial port and wait for the board to initialize.
    ///
    /// Returns whether the link is connected; failure never propagates.
    pub async fn connect(&mut self) -> bool {
        if self.connected {
            return true;
        }

        match tokio_serial::new(self.config.port.as_str(), self.config.baud).open_native_async() {
            Ok(stream) => {
                tokio::time::sleep(self.config.settle).await;
                self.transport = Some(Transport::Serial(stream));
                self.connected = true;
                info!("Door link connected on {}", self.config.port);
                true
            }
            Err(e) => {
                warn!("Door link unavailable on {}: {}", self.config.port, e);
                self.connected = false;
                false
            }
        }
    }

    /// Actuate the door. Emits a granted access record on success.
    pub async fn open_door(&mut self, student_name: Option<&str>, reason: &str) -> bool {
        if !self.connected {
            return false;
        }

        let outcome = match self.write(b"MOVE\n").await {
            Ok(()) => self.write(b"OK\n").await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.log.log_access(&AccessRecord {
                    timestamp: Utc::now(),
                    student_name: student_name.map(str::to_string),
                    action: AccessAction::Granted,
                    reason: reason.to_string(),
                });
                true
            }
            Err(e) => {
                warn!("Door actuation failed: {}", e);
                false
            }
        }
    }

    /// Signal the board without actuating. Emits a denied access record.
    pub async fn send_alert(&mut self, kind: AlertKind) -> bool {
        if !self.connected {
            return false;
        }

        match self.write(kind.token()).await {
            Ok(()) => {
                self.log.log_access(&AccessRecord {
                    timestamp: Utc::now(),
                    student_name: None,
                    action: AccessAction::Denied,
                    reason: kind.reason().to_string(),
                });
                true
            }
            Err(e) => {
                warn!("Door alert failed: {}", e);
                false
            }
        }
    }

    /// Close the channel. Idempotent.
    pub fn disconnect(&mut self) {
        if self.connected {
            info!("Door link disconnected");
        }
        self.transport = None;
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Bytes written so far, when backed by the mock transport.
    pub fn mock_written(&self) -> Option<Vec<u8>> {
        match &self.transport {
            Some(Transport::Mock(written)) => {
                Some(written.lock().unwrap_or_else(|e| e.into_inner()).clone())
            }
            _ => None,
        }
    }

    /// Reconfigure the port (used while probing fallback ports).
    pub fn set_port(&mut self, port: &str) {
        self.config.port = port.to_string();
    }

    pub fn port(&self) -> &str {
        &self.config.port
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), DoorError> {
        match self.transport.as_mut() {
            Some(transport) => transport.write_all(bytes).await,
            None => Err(DoorError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::LogKind;

    fn event_log() -> (tempfile::TempDir, Arc<EventLog>) {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(EventLog::new(dir.path()).unwrap());
        (dir, log)
    }

    #[tokio::test]
    async fn test_open_door_wire_contract() {
        let (_tmp, log) = event_log();
        let (mut link, written) = DoorLink::mock(Arc::clone(&log));

        assert!(link.open_door(Some("Alice"), "manual_test").await);
        assert_eq!(written.lock().unwrap().as_slice(), b"MOVE\nOK\n");
        assert_eq!(log.count(LogKind::Access), 1);

        let recent = log.recent(LogKind::Access, 1);
        assert_eq!(recent[0]["action"], "granted");
        assert_eq!(recent[0]["student_name"], "Alice");
    }

    #[tokio::test]
    async fn test_alert_tokens() {
        let (_tmp, log) = event_log();
        let (mut link, written) = DoorLink::mock(Arc::clone(&log));

        assert!(link.send_alert(AlertKind::Unknown).await);
        assert_eq!(written.lock().unwrap().as_slice(), b"INCONNU\n");

        written.lock().unwrap().clear();
        assert!(link.send_alert(AlertKind::Error).await);
        assert_eq!(written.lock().unwrap().as_slice(), b"ERREUR\n");

        let recent = log.recent(LogKind::Access, 10);
        assert!(recent.iter().all(|r| r["action"] == "denied"));
    }

    #[tokio::test]
    async fn test_disconnected_is_noop() {
        let (_tmp, log) = event_log();
        let (mut link, written) = DoorLink::mock(Arc::clone(&log));
        link.disconnect();
        link.disconnect(); // idempotent

        assert!(!link.is_connected());
        assert!(!link.open_door(Some("Alice"), "manual_test").await);
        assert!(!link.send_alert(AlertKind::Unknown).await);
        assert!(written.lock().unwrap().is_empty());
        assert_eq!(log.count(LogKind::Access), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected() {
        let (_tmp, log) = event_log();
        let config = DoorLinkConfig {
            port: "/dev/does-not-exist".to_string(),
            settle: Duration::from_millis(1),
            ..Default::default()
        };
        let mut link = DoorLink::new(config, log);

        assert!(!link.connect().await);
        assert!(!link.is_connected());
        assert!(!link.open_door(None, "startup").await);
    }
}
