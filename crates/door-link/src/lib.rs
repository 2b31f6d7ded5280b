//! Door Actuator Link
//!
//! Async serial communication with the door microcontroller. The wire
//! contract is three messages: `MOVE` + `OK` actuates the servo, `INCONNU`
//! flags an unrecognized person, `ERREUR` flags a system fault.

pub mod link;

pub use link::{AlertKind, DoorLink, DoorLinkConfig};

use thiserror::Error;

/// Door link error types
#[derive(Error, Debug)]
pub enum DoorError {
    #[error("Failed to open serial port {0}: {1}")]
    Open(String, String),

    #[error("Serial write failed: {0}")]
    Write(String),

    #[error("Door link not connected")]
    NotConnected,
}
