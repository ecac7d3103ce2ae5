//! Error types for the UART link layer

use thiserror::Error;

use crate::link::ConnectionState;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by link operations. Everything here is recoverable: the
/// link stays usable for a new connect attempt after any of these.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable Bluetooth adapter on this system
    #[error("no Bluetooth adapter available")]
    AdapterUnavailable,

    /// A connect request named a peripheral the registry does not know
    #[error("no discovered device matching {0:?}")]
    DeviceNotFound(String),

    /// A connect request arrived while a connection already exists
    #[error("a connection is already in progress or established ({0:?})")]
    LinkBusy(ConnectionState),

    /// An operation that needs an active link ran without one
    #[error("no active connection")]
    NotConnected,

    /// Failure reported by the platform Bluetooth stack
    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}
