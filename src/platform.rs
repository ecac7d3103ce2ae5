//! Abstracted platform Bluetooth capability
//! The link layer never talks to a radio directly: it issues requests
//! through [`BlePlatform`] and consumes the completion events the
//! implementation pushes back through its event channel.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::registry::DeviceId;

/// Requests the link layer issues against the platform Bluetooth stack.
///
/// Every method returns as soon as the request is dispatched; completion is
/// reported later as a [`PlatformEvent`]. Implementations must deliver the
/// events of one connection in the order the platform generates them.
#[async_trait]
pub trait BlePlatform: Send {
    /// Starts a time-bounded low-energy scan. Discoveries stream back as
    /// [`PlatformEvent::DeviceDiscovered`].
    async fn start_scan(&mut self, duration: Duration) -> Result<()>;

    /// Opens a link to the given peripheral. GATT events produced for this
    /// link are tagged with `generation`.
    async fn connect(&mut self, id: &DeviceId, generation: u64) -> Result<()>;

    /// Enumerates the primary services of the active link.
    async fn discover_services(&mut self) -> Result<()>;

    /// Enumerates the characteristics of one discovered service.
    async fn discover_characteristics(&mut self, service: Uuid) -> Result<()>;

    /// Writes to a characteristic of the active link.
    async fn write_characteristic(&mut self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Writes to a descriptor of a characteristic of the active link.
    async fn write_descriptor(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<()>;

    /// Tears the active link down.
    async fn disconnect(&mut self) -> Result<()>;
}

/// A characteristic reported by characteristic discovery.
#[derive(Debug, Clone)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub writable: bool,
    pub notifiable: bool,
    pub has_ccc_descriptor: bool,
}

/// Completion and push events delivered by the platform layer.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// The running scan reported a peripheral.
    DeviceDiscovered { id: DeviceId, name: Option<String> },
    /// The scan window elapsed or the scan stream ended.
    ScanFinished,
    /// An event scoped to one connection generation.
    Gatt { generation: u64, event: GattEvent },
}

/// Events scoped to a single connection generation. The state machine drops
/// any of these whose generation does not match the live connection.
#[derive(Debug, Clone)]
pub enum GattEvent {
    /// The link is established.
    LinkUp,
    /// The platform reported a link-level failure.
    LinkError(String),
    /// The link dropped.
    LinkDown,
    /// Service discovery reported one service.
    ServiceFound(Uuid),
    /// Service discovery ran to completion.
    ServiceDiscoveryFinished,
    /// Characteristic discovery finished for the requested service.
    CharacteristicsResolved(Vec<CharacteristicInfo>),
    /// A descriptor write completed.
    DescriptorWritten { characteristic: Uuid, descriptor: Uuid },
    /// The peripheral pushed data through a notifying characteristic.
    Notification(Vec<u8>),
}
