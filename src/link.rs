//! Connection state machine for the UART link
//! This module provides the main interface for link operations: it
//! orchestrates discovery, connection, session setup and teardown, and
//! decides what to do on every asynchronous platform event.

use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::buffer::ReceiveBuffer;
use crate::constants::{
    DEFAULT_SCAN_DURATION_SECS, ENABLE_NOTIFICATIONS, UUID_CCC_DESCRIPTOR, UUID_UART_SERVICE,
};
use crate::error::{Error, Result};
use crate::platform::{BlePlatform, GattEvent, PlatformEvent};
use crate::registry::{DeviceRegistry, PeripheralRecord};
use crate::session::UartSession;

/// Lifecycle of the single UART connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ServiceDiscovery,
    Ready,
}

/// Events surfaced to external collaborators (UI, transcript logger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionEvent {
    /// The device list gained or updated an entry.
    DeviceListChanged,
    /// The link to the selected peripheral is established.
    Connected,
    /// The link was torn down, by request or by the platform.
    Disconnected,
    /// The TX characteristic is resolved and writes will be dispatched.
    TransmitReady,
    /// New bytes are waiting in the receive buffer.
    DataAvailable,
}

/// The one live link to a peripheral. Created on a successful connect
/// request, destroyed on teardown. The generation number tells events of a
/// superseded connection apart from current ones; the platform can
/// double-signal after teardown.
#[derive(Debug, Clone)]
struct ConnectionHandle {
    record: PeripheralRecord,
    generation: u64,
}

/// Session manager for one BLE UART link.
///
/// Single-connection by construction: at most one [`ConnectionHandle`]
/// exists at a time, and the session holding the characteristic handles is
/// bound to it. All state mutation happens inside the transition handlers
/// driven by [`UartLink::handle_event`]; callers issue requests and watch
/// the [`SessionEvent`] channel.
pub struct UartLink<P: BlePlatform> {
    platform: P,
    registry: DeviceRegistry,
    buffer: ReceiveBuffer,
    state: ConnectionState,
    connection: Option<ConnectionHandle>,
    session: Option<UartSession>,
    generation: u64,
    events: UnboundedSender<SessionEvent>,
}

impl<P: BlePlatform> UartLink<P> {
    /// Creates a new link manager. `events` is where outward session events
    /// are delivered; the consumer keeps the receiving half.
    pub fn new(platform: P, events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            platform,
            registry: DeviceRegistry::new(),
            buffer: ReceiveBuffer::new(),
            state: ConnectionState::Disconnected,
            connection: None,
            session: None,
            generation: 0,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Display name of the peripheral the link is bound to, if any.
    pub fn connected_device_name(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.record.display_name())
    }

    /// Whether the session can currently dispatch writes.
    pub fn transmit_ready(&self) -> bool {
        self.state == ConnectionState::Ready
            && self.session.as_ref().is_some_and(|s| s.can_transmit())
    }

    /// Clears the device list and starts a time-bounded scan. Discoveries
    /// come back as platform events and repopulate the list incrementally.
    pub async fn refresh_device_list(&mut self) -> Result<()> {
        self.registry.clear();
        info!("Starting device scan");
        self.platform
            .start_scan(Duration::from_secs(DEFAULT_SCAN_DURATION_SECS))
            .await
    }

    /// Display names of the discovered peripherals, in discovery order.
    pub fn device_list(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Opens a connection to the first discovered peripheral with the given
    /// display name. Rejected while a connection is in progress or
    /// established; fails without a state change when the name is unknown.
    pub async fn connect_to_device(&mut self, name: &str) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            warn!("Connect request while {:?} rejected", self.state);
            return Err(Error::LinkBusy(self.state));
        }

        let record = self
            .registry
            .select(name)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;

        self.generation += 1;
        let generation = self.generation;
        info!(
            "Connecting to device {} (generation {})...",
            record.display_name(),
            generation
        );

        if let Err(e) = self.platform.connect(&record.id, generation).await {
            error!("Connect request failed: {}", e);
            return Err(e);
        }

        self.connection = Some(ConnectionHandle { record, generation });
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Tears the active link down. Resources are released immediately even
    /// though the platform teardown may complete later; a disconnect while
    /// already disconnected is a no-op.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Disconnected {
            info!("Disconnect requested with no active connection");
            return Ok(());
        }

        let result = self.platform.disconnect().await;
        self.teardown();
        result
    }

    /// Sends bytes to the peripheral through the TX characteristic.
    ///
    /// Fire-and-forget: a write without a resolved TX characteristic is
    /// dropped and logged, and platform-level failures are not surfaced back
    /// to the caller.
    pub async fn write(&mut self, data: &[u8]) {
        info!("Writing data ({} bytes)", data.len());

        match self.session.as_ref().and_then(|s| s.tx_characteristic()) {
            Some(characteristic) => {
                if let Err(e) = self.platform.write_characteristic(characteristic, data).await {
                    error!("Failed to write data: {}", e);
                }
            }
            None => error!("Failed to write data: no TX characteristic resolved"),
        }
    }

    /// Sends a text string as its UTF-8 bytes.
    pub async fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes()).await;
    }

    /// Returns and clears the entire receive buffer.
    pub fn read_all(&mut self) -> Vec<u8> {
        self.buffer.read_all()
    }

    /// Extracts the first terminated line from the receive buffer.
    pub fn read_line(&mut self, terminator: &str) -> Option<String> {
        self.buffer.read_line(terminator)
    }

    /// Splits the entire receive buffer into lines and clears it.
    pub fn read_all_lines(&mut self, terminator: &str) -> Vec<String> {
        self.buffer.read_all_lines(terminator)
    }

    /// Drops all buffered receive data.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Feeds one platform event through the state machine.
    pub async fn handle_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::DeviceDiscovered { id, name } => {
                let record = PeripheralRecord::new(id, name);
                info!(
                    "Discovered device {} (ID: {}, Address: {:?})",
                    record.display_name(),
                    record.id,
                    record.address
                );
                self.registry.insert(record);
                self.emit(SessionEvent::DeviceListChanged);
            }
            PlatformEvent::ScanFinished => {
                info!("Device scan finished with {} devices", self.registry.len());
            }
            PlatformEvent::Gatt { generation, event } => {
                let Some(connection) = &self.connection else {
                    debug!("Ignoring {:?} with no active connection", event);
                    return;
                };
                if connection.generation != generation {
                    debug!(
                        "Ignoring stale {:?} from generation {}",
                        event, generation
                    );
                    return;
                }
                self.handle_gatt_event(event).await;
            }
        }
    }

    async fn handle_gatt_event(&mut self, event: GattEvent) {
        match event {
            GattEvent::LinkUp => {
                if self.state != ConnectionState::Connecting {
                    debug!("Link up while {:?} ignored", self.state);
                    return;
                }
                info!("Successfully connected");
                self.state = ConnectionState::ServiceDiscovery;
                self.emit(SessionEvent::Connected);

                info!("Discovering services...");
                if let Err(e) = self.platform.discover_services().await {
                    error!("Service discovery request failed: {}", e);
                    let _ = self.platform.disconnect().await;
                    self.teardown();
                }
            }
            GattEvent::LinkError(reason) => {
                error!("Link error received: {}", reason);
                // No automatic retry; a failed attempt falls back to idle.
                if self.state == ConnectionState::Connecting {
                    self.teardown();
                }
            }
            GattEvent::LinkDown => {
                info!("Disconnected from device");
                self.teardown();
            }
            GattEvent::ServiceFound(uuid) => {
                if self.state != ConnectionState::ServiceDiscovery || self.session.is_some() {
                    return;
                }
                if uuid == UUID_UART_SERVICE {
                    info!("Found UART service: {}", uuid);
                    self.session = Some(UartSession::new(uuid));
                    if let Err(e) = self.platform.discover_characteristics(uuid).await {
                        error!("Characteristic discovery request failed: {}", e);
                    }
                } else {
                    debug!("Ignoring service {}", uuid);
                }
            }
            GattEvent::ServiceDiscoveryFinished => {
                if self.session.is_none() && self.state == ConnectionState::ServiceDiscovery {
                    warn!("Service discovery finished without the UART service; link stays unusable");
                }
            }
            GattEvent::CharacteristicsResolved(characteristics) => {
                let Some(session) = &mut self.session else {
                    return;
                };
                if let Some(rx) = session.resolve_characteristics(&characteristics) {
                    info!("Arming notifications on {}", rx);
                    if let Err(e) = self
                        .platform
                        .write_descriptor(rx, UUID_CCC_DESCRIPTOR, &ENABLE_NOTIFICATIONS)
                        .await
                    {
                        error!("Failed to write notification descriptor: {}", e);
                    }
                }
            }
            GattEvent::DescriptorWritten {
                characteristic,
                descriptor,
            } => {
                let Some(session) = &mut self.session else {
                    return;
                };
                if descriptor != UUID_CCC_DESCRIPTOR
                    || session.rx_characteristic() != Some(characteristic)
                {
                    debug!("Ignoring descriptor write on {}", characteristic);
                    return;
                }
                info!("Notifications armed");
                if self.state == ConnectionState::ServiceDiscovery {
                    self.state = ConnectionState::Ready;
                }
                if session.complete_arming() {
                    self.emit(SessionEvent::TransmitReady);
                }
            }
            GattEvent::Notification(data) => {
                if self.session.is_none() {
                    debug!("Ignoring notification with no session");
                    return;
                }
                debug!("Received data: {:?}", data);
                self.buffer.append(&data);
                self.emit(SessionEvent::DataAvailable);
            }
        }
    }

    /// Unconditional teardown of the session and connection handle.
    fn teardown(&mut self) {
        self.session = None;
        self.connection = None;
        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            self.emit(SessionEvent::Disconnected);
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            error!("Failed to emit {:?} event: receiver dropped", event);
        }
    }
}
