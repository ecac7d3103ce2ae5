//! bluest-backed implementation of the platform capability
//! Translates link-layer requests into calls on the system Bluetooth
//! adapter and pumps the resulting streams back as platform events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device, Service};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::{ENABLE_NOTIFICATIONS, LINK_WATCH_INTERVAL_MS, UUID_CCC_DESCRIPTOR};
use crate::error::{Error, Result};
use crate::platform::{BlePlatform, CharacteristicInfo, GattEvent, PlatformEvent};
use crate::registry::DeviceId;

/// Platform layer backed by the system Bluetooth adapter.
pub struct BluestBackend {
    adapter: Adapter,
    events: UnboundedSender<PlatformEvent>,
    /// Device handles from the most recent scan, keyed by platform id
    devices: Arc<Mutex<HashMap<String, Device>>>,
    scan_cancel: CancellationToken,
    scan_task: Option<JoinHandle<()>>,
    active: Option<ActiveLink>,
}

/// Handles and worker tasks of the one active connection.
struct ActiveLink {
    device: Device,
    generation: u64,
    services: Vec<Service>,
    characteristics: HashMap<Uuid, Characteristic>,
    cancel: CancellationToken,
}

impl BluestBackend {
    /// Opens the default adapter and returns the backend together with the
    /// receiver the link layer drains platform events from.
    pub async fn new() -> Result<(Self, UnboundedReceiver<PlatformEvent>)> {
        let adapter = Adapter::default().await.ok_or(Error::AdapterUnavailable)?;
        adapter.wait_available().await.map_err(anyhow::Error::from)?;
        info!("Bluetooth adapter is available.");

        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Self {
            adapter,
            events: tx,
            devices: Arc::new(Mutex::new(HashMap::new())),
            scan_cancel: CancellationToken::new(),
            scan_task: None,
            active: None,
        };
        Ok((backend, rx))
    }

    fn send(events: &UnboundedSender<PlatformEvent>, event: PlatformEvent) {
        if events.send(event).is_err() {
            error!("Platform event receiver dropped");
        }
    }

    async fn run_scan(
        adapter: Adapter,
        devices: Arc<Mutex<HashMap<String, Device>>>,
        events: UnboundedSender<PlatformEvent>,
        cancel: CancellationToken,
        duration: Duration,
    ) {
        info!("Starting bluetooth scan");
        let mut scan_stream = match adapter.scan(&[]).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start scan: {}", e);
                Self::send(&events, PlatformEvent::ScanFinished);
                return;
            }
        };

        let deadline = sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            let device = discovered.device;
                            let id = device.id().to_string();
                            let name = device.name().ok();
                            debug!(
                                "Found device - ID: {}, Name: {:?}, RSSI: {:?}",
                                id, name, discovered.rssi
                            );
                            devices.lock().unwrap().insert(id.clone(), device);
                            Self::send(
                                &events,
                                PlatformEvent::DeviceDiscovered { id: DeviceId(id), name },
                            );
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = &mut deadline => {
                    break;
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }

        Self::send(&events, PlatformEvent::ScanFinished);
    }

    /// Polls link liveness and reports the drop when the peripheral goes
    /// away.
    async fn watch_link(
        device: Device,
        generation: u64,
        events: UnboundedSender<PlatformEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = sleep(Duration::from_millis(LINK_WATCH_INTERVAL_MS)) => {
                    if !device.is_connected().await {
                        info!("Device {} reports disconnected", device.id());
                        Self::send(
                            &events,
                            PlatformEvent::Gatt { generation, event: GattEvent::LinkDown },
                        );
                        break;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }

    fn drop_active(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.cancel.cancel();
        }
    }
}

#[async_trait]
impl BlePlatform for BluestBackend {
    async fn start_scan(&mut self, duration: Duration) -> Result<()> {
        self.scan_cancel.cancel();
        if let Some(handle) = self.scan_task.take() {
            handle.abort();
        }
        self.devices.lock().unwrap().clear();

        self.scan_cancel = CancellationToken::new();
        let cancel = self.scan_cancel.clone();
        let adapter = self.adapter.clone();
        let devices = self.devices.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            Self::run_scan(adapter, devices, events, cancel, duration).await;
        });
        self.scan_task = Some(handle);
        info!("Device scan task started.");
        Ok(())
    }

    async fn connect(&mut self, id: &DeviceId, generation: u64) -> Result<()> {
        let device = self
            .devices
            .lock()
            .unwrap()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(id.0.clone()))?;

        self.drop_active();
        let cancel = CancellationToken::new();
        self.active = Some(ActiveLink {
            device: device.clone(),
            generation,
            services: Vec::new(),
            characteristics: HashMap::new(),
            cancel: cancel.clone(),
        });

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            info!("Initiating connection to {}...", device.id());
            match adapter.connect_device(&device).await {
                Ok(()) => {
                    Self::send(
                        &events,
                        PlatformEvent::Gatt { generation, event: GattEvent::LinkUp },
                    );
                    Self::watch_link(device, generation, events, cancel).await;
                }
                Err(e) => {
                    Self::send(
                        &events,
                        PlatformEvent::Gatt {
                            generation,
                            event: GattEvent::LinkError(e.to_string()),
                        },
                    );
                }
            }
        });
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(Error::NotConnected);
        };

        let services = active.device.services().await.map_err(anyhow::Error::from)?;
        for service in &services {
            debug!("Available service: {}", service.uuid());
            Self::send(
                &self.events,
                PlatformEvent::Gatt {
                    generation: active.generation,
                    event: GattEvent::ServiceFound(service.uuid()),
                },
            );
        }
        active.services = services;

        Self::send(
            &self.events,
            PlatformEvent::Gatt {
                generation: active.generation,
                event: GattEvent::ServiceDiscoveryFinished,
            },
        );
        Ok(())
    }

    async fn discover_characteristics(&mut self, service: Uuid) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(Error::NotConnected);
        };
        let Some(target) = active.services.iter().find(|s| s.uuid() == service).cloned() else {
            return Err(Error::Platform(anyhow!("service {} not discovered", service)));
        };

        let mut resolved = Vec::new();
        for characteristic in target
            .characteristics()
            .await
            .map_err(anyhow::Error::from)?
        {
            let uuid = characteristic.uuid();
            let properties = characteristic
                .properties()
                .await
                .map_err(anyhow::Error::from)?;
            let has_ccc_descriptor = match characteristic.descriptors().await {
                Ok(descriptors) => descriptors.iter().any(|d| d.uuid() == UUID_CCC_DESCRIPTOR),
                Err(e) => {
                    // Some platforms refuse descriptor enumeration; notify
                    // support implies the descriptor is there.
                    debug!("Failed to enumerate descriptors on {}: {}", uuid, e);
                    properties.notify
                }
            };

            resolved.push(CharacteristicInfo {
                uuid,
                writable: properties.write || properties.write_without_response,
                notifiable: properties.notify || properties.indicate,
                has_ccc_descriptor,
            });
            active.characteristics.insert(uuid, characteristic);
        }

        Self::send(
            &self.events,
            PlatformEvent::Gatt {
                generation: active.generation,
                event: GattEvent::CharacteristicsResolved(resolved),
            },
        );
        Ok(())
    }

    async fn write_characteristic(&mut self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let Some(active) = self.active.as_ref() else {
            return Err(Error::NotConnected);
        };
        let Some(target) = active.characteristics.get(&characteristic) else {
            return Err(Error::Platform(anyhow!(
                "characteristic {} not resolved",
                characteristic
            )));
        };

        target.write(data).await.map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn write_descriptor(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<()> {
        if descriptor != UUID_CCC_DESCRIPTOR || value != &ENABLE_NOTIFICATIONS[..] {
            return Err(Error::Platform(anyhow!(
                "unsupported descriptor write: {}",
                descriptor
            )));
        }

        let Some(active) = self.active.as_ref() else {
            return Err(Error::NotConnected);
        };
        let Some(target) = active.characteristics.get(&characteristic).cloned() else {
            return Err(Error::Platform(anyhow!(
                "characteristic {} not resolved",
                characteristic
            )));
        };

        let generation = active.generation;
        let events = self.events.clone();
        let cancel = active.cancel.clone();

        // The client configuration descriptor is armed as part of the notify
        // subscription on this backend.
        tokio::spawn(async move {
            info!("Subscribing to notifications...");
            match target.notify().await {
                Ok(mut notification_stream) => {
                    Self::send(
                        &events,
                        PlatformEvent::Gatt {
                            generation,
                            event: GattEvent::DescriptorWritten {
                                characteristic,
                                descriptor,
                            },
                        },
                    );
                    loop {
                        tokio::select! {
                            item = notification_stream.next() => {
                                match item {
                                    Some(Ok(data)) => {
                                        debug!("Received notification: {:?}", data);
                                        Self::send(
                                            &events,
                                            PlatformEvent::Gatt {
                                                generation,
                                                event: GattEvent::Notification(data),
                                            },
                                        );
                                    }
                                    Some(Err(e)) => {
                                        error!("Error in notification stream: {}", e);
                                        break;
                                    }
                                    None => {
                                        info!("Notification stream ended");
                                        break;
                                    }
                                }
                            }
                            _ = cancel.cancelled() => break,
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to subscribe to notifications: {}", e);
                    Self::send(
                        &events,
                        PlatformEvent::Gatt {
                            generation,
                            event: GattEvent::LinkError(format!(
                                "notification subscribe failed: {}",
                                e
                            )),
                        },
                    );
                }
            }
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            info!("Disconnect requested with no active device");
            return Ok(());
        };
        active.cancel.cancel();

        if active.device.is_connected().await {
            info!("Disconnecting from device {}", active.device.id());
            self.adapter
                .disconnect_device(&active.device)
                .await
                .map_err(anyhow::Error::from)?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", active.device.id());
        }
        Ok(())
    }
}
