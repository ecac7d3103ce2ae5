//! BLE UART-over-GATT session management
//! This crate handles scanning for peripherals, connecting to a selected
//! device, negotiating the UART service's characteristics, and shuttling
//! bytes over the link through a line-oriented receive buffer and a
//! fire-and-forget write path.
//!
//! The connection state machine in [`link`] is platform-agnostic: it drives
//! any [`platform::BlePlatform`] implementation and is fed completion events
//! by the consumer. [`backend::BluestBackend`] is the production
//! implementation over the system Bluetooth adapter.
//!
//! ```no_run
//! use ble_uart_bridge::{BluestBackend, UartLink};
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> ble_uart_bridge::Result<()> {
//! let (backend, mut platform_events) = BluestBackend::new().await?;
//! let (session_tx, mut session_events) = mpsc::unbounded_channel();
//! let mut link = UartLink::new(backend, session_tx);
//!
//! link.refresh_device_list().await?;
//! // Drain platform_events into link.handle_event(..) and watch
//! // session_events for DeviceListChanged, Connected, DataAvailable, ...
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod buffer;
pub mod constants;
pub mod error;
pub mod link;
pub mod platform;
pub mod registry;
pub mod session;

// Re-export types that should be publicly accessible
pub use backend::BluestBackend;
pub use buffer::ReceiveBuffer;
pub use error::{Error, Result};
pub use link::{ConnectionState, SessionEvent, UartLink};
pub use platform::{BlePlatform, CharacteristicInfo, GattEvent, PlatformEvent};
pub use registry::{DeviceId, DeviceRegistry, PeripheralRecord};
pub use session::UartSession;
