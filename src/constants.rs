//! Constants used throughout the crate
//! This module contains the fixed protocol values of the UART-over-GATT
//! profile, such as UUIDs, descriptor payloads and scan timing.

use uuid::Uuid;

/// The UUID of the UART-over-GATT service (Nordic UART Service layout)
pub const UUID_UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// The UUID of the UART TX characteristic (the write target)
pub const UUID_UART_TX_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// The UUID of the UART RX characteristic (the notify source)
pub const UUID_UART_RX_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// The UUID of the client characteristic configuration descriptor
pub const UUID_CCC_DESCRIPTOR: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Descriptor payload that enables notifications on a characteristic
pub const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// Low-energy scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 5;

/// Interval between link liveness checks in milliseconds
pub const LINK_WATCH_INTERVAL_MS: u64 = 1000;
