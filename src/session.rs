//! GATT session for one connected peripheral
//! Owns the resolved characteristic handles of the UART service and decides
//! which capabilities (transmit, receive) the link actually has.

use log::{info, warn};
use uuid::Uuid;

use crate::constants::{UUID_UART_RX_CHAR, UUID_UART_TX_CHAR};
use crate::platform::CharacteristicInfo;

/// Resolved state of the UART service on the active link.
///
/// Usable for writes only once the TX characteristic has been resolved as
/// writable; discarded whenever the owning connection is torn down.
#[derive(Debug)]
pub struct UartSession {
    service: Uuid,
    tx: Option<Uuid>,
    rx: Option<Uuid>,
    notifications_armed: bool,
    transmit_ready_signaled: bool,
}

impl UartSession {
    pub fn new(service: Uuid) -> Self {
        Self {
            service,
            tx: None,
            rx: None,
            notifications_armed: false,
            transmit_ready_signaled: false,
        }
    }

    pub fn service(&self) -> Uuid {
        self.service
    }

    /// Looks up the TX and RX characteristics in a discovered set and
    /// returns the RX characteristic to arm, when notifications can be
    /// enabled on it.
    ///
    /// Partial availability is tolerated: a missing or non-writable TX
    /// leaves the session receive-only, a missing RX leaves nothing to arm.
    pub fn resolve_characteristics(
        &mut self,
        characteristics: &[CharacteristicInfo],
    ) -> Option<Uuid> {
        let mut armable = None;

        for info in characteristics {
            if info.uuid == UUID_UART_TX_CHAR {
                if info.writable {
                    info!("UART TX characteristic resolved");
                    self.tx = Some(info.uuid);
                } else {
                    warn!("UART TX characteristic present but not writable");
                }
            } else if info.uuid == UUID_UART_RX_CHAR {
                if info.notifiable {
                    info!("UART RX characteristic resolved");
                    self.rx = Some(info.uuid);
                    if info.has_ccc_descriptor {
                        armable = Some(info.uuid);
                    } else {
                        warn!("UART RX characteristic has no client configuration descriptor");
                    }
                } else {
                    warn!("UART RX characteristic present but does not notify");
                }
            }
        }

        if self.tx.is_none() {
            warn!("UART TX characteristic not found; transmit stays unavailable");
        }
        if self.rx.is_none() {
            warn!("UART RX characteristic not found; notifications stay unarmed");
        }

        armable
    }

    /// Marks notification arming complete. Returns `true` the first time a
    /// transmit-capable session finishes arming, so readiness is signaled
    /// exactly once.
    pub fn complete_arming(&mut self) -> bool {
        self.notifications_armed = true;
        if self.tx.is_some() && !self.transmit_ready_signaled {
            self.transmit_ready_signaled = true;
            return true;
        }
        false
    }

    /// The write target, once resolved as valid.
    pub fn tx_characteristic(&self) -> Option<Uuid> {
        self.tx
    }

    /// The notify source, once resolved as valid.
    pub fn rx_characteristic(&self) -> Option<Uuid> {
        self.rx
    }

    pub fn notifications_armed(&self) -> bool {
        self.notifications_armed
    }

    pub fn can_transmit(&self) -> bool {
        self.tx.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::UUID_UART_SERVICE;

    fn tx_char(writable: bool) -> CharacteristicInfo {
        CharacteristicInfo {
            uuid: UUID_UART_TX_CHAR,
            writable,
            notifiable: false,
            has_ccc_descriptor: false,
        }
    }

    fn rx_char(notifiable: bool, has_ccc: bool) -> CharacteristicInfo {
        CharacteristicInfo {
            uuid: UUID_UART_RX_CHAR,
            writable: false,
            notifiable,
            has_ccc_descriptor: has_ccc,
        }
    }

    #[test]
    fn resolves_both_characteristics() {
        let mut session = UartSession::new(UUID_UART_SERVICE);
        let armable = session.resolve_characteristics(&[tx_char(true), rx_char(true, true)]);

        assert_eq!(armable, Some(UUID_UART_RX_CHAR));
        assert!(session.can_transmit());
        assert_eq!(session.rx_characteristic(), Some(UUID_UART_RX_CHAR));
    }

    #[test]
    fn missing_tx_leaves_session_receive_only() {
        let mut session = UartSession::new(UUID_UART_SERVICE);
        let armable = session.resolve_characteristics(&[rx_char(true, true)]);

        assert_eq!(armable, Some(UUID_UART_RX_CHAR));
        assert!(!session.can_transmit());
    }

    #[test]
    fn non_writable_tx_is_not_a_write_target() {
        let mut session = UartSession::new(UUID_UART_SERVICE);
        session.resolve_characteristics(&[tx_char(false), rx_char(true, true)]);

        assert!(!session.can_transmit());
        assert!(session.tx_characteristic().is_none());
    }

    #[test]
    fn missing_rx_leaves_nothing_to_arm() {
        let mut session = UartSession::new(UUID_UART_SERVICE);
        let armable = session.resolve_characteristics(&[tx_char(true)]);

        assert!(armable.is_none());
        assert!(session.rx_characteristic().is_none());
    }

    #[test]
    fn rx_without_ccc_descriptor_is_not_armable() {
        let mut session = UartSession::new(UUID_UART_SERVICE);
        let armable = session.resolve_characteristics(&[rx_char(true, false)]);

        assert!(armable.is_none());
        assert_eq!(session.rx_characteristic(), Some(UUID_UART_RX_CHAR));
    }

    #[test]
    fn arming_signals_transmit_readiness_once() {
        let mut session = UartSession::new(UUID_UART_SERVICE);
        session.resolve_characteristics(&[tx_char(true), rx_char(true, true)]);

        assert!(session.complete_arming());
        assert!(!session.complete_arming());
        assert!(session.notifications_armed());
    }

    #[test]
    fn arming_without_tx_never_signals_readiness() {
        let mut session = UartSession::new(UUID_UART_SERVICE);
        session.resolve_characteristics(&[rx_char(true, true)]);

        assert!(!session.complete_arming());
        assert!(session.notifications_armed());
    }
}
