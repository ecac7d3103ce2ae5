//! Discovered-device bookkeeping
//! Holds the peripherals reported by the most recent scan, in discovery
//! order, and resolves connect requests made by display name.

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;

/// Stable platform identifier for a peripheral. Two devices may share a
/// display name; they never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceId(pub String);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A peripheral reported by the scan driver.
#[derive(Debug, Clone, Serialize)]
pub struct PeripheralRecord {
    /// Platform-specific unique identifier for the device
    pub id: DeviceId,
    /// The advertised name of the device, if available
    pub name: Option<String>,
    /// MAC address recovered from the platform id, when one is embedded there
    pub address: Option<String>,
    /// When the scan reported this device
    pub discovered_at: DateTime<Local>,
}

impl PeripheralRecord {
    pub fn new(id: DeviceId, name: Option<String>) -> Self {
        let address = extract_mac_address(&id.0);
        Self {
            id,
            name,
            address,
            discovered_at: Local::now(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Registry of the devices found by the most recent scan.
///
/// Cleared and repopulated on every refresh; the scan driver is expected not
/// to redeliver an identity within one scan, and if it does the record is
/// overwritten in place.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    records: Vec<PeripheralRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every known record ahead of a new scan.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Stores a discovery. A re-discovered id keeps its list position; only
    /// the record content is replaced.
    pub fn insert(&mut self, record: PeripheralRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Display names in discovery order.
    pub fn list(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.display_name().to_string())
            .collect()
    }

    /// The first record whose display name matches exactly. Name lookup is
    /// ambiguous when two peripherals advertise the same name; the earliest
    /// discovery wins.
    pub fn select(&self, name: &str) -> Option<&PeripheralRecord> {
        self.records.iter().find(|r| r.display_name() == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn extract_mac_address(device_id_str: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").unwrap();
    re.find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().to_string().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str) -> PeripheralRecord {
        PeripheralRecord::new(DeviceId(id.to_string()), Some(name.to_string()))
    }

    #[test]
    fn list_follows_discovery_order() {
        let mut registry = DeviceRegistry::new();
        registry.insert(record("dev-1", "Foo"));
        registry.insert(record("dev-2", "Bar"));

        assert_eq!(registry.list(), ["Foo", "Bar"]);
    }

    #[test]
    fn clear_forgets_previous_scan() {
        let mut registry = DeviceRegistry::new();
        registry.insert(record("dev-1", "Foo"));
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.select("Foo").is_none());
    }

    #[test]
    fn select_returns_first_match_among_shared_names() {
        let mut registry = DeviceRegistry::new();
        registry.insert(record("dev-1", "UART Friend"));
        registry.insert(record("dev-2", "UART Friend"));

        let selected = registry.select("UART Friend").unwrap();
        assert_eq!(selected.id, DeviceId("dev-1".to_string()));
    }

    #[test]
    fn select_unknown_name_returns_none() {
        let mut registry = DeviceRegistry::new();
        registry.insert(record("dev-1", "Foo"));

        assert!(registry.select("Bar").is_none());
    }

    #[test]
    fn rediscovered_id_keeps_its_position() {
        let mut registry = DeviceRegistry::new();
        registry.insert(record("dev-1", "Foo"));
        registry.insert(record("dev-2", "Bar"));
        registry.insert(record("dev-1", "Foo (renamed)"));

        assert_eq!(registry.list(), ["Foo (renamed)", "Bar"]);
    }

    #[test]
    fn unnamed_devices_list_as_unknown() {
        let mut registry = DeviceRegistry::new();
        registry.insert(PeripheralRecord::new(DeviceId("dev-1".to_string()), None));

        assert_eq!(registry.list(), ["Unknown"]);
    }

    #[test]
    fn mac_address_is_extracted_from_platform_id() {
        let record = PeripheralRecord::new(
            DeviceId("BluetoothLE#BluetoothLEc0:28:8d:05:5a:09-e4:5f:01:aa:bb:cc".to_string()),
            Some("Foo".to_string()),
        );

        assert_eq!(record.address.as_deref(), Some("E4:5F:01:AA:BB:CC"));
    }

    #[test]
    fn ids_without_embedded_address_have_none() {
        let record = PeripheralRecord::new(
            DeviceId("12345678-90ab".to_string()),
            Some("Foo".to_string()),
        );

        assert!(record.address.is_none());
    }
}
