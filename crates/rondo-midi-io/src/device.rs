//! Device descriptors and the fixed-layout transfer record.

use serde::{Deserialize, Serialize};

/// Capacity of the bounded name field in [`RawDeviceInfo`], terminator
/// included.
pub const MAX_DEVICE_NAME_LENGTH: usize = 256;

/// Descriptor for one enumerated device.
///
/// Immutable once enumerated; identity is its index within the enumeration
/// snapshot plus its name. Snapshots are never refreshed — build a new
/// [`MidiSystem`](crate::MidiSystem) to see new hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human readable device name as reported by the driver.
    pub name: String,
    /// Driver-reported manufacturer id.
    pub manufacturer: u32,
    /// Driver-reported product id.
    pub product: u32,
    pub driver_major_version: u32,
    pub driver_minor_version: u32,
}

impl DeviceInfo {
    /// Descriptor with a name and zeroed driver fields, as virtual drivers
    /// report.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manufacturer: 0,
            product: 0,
            driver_major_version: 0,
            driver_minor_version: 0,
        }
    }

    /// Splits a packed BCD driver version (major in the high byte) the way
    /// multimedia capability records report it.
    pub fn with_packed_version(name: impl Into<String>, manufacturer: u32, product: u32, version: u32) -> Self {
        Self {
            name: name.into(),
            manufacturer,
            product,
            driver_major_version: (version >> 8) & 0xFF,
            driver_minor_version: version & 0xFF,
        }
    }
}

/// Fixed-layout device record used verbatim across a C shim boundary.
///
/// The name is written exactly once, truncated to the bounded length, and
/// always NUL-terminated.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawDeviceInfo {
    pub name: [u8; MAX_DEVICE_NAME_LENGTH],
    pub manufacturer: u32,
    pub product: u32,
    pub driver_major_version: u32,
    pub driver_minor_version: u32,
}

impl RawDeviceInfo {
    /// The name bytes up to (excluding) the terminator.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(self.name.len() - 1);
        &self.name[..end]
    }
}

impl From<&DeviceInfo> for RawDeviceInfo {
    fn from(info: &DeviceInfo) -> Self {
        let mut name = [0u8; MAX_DEVICE_NAME_LENGTH];
        let bytes = info.name.as_bytes();
        let copied = bytes.len().min(MAX_DEVICE_NAME_LENGTH - 1);
        name[..copied].copy_from_slice(&bytes[..copied]);

        Self {
            name,
            manufacturer: info.manufacturer,
            product: info.product,
            driver_major_version: info.driver_major_version,
            driver_minor_version: info.driver_minor_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_copies_fields() {
        let info = DeviceInfo {
            name: "Loopback A".into(),
            manufacturer: 7,
            product: 11,
            driver_major_version: 1,
            driver_minor_version: 2,
        };
        let raw = RawDeviceInfo::from(&info);
        assert_eq!(raw.name_bytes(), b"Loopback A");
        assert_eq!(raw.manufacturer, 7);
        assert_eq!(raw.product, 11);
        assert_eq!(raw.driver_major_version, 1);
        assert_eq!(raw.driver_minor_version, 2);
    }

    #[test]
    fn test_raw_record_truncates_and_terminates() {
        let info = DeviceInfo::named("x".repeat(2 * MAX_DEVICE_NAME_LENGTH));
        let raw = RawDeviceInfo::from(&info);
        assert_eq!(raw.name_bytes().len(), MAX_DEVICE_NAME_LENGTH - 1);
        assert_eq!(raw.name[MAX_DEVICE_NAME_LENGTH - 1], 0);
    }

    #[test]
    fn test_packed_version_split() {
        let info = DeviceInfo::with_packed_version("dev", 0, 0, 0x0305);
        assert_eq!(info.driver_major_version, 3);
        assert_eq!(info.driver_minor_version, 5);
    }
}
