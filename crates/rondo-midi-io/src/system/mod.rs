//! Composition root: device directory plus transport factories.

mod builder;

pub use builder::MidiSystemBuilder;

use std::sync::Arc;

use crate::device::DeviceInfo;
use crate::driver::MidiDriver;
use crate::error::{Error, Result};
use crate::io::{InputDevice, OutputDevice, PoolConfig};

/// Handle to a MIDI system.
///
/// Construction enumerates the driver's devices once; the resulting
/// directory is immutable and index-stable for the system's lifetime.
/// Build a new system to observe devices attached since.
///
/// Cloning is cheap and every clone refers to the same directory.
#[derive(Clone)]
pub struct MidiSystem {
    inner: Arc<SystemInner>,
}

struct SystemInner {
    driver: Arc<dyn MidiDriver>,
    outputs: Vec<DeviceInfo>,
    inputs: Vec<DeviceInfo>,
    pool: PoolConfig,
}

impl MidiSystem {
    /// Creates a system with default settings and the default driver.
    pub fn new() -> Result<Self> {
        MidiSystemBuilder::new().build()
    }

    /// Returns a builder for configuring the system before creation.
    pub fn builder() -> MidiSystemBuilder {
        MidiSystemBuilder::new()
    }

    pub(crate) fn from_parts(driver: Arc<dyn MidiDriver>, pool: PoolConfig) -> Result<Self> {
        let outputs = driver.output_devices()?;
        let inputs = driver.input_devices()?;
        Ok(Self {
            inner: Arc::new(SystemInner {
                driver,
                outputs,
                inputs,
                pool,
            }),
        })
    }

    pub fn output_device_count(&self) -> usize {
        self.inner.outputs.len()
    }

    pub fn input_device_count(&self) -> usize {
        self.inner.inputs.len()
    }

    /// Returns the descriptor of the output device at `index`.
    pub fn output_device_info(&self, index: usize) -> Result<&DeviceInfo> {
        self.inner.outputs.get(index).ok_or(Error::InvalidIndex {
            index,
            count: self.inner.outputs.len(),
        })
    }

    /// Returns the descriptor of the input device at `index`.
    pub fn input_device_info(&self, index: usize) -> Result<&DeviceInfo> {
        self.inner.inputs.get(index).ok_or(Error::InvalidIndex {
            index,
            count: self.inner.inputs.len(),
        })
    }

    /// Opens the first output device whose name matches `name` exactly.
    pub fn create_output_device(&self, name: &str) -> Result<OutputDevice> {
        let index = Self::find_by_name(&self.inner.outputs, name)?;
        OutputDevice::open(self.inner.driver.open_output(index)?)
    }

    /// Opens the first input device whose name matches `name` exactly.
    pub fn create_input_device(&self, name: &str) -> Result<InputDevice> {
        let index = Self::find_by_name(&self.inner.inputs, name)?;
        InputDevice::open(self.inner.driver.open_input(index)?, self.inner.pool)
    }

    /// Lookup never reaches the driver, so an absent name reports
    /// `DeviceNotFound` even when the directory is empty.
    fn find_by_name(devices: &[DeviceInfo], name: &str) -> Result<usize> {
        devices
            .iter()
            .position(|device| device.name == name)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::LoopbackDriver;

    fn build(driver: LoopbackDriver) -> MidiSystem {
        MidiSystem::builder()
            .driver(Arc::new(driver))
            .build()
            .unwrap()
    }

    #[test]
    fn test_directory_is_captured_at_construction() {
        let system = build(LoopbackDriver::with_devices(
            &["Out A", "Out B"],
            &["In A"],
        ));
        assert_eq!(system.output_device_count(), 2);
        assert_eq!(system.input_device_count(), 1);
        assert_eq!(system.output_device_info(1).unwrap().name, "Out B");
        assert_eq!(system.input_device_info(0).unwrap().name, "In A");
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let system = build(LoopbackDriver::with_devices(&["Out A"], &[]));
        assert!(matches!(
            system.output_device_info(1),
            Err(Error::InvalidIndex { index: 1, count: 1 })
        ));
        assert!(matches!(
            system.input_device_info(0),
            Err(Error::InvalidIndex { index: 0, count: 0 })
        ));
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let system = build(LoopbackDriver::with_devices(&["Out A"], &[]));
        assert!(matches!(
            system.create_output_device("Out Z"),
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_empty_directory_reports_not_found_not_driver_error() {
        let system = build(LoopbackDriver::with_devices(&[], &[]));
        assert!(matches!(
            system.create_output_device("anything"),
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            system.create_input_device("anything"),
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_first_match_wins_for_duplicate_names() {
        let driver = LoopbackDriver::with_devices(&["Same", "Same"], &[]);
        let system = build(driver.clone());
        let device = system.create_output_device("Same").unwrap();
        device.send(&[0xF8]).unwrap();
        assert_eq!(driver.sent_short(0), vec![0xF8]);
        assert!(driver.sent_short(1).is_empty());
    }

    #[test]
    fn test_clones_share_one_directory() {
        let system = build(LoopbackDriver::with_devices(&["Out A"], &[]));
        let clone = system.clone();
        assert_eq!(clone.output_device_info(0).unwrap().name, "Out A");
    }
}
