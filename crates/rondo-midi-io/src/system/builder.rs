use std::sync::Arc;

use tracing::debug;

use crate::driver::{LoopbackDriver, MidiDriver};
use crate::error::{Error, Result};
use crate::io::PoolConfig;
use crate::system::MidiSystem;

/// Buffers lent to the driver per input device.
const DEFAULT_RECEIVE_BUFFER_COUNT: usize = 4;
/// Capacity of each receive buffer in bytes. Bounds the largest system
/// exclusive message an input device can accept in one piece.
const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 1024;

/// Builder for [`MidiSystem`].
///
/// ```
/// use rondo_midi_io::MidiSystem;
///
/// let system = MidiSystem::builder()
///     .receive_pool(8, 4096)
///     .build()?;
/// # Ok::<(), rondo_midi_io::Error>(())
/// ```
pub struct MidiSystemBuilder {
    driver: Option<Arc<dyn MidiDriver>>,
    pool: PoolConfig,
}

impl MidiSystemBuilder {
    pub fn new() -> Self {
        Self {
            driver: None,
            pool: PoolConfig {
                count: DEFAULT_RECEIVE_BUFFER_COUNT,
                capacity: DEFAULT_RECEIVE_BUFFER_SIZE,
            },
        }
    }

    /// Uses `driver` instead of the default in-process loopback driver.
    pub fn driver(mut self, driver: Arc<dyn MidiDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Sets the receive buffer pool used by every input device the system
    /// creates: `count` buffers of `capacity` bytes each.
    pub fn receive_pool(mut self, count: usize, capacity: usize) -> Self {
        self.pool = PoolConfig { count, capacity };
        self
    }

    pub fn build(self) -> Result<MidiSystem> {
        if self.pool.count == 0 {
            return Err(Error::InvalidArgument("receive pool count must be nonzero"));
        }
        if self.pool.capacity == 0 {
            return Err(Error::InvalidArgument(
                "receive buffer capacity must be nonzero",
            ));
        }

        let driver = self
            .driver
            .unwrap_or_else(|| Arc::new(LoopbackDriver::new()));
        let system = MidiSystem::from_parts(driver, self.pool)?;
        debug!(
            outputs = system.output_device_count(),
            inputs = system.input_device_count(),
            "midi system created"
        );
        Ok(system)
    }
}

impl Default for MidiSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build_uses_loopback_driver() {
        let system = MidiSystem::new().unwrap();
        assert_eq!(system.output_device_count(), 1);
        assert_eq!(system.input_device_count(), 1);
        assert_eq!(
            system.output_device_info(0).unwrap().name,
            "Loopback Output"
        );
    }

    #[test]
    fn test_zero_pool_settings_are_rejected() {
        assert!(matches!(
            MidiSystem::builder().receive_pool(0, 1024).build(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            MidiSystem::builder().receive_pool(4, 0).build(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_custom_pool_reaches_input_devices() {
        let driver = LoopbackDriver::new();
        let system = MidiSystem::builder()
            .driver(Arc::new(driver.clone()))
            .receive_pool(2, 64)
            .build()
            .unwrap();

        let _input = system.create_input_device("Loopback Input").unwrap();
        assert_eq!(driver.available_receive_buffers(0), 2);
    }
}
