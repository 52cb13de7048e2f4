//! The seam between the transports and a platform multimedia driver.
//!
//! The traits here model the contract of an OS MIDI driver: capability
//! queries at enumeration time, short messages submitted as one packed
//! word, long messages moved through prepare/submit/unprepare with a
//! transient still-playing state, and input delivered by a driver-owned
//! callback thread filling a pool of prepared receive buffers.
//!
//! The built-in [`LoopbackDriver`] implements the contract in-process;
//! platform drivers plug in through [`MidiDriver`] without touching the
//! transports.

mod loopback;
pub use loopback::LoopbackDriver;

use std::sync::Arc;

use crate::device::DeviceInfo;
use crate::error::Result;

/// Handle to a driver-pinned long-message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Result of asking the driver to release a long-message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unprepared {
    /// The buffer was released; its id is no longer valid.
    Released,
    /// The driver is still transmitting the buffer. Not an error — retry
    /// after its completion.
    StillPlaying,
}

/// An input event as the driver reports it, timestamps in milliseconds of
/// the driver's own clock.
#[derive(Debug)]
pub enum DriverEvent<'a> {
    /// A short message packed little-endian into one word, no buffer
    /// indirection.
    Short { packed: u32, timestamp: u64 },
    /// A filled receive buffer handed back by reference. The buffer is not
    /// reused until it is resubmitted with
    /// [`InputConnection::add_buffer`].
    Long {
        id: BufferId,
        data: &'a [u8],
        timestamp: u64,
    },
}

/// Callback invoked by the driver on a thread the application does not
/// control. Implementations must not block.
pub type InputCallback = Box<dyn Fn(DriverEvent<'_>) + Send + Sync + 'static>;

/// Entry point a platform driver implements.
pub trait MidiDriver: Send + Sync {
    /// Capability query for every output device, in stable index order.
    /// Any per-device failure fails the whole query.
    fn output_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Capability query for every input device, in stable index order.
    fn input_devices(&self) -> Result<Vec<DeviceInfo>>;

    fn open_output(&self, index: usize) -> Result<Box<dyn OutputConnection>>;

    fn open_input(&self, index: usize) -> Result<Arc<dyn InputConnection>>;
}

/// An open output handle. Closing happens on drop.
pub trait OutputConnection: Send + Sync {
    /// Synchronously submits one short message packed into a word.
    fn send_short(&self, packed: u32) -> Result<()>;

    /// Copies and pins `data` for asynchronous transmission, establishing
    /// driver bookkeeping. Must be paired with [`unprepare`].
    ///
    /// [`unprepare`]: OutputConnection::unprepare
    fn prepare(&self, data: &[u8]) -> Result<BufferId>;

    /// Hands a prepared buffer to the driver for transmission. Returns as
    /// soon as the driver accepts the buffer. Buffers complete in
    /// submission order.
    fn submit(&self, id: BufferId) -> Result<()>;

    /// Releases a prepared buffer, or reports it still transmitting.
    fn unprepare(&self, id: BufferId) -> Result<Unprepared>;

    /// Best-effort abort of any in-flight transmission before close.
    fn reset(&self);
}

/// An open input handle. Closing happens on drop; [`stop`] must quiesce the
/// callback first.
///
/// [`stop`]: InputConnection::stop
pub trait InputConnection: Send + Sync {
    /// Installs the event callback. Must be called before buffers are
    /// submitted or reception started.
    fn set_callback(&self, callback: InputCallback) -> Result<()>;

    /// Allocates and pins one receive buffer of the given capacity.
    fn prepare_receive(&self, capacity: usize) -> Result<BufferId>;

    /// Lends a prepared buffer to the driver for filling. Called again to
    /// resubmit after each completed fill.
    fn add_buffer(&self, id: BufferId) -> Result<()>;

    /// Starts reception.
    fn start(&self) -> Result<()>;

    /// Stops reception and releases the callback. No callback runs after
    /// this returns.
    fn stop(&self);

    /// Releases a prepared receive buffer. Only valid after [`stop`].
    ///
    /// [`stop`]: InputConnection::stop
    fn unprepare(&self, id: BufferId) -> Result<()>;
}
