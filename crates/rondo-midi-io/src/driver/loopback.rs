//! In-process driver implementing the full [`MidiDriver`] contract.
//!
//! Virtual devices, no hardware: output ports record what the application
//! sends, input ports deliver injected events through a driver-owned
//! delivery thread, so callbacks genuinely arrive on a thread the
//! transports do not control. Long-message completion is FIFO and can be
//! held back to exercise the still-playing path.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::device::DeviceInfo;
use crate::driver::{
    BufferId, DriverEvent, InputCallback, InputConnection, MidiDriver, OutputConnection,
    Unprepared,
};
use crate::error::{Error, Result};

#[derive(Default)]
struct Flags {
    next_buffer_id: AtomicU64,
    hold_completions: AtomicBool,
    fail_short_sends: AtomicBool,
}

impl Flags {
    fn allocate_id(&self) -> BufferId {
        BufferId::new(self.next_buffer_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Virtual MIDI driver with a configurable device directory.
///
/// Clones are cheap and share the same ports and logs, so a test can keep
/// a handle for inspection after handing the driver to a system.
#[derive(Clone)]
pub struct LoopbackDriver {
    shared: Arc<DriverShared>,
}

struct DriverShared {
    outputs: Vec<DeviceInfo>,
    inputs: Vec<DeviceInfo>,
    flags: Arc<Flags>,
    output_ports: Mutex<HashMap<usize, Arc<OutputPort>>>,
    input_ports: Mutex<HashMap<usize, Arc<InputPort>>>,
}

impl LoopbackDriver {
    /// Driver with one virtual output and one virtual input device.
    pub fn new() -> Self {
        Self::with_devices(&["Loopback Output"], &["Loopback Input"])
    }

    /// Driver reporting exactly the given device names.
    pub fn with_devices(outputs: &[&str], inputs: &[&str]) -> Self {
        Self {
            shared: Arc::new(DriverShared {
                outputs: outputs.iter().copied().map(DeviceInfo::named).collect(),
                inputs: inputs.iter().copied().map(DeviceInfo::named).collect(),
                flags: Arc::new(Flags::default()),
                output_ports: Mutex::new(HashMap::new()),
                input_ports: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// While set, submitted long buffers stay in the transmitting state
    /// until released with [`complete_next`] or [`complete_all`].
    ///
    /// [`complete_next`]: LoopbackDriver::complete_next
    /// [`complete_all`]: LoopbackDriver::complete_all
    pub fn hold_completions(&self, hold: bool) {
        self.shared.flags.hold_completions.store(hold, Ordering::SeqCst);
    }

    /// Makes every subsequent short send fail, for error-path coverage.
    pub fn fail_short_sends(&self, fail: bool) {
        self.shared.flags.fail_short_sends.store(fail, Ordering::SeqCst);
    }

    /// Completes the oldest held transmission on an output port. Returns
    /// false if nothing was transmitting.
    pub fn complete_next(&self, output_index: usize) -> bool {
        match self.output_port(output_index) {
            Some(port) => port.complete_next(),
            None => false,
        }
    }

    /// Completes every held transmission on an output port, in order.
    pub fn complete_all(&self, output_index: usize) {
        if let Some(port) = self.output_port(output_index) {
            while port.complete_next() {}
        }
    }

    /// Every short word sent on an output port so far.
    pub fn sent_short(&self, output_index: usize) -> Vec<u32> {
        self.output_port(output_index)
            .map(|port| port.state.lock().short_log.clone())
            .unwrap_or_default()
    }

    /// Every completed long payload on an output port so far.
    pub fn sent_long(&self, output_index: usize) -> Vec<Vec<u8>> {
        self.output_port(output_index)
            .map(|port| port.state.lock().long_log.clone())
            .unwrap_or_default()
    }

    /// Number of submitted-but-uncompleted long buffers on an output port.
    pub fn transmitting(&self, output_index: usize) -> usize {
        self.output_port(output_index)
            .map(|port| port.state.lock().transmitting.len())
            .unwrap_or(0)
    }

    /// Prepared headers the driver is still holding, across every open
    /// port in both directions. Zero once all transports have torn down.
    pub fn outstanding_prepared(&self) -> usize {
        let outputs: usize = self
            .shared
            .output_ports
            .lock()
            .values()
            .map(|port| port.state.lock().prepared.len())
            .sum();
        let inputs: usize = self
            .shared
            .input_ports
            .lock()
            .values()
            .map(|port| port.state.lock().buffers.len())
            .sum();
        outputs + inputs
    }

    /// Receive buffers currently lent to the driver on an input port.
    pub fn available_receive_buffers(&self, input_index: usize) -> usize {
        self.input_port(input_index)
            .map(|port| port.state.lock().available.len())
            .unwrap_or(0)
    }

    /// Delivers a short event word (1-4 bytes, packed little-endian) to an
    /// open, started input port.
    pub fn inject_short(&self, input_index: usize, bytes: &[u8], timestamp: u64) -> Result<()> {
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(Error::InvalidArgument("short message must be 1-4 bytes"));
        }
        let mut packed = [0u8; 4];
        packed[..bytes.len()].copy_from_slice(bytes);

        let port = self
            .input_port(input_index)
            .ok_or(Error::driver("inject_short", "input port not open"))?;
        port.deliver(Delivery::Short {
            packed: u32::from_le_bytes(packed),
            timestamp,
        })
    }

    /// Fills the oldest lent receive buffer of an input port with `data`
    /// (truncated to the buffer capacity, zero-length allowed) and delivers
    /// the completion.
    pub fn inject_long(&self, input_index: usize, data: &[u8], timestamp: u64) -> Result<()> {
        let port = self
            .input_port(input_index)
            .ok_or(Error::driver("inject_long", "input port not open"))?;
        port.fill_next(data, timestamp)
    }

    fn output_port(&self, index: usize) -> Option<Arc<OutputPort>> {
        self.shared.output_ports.lock().get(&index).cloned()
    }

    fn input_port(&self, index: usize) -> Option<Arc<InputPort>> {
        self.shared.input_ports.lock().get(&index).cloned()
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiDriver for LoopbackDriver {
    fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.shared.outputs.clone())
    }

    fn input_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.shared.inputs.clone())
    }

    fn open_output(&self, index: usize) -> Result<Box<dyn OutputConnection>> {
        if index >= self.shared.outputs.len() {
            return Err(Error::driver("open_output", format!("no device {index}")));
        }

        let port = Arc::new(OutputPort {
            flags: self.shared.flags.clone(),
            state: Mutex::new(OutputState::default()),
        });
        self.shared.output_ports.lock().insert(index, port.clone());
        Ok(Box::new(LoopbackOutput { port }))
    }

    fn open_input(&self, index: usize) -> Result<Arc<dyn InputConnection>> {
        if index >= self.shared.inputs.len() {
            return Err(Error::driver("open_input", format!("no device {index}")));
        }

        let port = Arc::new(InputPort {
            flags: self.shared.flags.clone(),
            state: Mutex::new(InputState::default()),
        });
        let (sender, receiver) = unbounded();
        port.state.lock().sender = Some(sender);

        let callback: CallbackSlot = Arc::new(Mutex::new(None));
        let worker = spawn_delivery_thread(receiver, callback.clone())?;

        let connection = Arc::new(LoopbackInput {
            port: port.clone(),
            callback,
            worker: Mutex::new(Some(worker)),
        });
        self.shared.input_ports.lock().insert(index, port);
        Ok(connection)
    }
}

// ---------------------------------------------------------------------------
// Output side
// ---------------------------------------------------------------------------

struct OutputPort {
    flags: Arc<Flags>,
    state: Mutex<OutputState>,
}

#[derive(Default)]
struct OutputState {
    prepared: HashMap<u64, LongBuffer>,
    /// Submission-ordered ids still transmitting (held completions).
    transmitting: VecDeque<u64>,
    short_log: Vec<u32>,
    long_log: Vec<Vec<u8>>,
}

struct LongBuffer {
    data: Vec<u8>,
    playing: bool,
}

impl OutputPort {
    fn complete_next(&self) -> bool {
        let mut state = self.state.lock();
        let Some(id) = state.transmitting.pop_front() else {
            return false;
        };
        if let Some(buffer) = state.prepared.get_mut(&id) {
            buffer.playing = false;
            let data = buffer.data.clone();
            state.long_log.push(data);
        }
        true
    }
}

struct LoopbackOutput {
    port: Arc<OutputPort>,
}

impl OutputConnection for LoopbackOutput {
    fn send_short(&self, packed: u32) -> Result<()> {
        if self.port.flags.fail_short_sends.load(Ordering::SeqCst) {
            return Err(Error::driver("send_short", "injected failure"));
        }
        self.port.state.lock().short_log.push(packed);
        Ok(())
    }

    fn prepare(&self, data: &[u8]) -> Result<BufferId> {
        let id = self.port.flags.allocate_id();
        self.port.state.lock().prepared.insert(
            id.raw(),
            LongBuffer {
                data: data.to_vec(),
                playing: false,
            },
        );
        Ok(id)
    }

    fn submit(&self, id: BufferId) -> Result<()> {
        let hold = self.port.flags.hold_completions.load(Ordering::SeqCst);
        let mut state = self.port.state.lock();
        let Some(buffer) = state.prepared.get_mut(&id.raw()) else {
            return Err(Error::driver("submit", "buffer not prepared"));
        };

        if hold {
            buffer.playing = true;
            state.transmitting.push_back(id.raw());
        } else {
            let data = buffer.data.clone();
            state.long_log.push(data);
        }
        Ok(())
    }

    fn unprepare(&self, id: BufferId) -> Result<Unprepared> {
        let mut state = self.port.state.lock();
        match state.prepared.get(&id.raw()) {
            Some(buffer) if buffer.playing => Ok(Unprepared::StillPlaying),
            Some(_) => {
                state.prepared.remove(&id.raw());
                Ok(Unprepared::Released)
            }
            None => Err(Error::driver("unprepare", "buffer not prepared")),
        }
    }

    fn reset(&self) {
        // Aborted transmissions are returned to the application without
        // being sent.
        let mut state = self.port.state.lock();
        while let Some(id) = state.transmitting.pop_front() {
            if let Some(buffer) = state.prepared.get_mut(&id) {
                buffer.playing = false;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Input side
// ---------------------------------------------------------------------------

type CallbackSlot = Arc<Mutex<Option<InputCallback>>>;

enum Delivery {
    Short { packed: u32, timestamp: u64 },
    Long {
        id: BufferId,
        data: Vec<u8>,
        timestamp: u64,
    },
}

fn spawn_delivery_thread(
    receiver: Receiver<Delivery>,
    callback: CallbackSlot,
) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("loopback-midi-delivery".into())
        .spawn(move || {
            for delivery in receiver {
                let guard = callback.lock();
                let Some(callback) = guard.as_ref() else {
                    debug!("input event delivered before callback installed, dropping");
                    continue;
                };
                match delivery {
                    Delivery::Short { packed, timestamp } => {
                        callback(DriverEvent::Short { packed, timestamp });
                    }
                    Delivery::Long {
                        id,
                        data,
                        timestamp,
                    } => {
                        callback(DriverEvent::Long {
                            id,
                            data: &data,
                            timestamp,
                        });
                    }
                }
            }
        })?;
    Ok(handle)
}

struct InputPort {
    flags: Arc<Flags>,
    state: Mutex<InputState>,
}

#[derive(Default)]
struct InputState {
    buffers: HashMap<u64, ReceiveBuffer>,
    /// Buffers currently lent to the driver, oldest first.
    available: VecDeque<u64>,
    started: bool,
    sender: Option<Sender<Delivery>>,
}

struct ReceiveBuffer {
    capacity: usize,
}

impl InputPort {
    fn deliver(&self, delivery: Delivery) -> Result<()> {
        let sender = {
            let state = self.state.lock();
            if !state.started {
                return Err(Error::driver("deliver", "reception not started"));
            }
            state.sender.clone()
        };
        match sender {
            Some(sender) => sender
                .send(delivery)
                .map_err(|_| Error::driver("deliver", "delivery thread gone")),
            None => Err(Error::driver("deliver", "port stopped")),
        }
    }

    fn fill_next(&self, data: &[u8], timestamp: u64) -> Result<()> {
        let (id, recorded) = {
            let mut state = self.state.lock();
            if !state.started {
                return Err(Error::driver("inject_long", "reception not started"));
            }
            let Some(id) = state.available.pop_front() else {
                return Err(Error::driver("inject_long", "no receive buffer available"));
            };
            let capacity = state
                .buffers
                .get(&id)
                .map(|buffer| buffer.capacity)
                .unwrap_or(0);
            (id, data.len().min(capacity))
        };

        self.deliver(Delivery::Long {
            id: BufferId::new(id),
            data: data[..recorded].to_vec(),
            timestamp,
        })
    }
}

struct LoopbackInput {
    port: Arc<InputPort>,
    callback: CallbackSlot,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InputConnection for LoopbackInput {
    fn set_callback(&self, callback: InputCallback) -> Result<()> {
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn prepare_receive(&self, capacity: usize) -> Result<BufferId> {
        if capacity == 0 {
            return Err(Error::driver("prepare_receive", "zero capacity"));
        }
        let id = self.port.flags.allocate_id();
        self.port
            .state
            .lock()
            .buffers
            .insert(id.raw(), ReceiveBuffer { capacity });
        Ok(id)
    }

    fn add_buffer(&self, id: BufferId) -> Result<()> {
        let mut state = self.port.state.lock();
        if !state.buffers.contains_key(&id.raw()) {
            return Err(Error::driver("add_buffer", "buffer not prepared"));
        }
        state.available.push_back(id.raw());
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut state = self.port.state.lock();
        if state.sender.is_none() {
            return Err(Error::driver("start", "port stopped"));
        }
        state.started = true;
        Ok(())
    }

    fn stop(&self) {
        {
            let mut state = self.port.state.lock();
            state.started = false;
            // Dropping the sender ends the delivery loop.
            state.sender = None;
        }
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        *self.callback.lock() = None;
    }

    fn unprepare(&self, id: BufferId) -> Result<()> {
        let mut state = self.port.state.lock();
        if state.started {
            return Err(Error::driver("unprepare", "reception still running"));
        }
        if state.buffers.remove(&id.raw()).is_none() {
            return Err(Error::driver("unprepare", "buffer not prepared"));
        }
        state.available.retain(|&queued| queued != id.raw());
        Ok(())
    }
}

impl Drop for LoopbackInput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_past_directory_fails_with_driver_error() {
        let driver = LoopbackDriver::new();
        assert!(matches!(
            driver.open_output(5).err(),
            Some(Error::Driver { op: "open_output", .. })
        ));
    }

    #[test]
    fn test_long_buffer_lifecycle() {
        let driver = LoopbackDriver::new();
        let out = driver.open_output(0).unwrap();

        let id = out.prepare(&[0xF0, 0x01, 0xF7]).unwrap();
        assert_eq!(driver.outstanding_prepared(), 1);

        out.submit(id).unwrap();
        assert_eq!(out.unprepare(id).unwrap(), Unprepared::Released);
        assert_eq!(driver.outstanding_prepared(), 0);
        assert_eq!(driver.sent_long(0), vec![vec![0xF0, 0x01, 0xF7]]);
    }

    #[test]
    fn test_held_completion_reports_still_playing() {
        let driver = LoopbackDriver::new();
        let out = driver.open_output(0).unwrap();
        driver.hold_completions(true);

        let id = out.prepare(&[0xF0, 0xF7]).unwrap();
        out.submit(id).unwrap();
        assert_eq!(out.unprepare(id).unwrap(), Unprepared::StillPlaying);

        assert!(driver.complete_next(0));
        assert_eq!(out.unprepare(id).unwrap(), Unprepared::Released);
    }

    #[test]
    fn test_unprepare_unknown_buffer_is_an_error() {
        let driver = LoopbackDriver::new();
        let out = driver.open_output(0).unwrap();
        assert!(out.unprepare(BufferId::new(99)).is_err());
    }

    #[test]
    fn test_inject_requires_started_port() {
        let driver = LoopbackDriver::new();
        let _input = driver.open_input(0).unwrap();
        assert!(driver.inject_short(0, &[0xF8], 0).is_err());
    }
}
