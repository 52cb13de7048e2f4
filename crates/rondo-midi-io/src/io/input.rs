//! MIDI input transport: driver callbacks feed an internal queue that
//! blocking receive calls drain in arrival order.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::driver::{BufferId, DriverEvent, InputConnection};
use crate::error::{Error, Result};
use crate::MidiTimestamp;

/// One received MIDI message plus its arrival time, in milliseconds
/// relative to the device's first message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedMessage {
    pub data: Vec<u8>,
    pub timestamp: MidiTimestamp,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolConfig {
    pub(crate) count: usize,
    pub(crate) capacity: usize,
}

/// An open MIDI input device.
///
/// The driver delivers messages on its own callback thread; they queue
/// internally until read with [`receive`](Self::receive) or
/// [`receive_into`](Self::receive_into). Message boundaries are preserved:
/// one driver event is one queue entry, never split or coalesced.
pub struct InputDevice {
    connection: Arc<dyn InputConnection>,
    shared: Arc<InputShared>,
    pool: Vec<BufferId>,
}

struct InputShared {
    state: Mutex<InputState>,
    ready: Condvar,
}

#[derive(Default)]
struct InputState {
    queue: VecDeque<TimestampedMessage>,
    /// Raw driver timestamp of the first message, latched once.
    epoch: Option<u64>,
    closed: bool,
}

impl InputDevice {
    pub(crate) fn open(connection: Arc<dyn InputConnection>, pool: PoolConfig) -> Result<Self> {
        let shared = Arc::new(InputShared {
            state: Mutex::new(InputState::default()),
            ready: Condvar::new(),
        });

        // Build the device before priming so a failure partway through
        // still unwinds the already-prepared buffers on drop.
        let mut device = Self {
            connection: connection.clone(),
            shared: shared.clone(),
            pool: Vec::with_capacity(pool.count),
        };

        let callback_shared = shared;
        let callback_connection = Arc::downgrade(&connection);
        device.connection.set_callback(Box::new(move |event| {
            callback_shared.handle_event(&callback_connection, event);
        }))?;

        for _ in 0..pool.count {
            let id = device.connection.prepare_receive(pool.capacity)?;
            device.pool.push(id);
            device.connection.add_buffer(id)?;
        }
        device.connection.start()?;

        Ok(device)
    }

    /// Blocks until a message arrives and returns it.
    ///
    /// Returns [`Error::Closed`] once the device has been closed and the
    /// queue is drained.
    pub fn receive(&self) -> Result<TimestampedMessage> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(message) = state.queue.pop_front() {
                return Ok(message);
            }
            if state.closed {
                return Err(Error::Closed);
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Blocks until a message arrives, then copies its bytes into `buffer`.
    ///
    /// If `buffer` is too small the message stays queued and the required
    /// size is reported in the error, so the caller can retry with a larger
    /// buffer without losing data.
    pub fn receive_into(&self, buffer: &mut [u8]) -> Result<(usize, MidiTimestamp)> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(needed) = state.queue.front().map(|message| message.data.len()) {
                if needed > buffer.len() {
                    return Err(Error::BufferTooSmall {
                        needed,
                        capacity: buffer.len(),
                    });
                }
                if let Some(message) = state.queue.pop_front() {
                    buffer[..needed].copy_from_slice(&message.data);
                    return Ok((needed, message.timestamp));
                }
            }
            if state.closed {
                return Err(Error::Closed);
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Blocks until a message arrives and returns its length in bytes
    /// without dequeuing it.
    pub fn next_message_len(&self) -> Result<usize> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(message) = state.queue.front() {
                return Ok(message.data.len());
            }
            if state.closed {
                return Err(Error::Closed);
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Stops reception and wakes every blocked receiver with
    /// [`Error::Closed`]. Messages already queued remain readable.
    ///
    /// Called automatically on drop; calling it twice is harmless.
    pub fn close(&self) {
        self.connection.stop();
        let mut state = self.shared.state.lock();
        state.closed = true;
        self.shared.ready.notify_all();
    }
}

impl InputShared {
    /// Runs on the driver's callback thread.
    fn handle_event(&self, connection: &Weak<dyn InputConnection>, event: DriverEvent<'_>) {
        match event {
            DriverEvent::Short { packed, timestamp } => {
                let bytes = packed.to_le_bytes();
                let len = rondo_midi::message_length(&bytes);
                if len == 0 {
                    debug!(packed, "dropping unrecognized short event");
                    return;
                }
                self.enqueue(bytes[..len].to_vec(), timestamp);
            }
            DriverEvent::Long { id, data, timestamp } => {
                let payload = (!data.is_empty()).then(|| data.to_vec());
                // Hand the buffer straight back to the driver so the pool
                // never shrinks, even on empty completions.
                if let Some(connection) = connection.upgrade() {
                    if let Err(err) = connection.add_buffer(id) {
                        warn!(error = %err, "failed to resubmit receive buffer");
                    }
                }
                if let Some(payload) = payload {
                    self.enqueue(payload, timestamp);
                }
            }
        }
    }

    fn enqueue(&self, data: Vec<u8>, raw_timestamp: u64) {
        let mut state = self.state.lock();
        let epoch = *state.epoch.get_or_insert(raw_timestamp);
        state.queue.push_back(TimestampedMessage {
            data,
            timestamp: raw_timestamp.saturating_sub(epoch),
        });
        self.ready.notify_one();
    }
}

impl Drop for InputDevice {
    fn drop(&mut self) {
        self.close();
        for &id in &self.pool {
            if let Err(err) = self.connection.unprepare(id) {
                warn!(error = %err, "failed to release receive buffer");
            }
        }
    }
}
