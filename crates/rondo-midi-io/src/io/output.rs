//! MIDI output transport: short/buffered dispatch plus a background
//! reclamation thread for driver-pinned long-message buffers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::driver::{BufferId, OutputConnection, Unprepared};
use crate::error::{Error, Result};

/// How often the reclamation thread polls when the driver completes a
/// buffer without an explicit wake.
const RECLAIM_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An open MIDI output device.
///
/// `send` accepts raw MIDI bytes. Messages of three bytes or fewer (other
/// than system exclusive) go out synchronously as one packed word; anything
/// longer, and any sysex message, is copied into a driver-prepared buffer
/// and transmitted asynchronously. A per-device background thread releases
/// those buffers as the driver completes them, in submission order.
pub struct OutputDevice {
    shared: Arc<OutputShared>,
    reclaim_thread: Option<JoinHandle<()>>,
}

struct OutputShared {
    connection: Box<dyn OutputConnection>,
    pending: Mutex<PendingBuffers>,
    wake: Condvar,
}

#[derive(Default)]
struct PendingBuffers {
    /// Submitted long buffers in FIFO completion order.
    queue: VecDeque<BufferId>,
    shutdown: bool,
}

impl OutputDevice {
    pub(crate) fn open(connection: Box<dyn OutputConnection>) -> Result<Self> {
        let shared = Arc::new(OutputShared {
            connection,
            pending: Mutex::new(PendingBuffers::default()),
            wake: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let reclaim_thread = std::thread::Builder::new()
            .name("rondo-midi-reclaim".into())
            .spawn(move || worker_shared.reclaim_loop())?;

        Ok(Self {
            shared,
            reclaim_thread: Some(reclaim_thread),
        })
    }

    /// Sends one complete MIDI message, returning the number of bytes
    /// accepted.
    ///
    /// The buffered path returns as soon as the driver accepts the buffer,
    /// not when transmission completes.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("empty message buffer"));
        }

        if rondo_midi::status::is_system_exclusive(data[0]) || data.len() > 3 {
            self.send_buffered(data)?;
        } else {
            self.send_short(data)?;
        }
        Ok(data.len())
    }

    fn send_short(&self, data: &[u8]) -> Result<()> {
        let mut packed = [0u8; 4];
        packed[..data.len()].copy_from_slice(data);
        self.shared.connection.send_short(u32::from_le_bytes(packed))
    }

    fn send_buffered(&self, data: &[u8]) -> Result<()> {
        let connection = &self.shared.connection;
        let id = connection.prepare(data)?;
        if let Err(err) = connection.submit(id) {
            // The buffer never reached the driver; release it here rather
            // than leaking a prepared header.
            if let Err(unprepare_err) = connection.unprepare(id) {
                warn!(error = %unprepare_err, "failed to release unsubmitted buffer");
            }
            return Err(err);
        }

        self.shared.pending.lock().queue.push_back(id);
        self.shared.wake.notify_one();
        Ok(())
    }
}

impl OutputShared {
    /// Runs for the device's whole lifetime. Wakes on submission signals or
    /// on a fixed interval, releases completed buffers from the head of the
    /// FIFO, and on shutdown drains the queue before exiting.
    fn reclaim_loop(&self) {
        let mut pending = self.pending.lock();
        loop {
            self.reclaim_completed(&mut pending);
            if pending.shutdown && pending.queue.is_empty() {
                return;
            }
            self.wake.wait_for(&mut pending, RECLAIM_POLL_INTERVAL);
        }
    }

    /// Buffers complete in submission order, so only the head needs
    /// polling; a still-playing head ends the scan.
    fn reclaim_completed(&self, pending: &mut PendingBuffers) {
        while let Some(&id) = pending.queue.front() {
            match self.connection.unprepare(id) {
                Ok(Unprepared::Released) => {
                    pending.queue.pop_front();
                }
                Ok(Unprepared::StillPlaying) => break,
                Err(err) => {
                    // Dropping the id is the only alternative to polling a
                    // poisoned head forever.
                    warn!(error = %err, "failed to release completed buffer");
                    pending.queue.pop_front();
                }
            }
        }
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        self.shared.pending.lock().shutdown = true;
        self.shared.wake.notify_one();
        if let Some(reclaim_thread) = self.reclaim_thread.take() {
            if reclaim_thread.join().is_err() {
                warn!("reclamation thread panicked during shutdown");
            }
        }
        // The thread has drained every pending buffer; nothing pinned
        // remains, so the connection can be reset and closed.
        self.shared.connection.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{LoopbackDriver, MidiDriver};

    fn open_device(driver: &LoopbackDriver) -> OutputDevice {
        OutputDevice::open(driver.open_output(0).unwrap()).unwrap()
    }

    #[test]
    fn test_send_rejects_empty_buffer() {
        let driver = LoopbackDriver::new();
        let device = open_device(&driver);
        assert!(matches!(
            device.send(&[]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_short_message_is_packed_little_endian() {
        let driver = LoopbackDriver::new();
        let device = open_device(&driver);

        assert_eq!(device.send(&[0x90, 0x3C, 0x64]).unwrap(), 3);
        assert_eq!(device.send(&[0xF8]).unwrap(), 1);

        assert_eq!(driver.sent_short(0), vec![0x00643C90, 0x000000F8]);
    }

    #[test]
    fn test_short_path_never_prepares_a_buffer() {
        let driver = LoopbackDriver::new();
        let device = open_device(&driver);

        device.send(&[0xB0, 0x07, 0x40]).unwrap();
        device.send(&[0xC0, 0x05]).unwrap();

        assert_eq!(driver.outstanding_prepared(), 0);
        assert!(driver.sent_long(0).is_empty());
        assert!(device.shared.pending.lock().queue.is_empty());
    }

    #[test]
    fn test_sysex_takes_the_buffered_path() {
        let driver = LoopbackDriver::new();
        let device = open_device(&driver);

        let sysex = [0xF0, 0x41, 0x10, 0xF7];
        assert_eq!(device.send(&sysex).unwrap(), 4);

        // Short sysex too: dispatch is by status, not by size.
        let short_sysex = [0xF0, 0xF7];
        device.send(&short_sysex).unwrap();

        assert!(driver.sent_short(0).is_empty());
        assert_eq!(driver.sent_long(0), vec![sysex.to_vec(), short_sysex.to_vec()]);
    }

    #[test]
    fn test_oversized_non_sysex_is_buffered() {
        let driver = LoopbackDriver::new();
        let device = open_device(&driver);

        let data = [0xB0, 0x07, 0x40, 0xB0, 0x0A, 0x20];
        device.send(&data).unwrap();

        assert!(driver.sent_short(0).is_empty());
        assert_eq!(driver.sent_long(0), vec![data.to_vec()]);
    }

    #[test]
    fn test_short_send_failure_is_surfaced() {
        let driver = LoopbackDriver::new();
        let device = open_device(&driver);
        driver.fail_short_sends(true);

        assert!(matches!(
            device.send(&[0xF8]),
            Err(Error::Driver { op: "send_short", .. })
        ));
    }

    #[test]
    fn test_drop_reclaims_all_in_flight_buffers() {
        let driver = LoopbackDriver::new();
        driver.hold_completions(true);
        let device = open_device(&driver);

        for _ in 0..3 {
            device.send(&[0xF0, 0x41, 0x01, 0xF7]).unwrap();
        }
        assert_eq!(driver.transmitting(0), 3);

        driver.complete_all(0);
        drop(device);
        assert_eq!(driver.outstanding_prepared(), 0);
        assert_eq!(driver.sent_long(0).len(), 3);
    }

    #[test]
    fn test_completed_buffers_are_reclaimed_while_running() {
        let driver = LoopbackDriver::new();
        let device = open_device(&driver);

        device.send(&[0xF0, 0x01, 0xF7]).unwrap();

        // Completion is immediate (no hold); the reclamation thread frees
        // the header within a few poll intervals.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while driver.outstanding_prepared() != 0 {
            assert!(
                std::time::Instant::now() < deadline,
                "buffer was never reclaimed"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
