//! MIDI device enumeration and transport.
//!
//! A [`MidiSystem`] enumerates the devices a [`driver::MidiDriver`] exposes
//! and opens them by name. [`OutputDevice`] sends raw MIDI bytes, choosing
//! between a packed short send and an asynchronous buffered send per
//! message; [`InputDevice`] queues incoming messages with arrival
//! timestamps for blocking reads. Message framing lives in the
//! [`rondo_midi`] crate.
//!
//! The default driver is an in-process loopback, which makes the whole
//! stack testable without hardware:
//!
//! ```
//! use rondo_midi_io::MidiSystem;
//!
//! let system = MidiSystem::new()?;
//! let output = system.create_output_device("Loopback Output")?;
//! output.send(&[0x90, 0x3C, 0x64])?;
//! # Ok::<(), rondo_midi_io::Error>(())
//! ```

mod device;
pub mod driver;
mod error;
mod io;
mod system;

pub use device::{DeviceInfo, RawDeviceInfo, MAX_DEVICE_NAME_LENGTH};
pub use error::{Error, Result};
pub use io::{InputDevice, OutputDevice, TimestampedMessage};
pub use system::{MidiSystem, MidiSystemBuilder};

/// Milliseconds since an input device's first received message.
pub type MidiTimestamp = u64;
