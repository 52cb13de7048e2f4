//! MIDI message codec for the rondo workspace.
//!
//! Pure, stateless classification and framing of raw MIDI bytes:
//!
//! - **Status classification**: channel voice, system common, and system
//!   real-time predicates over a single status byte ([`status`]).
//! - **Length computation**: fixed table for non-sysex messages, terminator
//!   scan for sysex ([`status::message_length`]).
//! - **Typed messages**: a closed [`MidiMessage`] variant set with exact
//!   wire-byte round-tripping.
//!
//! Transport lives in `rondo-midi-io`; this crate never touches a device.
//!
//! # Example
//!
//! ```
//! use rondo_midi::{ControlChangeMessage, MidiMessage};
//!
//! let cc = ControlChangeMessage::new(5, 2, 127);
//! assert_eq!(cc.as_bytes(), &[0xB5, 0x02, 0x7F]);
//!
//! match MidiMessage::parse(cc.as_bytes()) {
//!     MidiMessage::ControlChange(parsed) => assert_eq!(parsed.value(), 127),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

pub mod status;

mod message;
pub use message::{ControlChangeMessage, MidiMessage, SystemExclusiveMessage};

pub use status::{message_length, SYSTEM_EXCLUSIVE_STATUS, SYSTEM_EXCLUSIVE_TERMINATOR};
