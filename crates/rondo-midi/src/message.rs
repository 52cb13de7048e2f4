//! Typed MIDI messages and the closed variant set over raw byte buffers.
//!
//! Parsing never fails: bytes that do not resolve to a complete, supported
//! message yield [`MidiMessage::Empty`], which is a normal result (the
//! caller may simply not have the whole message yet). Typed constructors,
//! by contrast, are only reachable after classification and length checks,
//! so their invariants are enforced with debug assertions — violating them
//! is a programming error, not an external condition.

use serde::{Deserialize, Serialize};

use crate::status;

/// A system exclusive message, framed by `0xF0 .. 0xF7`, owning its exact
/// wire bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemExclusiveMessage {
    data: Vec<u8>,
}

impl SystemExclusiveMessage {
    /// Builds a framed message from a single-byte manufacturer id and an
    /// inner payload.
    pub fn new(manufacturer_id: u8, payload: &[u8]) -> Self {
        let mut data = Vec::with_capacity(payload.len() + 3);
        data.push(status::SYSTEM_EXCLUSIVE_STATUS);
        data.push(manufacturer_id);
        data.extend_from_slice(payload);
        data.push(status::SYSTEM_EXCLUSIVE_TERMINATOR);
        Self { data }
    }

    /// Builds a framed message from an extended three-byte manufacturer id.
    pub fn with_extended_id(manufacturer_id: [u8; 3], payload: &[u8]) -> Self {
        let mut data = Vec::with_capacity(payload.len() + 5);
        data.push(status::SYSTEM_EXCLUSIVE_STATUS);
        data.extend_from_slice(&manufacturer_id);
        data.extend_from_slice(payload);
        data.push(status::SYSTEM_EXCLUSIVE_TERMINATOR);
        Self { data }
    }

    /// Adopts already-framed wire bytes.
    ///
    /// The bytes must be a complete sysex message: status byte first,
    /// terminator last.
    pub fn from_bytes(data: &[u8]) -> Self {
        debug_assert!(data.len() >= 2);
        debug_assert!(status::is_system_exclusive(data[0]));
        debug_assert_eq!(status::sysex_length(data), data.len());
        Self {
            data: data.to_vec(),
        }
    }

    /// The inner payload: the bytes between status and terminator, with the
    /// single manufacturer-id byte stripped. Empty for the minimal
    /// `[0xF0, 0xF7]` frame, which has no manufacturer id at all.
    pub fn payload(&self) -> &[u8] {
        self.data.get(2..self.data.len() - 1).unwrap_or(&[])
    }

    /// Exact on-wire representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for SystemExclusiveMessage {
    fn default() -> Self {
        Self::new(0, &[])
    }
}

/// A control change message: exactly three bytes with a `0xBn` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChangeMessage {
    data: [u8; 3],
}

impl ControlChangeMessage {
    pub fn new(channel: u8, controller: u8, value: u8) -> Self {
        debug_assert!(channel <= 0x0F);
        debug_assert!(controller <= 127);
        debug_assert!(value <= 127);
        Self {
            data: [
                (status::CONTROL_CHANGE_PREFIX << 4) | (channel & 0x0F),
                controller,
                value,
            ],
        }
    }

    /// Adopts wire bytes that have already been classified as a complete
    /// control change message.
    pub fn from_bytes(data: &[u8]) -> Self {
        debug_assert!(data.len() >= 3);
        debug_assert!(status::is_control_change(data[0]));
        Self {
            data: [data[0], data[1], data[2]],
        }
    }

    pub fn channel(&self) -> u8 {
        status::channel_of(self.data[0])
    }

    pub fn controller(&self) -> u8 {
        self.data[1]
    }

    pub fn value(&self) -> u8 {
        self.data[2]
    }

    /// Exact on-wire representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for ControlChangeMessage {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Closed set of decoded message kinds.
///
/// Extend by adding a variant; raw bytes are never probed outside this
/// module and [`crate::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MidiMessage {
    /// No complete, supported message (parse-incomplete or unsupported
    /// status). A normal result, not an error.
    #[default]
    Empty,
    SystemExclusive(SystemExclusiveMessage),
    ControlChange(ControlChangeMessage),
}

impl MidiMessage {
    /// Decodes the message starting at `data[0]`.
    ///
    /// Yields [`MidiMessage::Empty`] when the buffer is shorter than the
    /// framed length, when a sysex message is unterminated, or when the
    /// status byte matches no supported kind.
    pub fn parse(data: &[u8]) -> Self {
        let length = status::message_length(data);
        if length == 0 || data.len() < length {
            return Self::Empty;
        }

        let message = &data[..length];
        match message[0] {
            byte if status::is_system_exclusive(byte) => {
                Self::SystemExclusive(SystemExclusiveMessage::from_bytes(message))
            }
            byte if status::is_control_change(byte) => {
                Self::ControlChange(ControlChangeMessage::from_bytes(message))
            }
            _ => Self::Empty,
        }
    }

    /// Exact on-wire representation; empty slice for [`MidiMessage::Empty`].
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::SystemExclusive(message) => message.as_bytes(),
            Self::ControlChange(message) => message.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
