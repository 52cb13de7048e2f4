//! Device transports built on top of a [`MidiDriver`](crate::driver::MidiDriver).

mod input;
mod output;

pub use input::{InputDevice, TimestampedMessage};
pub use output::OutputDevice;

pub(crate) use input::PoolConfig;
