//! Status-byte classification and message framing.
//!
//! Everything here is a pure function of the byte(s) given. Only the
//! designated status position is ever consulted, so data bytes that happen
//! to share bit patterns with status bytes cannot confuse classification.

/// Start of a system exclusive message.
pub const SYSTEM_EXCLUSIVE_STATUS: u8 = 0xF0;
/// End of a system exclusive message.
pub const SYSTEM_EXCLUSIVE_TERMINATOR: u8 = 0xF7;

pub const MIDI_TIME_CODE_QUARTER_STATUS: u8 = 0xF1;
pub const SONG_POSITION_POINTER_STATUS: u8 = 0xF2;
pub const SONG_SELECT_STATUS: u8 = 0xF3;
pub const TUNE_REQUEST_STATUS: u8 = 0xF6;

pub const TIMING_CLOCK_STATUS: u8 = 0xF8;
pub const START_STATUS: u8 = 0xFA;
pub const CONTINUE_STATUS: u8 = 0xFB;
pub const STOP_STATUS: u8 = 0xFC;
pub const ACTIVE_SENSING_STATUS: u8 = 0xFE;
pub const RESET_STATUS: u8 = 0xFF;

pub(crate) const NOTE_OFF_PREFIX: u8 = 0x8;
pub(crate) const NOTE_ON_PREFIX: u8 = 0x9;
pub(crate) const POLYPHONIC_KEY_PRESSURE_PREFIX: u8 = 0xA;
pub(crate) const CONTROL_CHANGE_PREFIX: u8 = 0xB;
pub(crate) const PROGRAM_CHANGE_PREFIX: u8 = 0xC;
pub(crate) const CHANNEL_PRESSURE_PREFIX: u8 = 0xD;
pub(crate) const PITCH_BEND_PREFIX: u8 = 0xE;

#[inline]
fn prefix(status: u8) -> u8 {
    status >> 4
}

/// Channel number (0-15) encoded in a channel voice status byte.
#[inline]
pub fn channel_of(status: u8) -> u8 {
    status & 0x0F
}

// ---------------------------------------------------------------------------
// System common
// ---------------------------------------------------------------------------

#[inline]
pub fn is_system_exclusive(status: u8) -> bool {
    status == SYSTEM_EXCLUSIVE_STATUS
}

#[inline]
pub fn is_midi_time_code_quarter(status: u8) -> bool {
    status == MIDI_TIME_CODE_QUARTER_STATUS
}

#[inline]
pub fn is_song_position_pointer(status: u8) -> bool {
    status == SONG_POSITION_POINTER_STATUS
}

#[inline]
pub fn is_song_select(status: u8) -> bool {
    status == SONG_SELECT_STATUS
}

#[inline]
pub fn is_tune_request(status: u8) -> bool {
    status == TUNE_REQUEST_STATUS
}

#[inline]
pub fn is_system_common(status: u8) -> bool {
    is_system_exclusive(status)
        || is_midi_time_code_quarter(status)
        || is_song_position_pointer(status)
        || is_song_select(status)
        || is_tune_request(status)
}

// ---------------------------------------------------------------------------
// System real time
// ---------------------------------------------------------------------------

#[inline]
pub fn is_timing_clock(status: u8) -> bool {
    status == TIMING_CLOCK_STATUS
}

#[inline]
pub fn is_start(status: u8) -> bool {
    status == START_STATUS
}

#[inline]
pub fn is_continue(status: u8) -> bool {
    status == CONTINUE_STATUS
}

#[inline]
pub fn is_stop(status: u8) -> bool {
    status == STOP_STATUS
}

#[inline]
pub fn is_active_sensing(status: u8) -> bool {
    status == ACTIVE_SENSING_STATUS
}

#[inline]
pub fn is_reset(status: u8) -> bool {
    status == RESET_STATUS
}

#[inline]
pub fn is_system_real_time(status: u8) -> bool {
    is_timing_clock(status)
        || is_start(status)
        || is_continue(status)
        || is_stop(status)
        || is_active_sensing(status)
        || is_reset(status)
}

// ---------------------------------------------------------------------------
// Channel voice
// ---------------------------------------------------------------------------

#[inline]
pub fn is_note_off(status: u8) -> bool {
    prefix(status) == NOTE_OFF_PREFIX
}

#[inline]
pub fn is_note_on(status: u8) -> bool {
    prefix(status) == NOTE_ON_PREFIX
}

#[inline]
pub fn is_polyphonic_key_pressure(status: u8) -> bool {
    prefix(status) == POLYPHONIC_KEY_PRESSURE_PREFIX
}

#[inline]
pub fn is_control_change(status: u8) -> bool {
    prefix(status) == CONTROL_CHANGE_PREFIX
}

#[inline]
pub fn is_program_change(status: u8) -> bool {
    prefix(status) == PROGRAM_CHANGE_PREFIX
}

#[inline]
pub fn is_channel_pressure(status: u8) -> bool {
    prefix(status) == CHANNEL_PRESSURE_PREFIX
}

#[inline]
pub fn is_pitch_bend(status: u8) -> bool {
    prefix(status) == PITCH_BEND_PREFIX
}

#[inline]
pub fn is_channel_voice(status: u8) -> bool {
    is_note_off(status)
        || is_note_on(status)
        || is_polyphonic_key_pressure(status)
        || is_control_change(status)
        || is_program_change(status)
        || is_channel_pressure(status)
        || is_pitch_bend(status)
}

// ---------------------------------------------------------------------------
// Buffer helpers
// ---------------------------------------------------------------------------

/// Status byte of a framed message, if any bytes are present.
#[inline]
pub fn status_of(data: &[u8]) -> Option<u8> {
    data.first().copied()
}

/// Controller number of a control change message, `None` for anything else
/// or for a truncated buffer.
pub fn controller_of(data: &[u8]) -> Option<u8> {
    match data {
        [status, controller, _] if is_control_change(*status) => Some(controller & 0x7F),
        _ => None,
    }
}

/// Channel mode messages are control changes with controllers 120-127.
pub fn is_channel_mode(data: &[u8]) -> bool {
    matches!(controller_of(data), Some(controller) if controller >= 120)
}

/// Length of a non-sysex message as a fixed function of its status byte.
/// Returns 0 for bytes that are not a recognized status.
pub fn fixed_length(status: u8) -> usize {
    if is_note_off(status)
        || is_note_on(status)
        || is_polyphonic_key_pressure(status)
        || is_control_change(status)
        || is_pitch_bend(status)
        || is_song_position_pointer(status)
    {
        3
    } else if is_program_change(status)
        || is_channel_pressure(status)
        || is_midi_time_code_quarter(status)
        || is_song_select(status)
    {
        2
    } else if is_tune_request(status) || is_system_real_time(status) {
        1
    } else {
        0
    }
}

/// Length of a sysex message, terminator included, by scanning forward from
/// the status byte. Returns 0 when the buffer does not start a sysex
/// message or the terminator is not present (message incomplete).
pub fn sysex_length(data: &[u8]) -> usize {
    if !matches!(status_of(data), Some(status) if is_system_exclusive(status)) {
        return 0;
    }

    match data.iter().position(|&byte| byte == SYSTEM_EXCLUSIVE_TERMINATOR) {
        Some(end) => end + 1,
        None => 0,
    }
}

/// Total length of the message starting at `data[0]`, or 0 when it cannot
/// be determined (empty buffer, unknown status, unterminated sysex).
pub fn message_length(data: &[u8]) -> usize {
    match status_of(data) {
        Some(status) if is_system_exclusive(status) => sysex_length(data),
        Some(status) => fixed_length(status),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_mutually_exclusive() {
        for byte in 0..=u8::MAX {
            let categories = [
                is_channel_voice(byte),
                is_system_common(byte),
                is_system_real_time(byte),
            ];
            let claimed = categories.iter().filter(|&&hit| hit).count();
            if byte < 0x80 || matches!(byte, 0xF4 | 0xF5 | 0xF7 | 0xF9 | 0xFD) {
                // Data bytes, the sysex terminator, and the unassigned
                // system bytes (F4, F5, F9, FD) belong to no category.
                assert_eq!(claimed, 0, "byte {byte:#04X} should be unclassified");
            } else {
                assert_eq!(claimed, 1, "status {byte:#04X} claimed by {claimed} categories");
            }
        }
    }

    #[test]
    fn test_length_matches_category() {
        for byte in 0..=u8::MAX {
            let len = fixed_length(byte);
            if is_system_real_time(byte) || is_tune_request(byte) {
                assert_eq!(len, 1, "status {byte:#04X}");
            } else if is_program_change(byte)
                || is_channel_pressure(byte)
                || is_midi_time_code_quarter(byte)
                || is_song_select(byte)
            {
                assert_eq!(len, 2, "status {byte:#04X}");
            } else if is_system_exclusive(byte) {
                // Variable length; not covered by the fixed table.
                assert_eq!(len, 0);
            } else if is_channel_voice(byte) || is_song_position_pointer(byte) {
                assert_eq!(len, 3, "status {byte:#04X}");
            } else {
                assert_eq!(len, 0, "status {byte:#04X}");
            }
        }
    }

    #[test]
    fn test_data_bytes_are_never_status() {
        // 0x00-0x7F are data bytes regardless of bit patterns below the MSB.
        for byte in 0..=0x7F {
            assert!(!is_channel_voice(byte));
            assert!(!is_system_common(byte));
            assert!(!is_system_real_time(byte));
            assert_eq!(fixed_length(byte), 0);
        }
    }

    #[test]
    fn test_channel_extraction() {
        assert_eq!(channel_of(0xB5), 5);
        assert_eq!(channel_of(0x90), 0);
        assert_eq!(channel_of(0x8F), 15);
    }

    #[test]
    fn test_sysex_length_includes_terminator() {
        assert_eq!(sysex_length(&[0xF0, 0x41, 0x01, 0xF7]), 4);
        assert_eq!(sysex_length(&[0xF0, 0xF7]), 2);
    }

    #[test]
    fn test_sysex_length_unterminated_is_zero() {
        assert_eq!(sysex_length(&[0xF0, 0x41, 0x01]), 0);
        assert_eq!(sysex_length(&[0xF0]), 0);
    }

    #[test]
    fn test_sysex_length_rejects_non_sysex() {
        assert_eq!(sysex_length(&[0x90, 0x3C, 0xF7]), 0);
        assert_eq!(sysex_length(&[]), 0);
    }

    #[test]
    fn test_message_length_dispatch() {
        assert_eq!(message_length(&[0x90, 0x3C, 0x64]), 3);
        assert_eq!(message_length(&[0xC0, 0x05]), 2);
        assert_eq!(message_length(&[0xF8]), 1);
        assert_eq!(message_length(&[0xF0, 0x41, 0xF7]), 3);
        assert_eq!(message_length(&[0x42]), 0);
        assert_eq!(message_length(&[]), 0);
    }

    #[test]
    fn test_controller_extraction() {
        assert_eq!(controller_of(&[0xB0, 0x07, 0x7F]), Some(7));
        assert_eq!(controller_of(&[0x90, 0x07, 0x7F]), None);
        assert_eq!(controller_of(&[0xB0, 0x07]), None);
    }

    #[test]
    fn test_channel_mode_detection() {
        assert!(is_channel_mode(&[0xB0, 120, 0x00])); // all sound off
        assert!(is_channel_mode(&[0xB3, 127, 0x00])); // poly mode on
        assert!(!is_channel_mode(&[0xB0, 7, 0x40])); // plain volume CC
        assert!(!is_channel_mode(&[0x90, 120, 0x40]));
    }
}
