use crate::{Command, MsgType};

/// Length of the frame header in bytes.
pub const HEADER_LEN: usize = 1;

const COMMAND_MASK: u8 = 0xF0;
const TOGGLE_MASK: u8 = 0x08;
const MSG_TYPE_MASK: u8 = 0x07;

/// Parsed view of the 1-byte frame header (bits MSB..LSB: command(4) |
/// toggle(1) | msg_type(3)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command_id: u8,
    pub toggle: bool,
    /// Raw 3-bit message-type field. `MsgType::from_bits` may return `None`
    /// for the unused values 5..7; dispatch treats those as "no table
    /// entry" rather than rejecting the frame outright (see
    /// `SPEC_FULL.md`'s Design Note resolutions).
    pub msg_type_bits: u8,
}

impl Header {
    /// Pack a header byte. `command_id` is the raw 4-bit command id (the
    /// caller is responsible for having validated it against
    /// `Command::from_id`; this function never fails so that a handler can
    /// always build an ACK/NAK response).
    pub fn pack(command_id: u8, toggle: bool, msg_type: MsgType) -> u8 {
        let mut byte = (command_id << 4) & COMMAND_MASK;
        if toggle {
            byte |= TOGGLE_MASK;
        }
        byte |= msg_type.bits() & MSG_TYPE_MASK;
        byte
    }

    /// Unpack a header byte. Never fails: an invalid command id or an
    /// unused message-type bit pattern is returned verbatim for the caller
    /// to reject.
    pub fn unpack(byte: u8) -> Header {
        Header {
            command_id: (byte & COMMAND_MASK) >> 4,
            toggle: byte & TOGGLE_MASK != 0,
            msg_type_bits: byte & MSG_TYPE_MASK,
        }
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_id(self.command_id)
    }

    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_bits(self.msg_type_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip_negotiate_mtu_response_toggled() {
        // cmd=NEGOTIATE_MTU(1), toggle=1, type=RESPONSE(1)
        // byte = (1<<4) | (1<<3) | 1 = 0x19
        let byte = Header::pack(1, true, MsgType::Response);
        assert_eq!(byte, 0x19);

        let hdr = Header::unpack(byte);
        assert_eq!(hdr.command_id, 1);
        assert!(hdr.toggle);
        assert_eq!(hdr.msg_type_bits, 1);
        assert_eq!(hdr.command(), Some(Command::NegotiateMtu));
        assert_eq!(hdr.msg_type(), Some(MsgType::Response));
    }

    #[test]
    fn header_accepts_reserved_msg_type_bits() {
        // msg type bits 5..7 are unused but not rejected by unpack itself;
        // only `msg_type()` returns None for them, preserving the
        // documented leniency at the header layer (SPEC_FULL Open
        // Question #1).
        let hdr = Header::unpack(0x07);
        assert_eq!(hdr.msg_type_bits, 7);
        assert_eq!(hdr.msg_type(), None);
    }

    #[test]
    fn header_rejects_invalid_command_via_command_accessor() {
        let hdr = Header::unpack(0x00); // command id 0
        assert_eq!(hdr.command(), None);
        let hdr = Header::unpack(0xF0); // command id 15
        assert_eq!(hdr.command(), None);
    }
}
