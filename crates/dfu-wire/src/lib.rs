//! Wire codec for the DFU transport protocol.
//!
//! Pure, allocation-free `build_*`/`decode_*` function pairs for every
//! command variant, plus the header pack/unpack helpers and the
//! per-`(command, message type)` length table. See `dfu_messages.c` and
//! `dfu_proto_api.h` in the original implementation for the byte layouts
//! this mirrors.
#![cfg_attr(not(test), no_std)]

mod device_status;
mod error;
mod header;
mod length_table;
pub mod messages;

pub use device_status::{DeviceStatus, DeviceType};
pub use error::CodecError;
pub use header::{Header, HEADER_LEN};
pub use length_table::max_len;
pub use messages::*;

use num_derive::{FromPrimitive, ToPrimitive};

/// Maximum bytes a single frame may occupy on the wire, header included.
/// Matches `dfu_proto_config.h`'s `MAX_MSG_LEN`.
pub const MAX_MSG_LEN: usize = 1500;

static_assertions::const_assert!(MAX_MSG_LEN > HEADER_LEN);

/// MTU negotiated by default before a client proposes otherwise.
pub const DEFAULT_MTU: u16 = 8;

/// Lowest application image index (inclusive).
pub const IMAGE_INDEX_APP_LOW: u8 = 1;
/// Highest application image index (inclusive).
pub const IMAGE_INDEX_APP_HIGH: u8 = 96;
/// Lowest reserved image index (inclusive).
pub const IMAGE_INDEX_RESERVED_LOW: u8 = 97;
/// Highest reserved image index (inclusive).
pub const IMAGE_INDEX_RESERVED_HIGH: u8 = 127;

/// Image slot used for the session-establishment challenge artifact.
///
/// Picked as the top of the reserved range so it can never collide with a
/// vendor assigning reserved slots incrementally from 97 upward.
pub const CHALLENGE_IMAGE_INDEX: u8 = IMAGE_INDEX_RESERVED_HIGH;

/// A validated image index, `1..=127` (the Glossary's full legal range,
/// application slots `1..=96` plus reserved slots `97..=127`). `0` is
/// excluded: it is not an addressable slot on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImageIndex(u8);

impl ImageIndex {
    /// Build from a raw byte, rejecting `0` and anything above 127.
    pub fn new(index: u8) -> Option<Self> {
        if (IMAGE_INDEX_APP_LOW..=IMAGE_INDEX_RESERVED_HIGH).contains(&index) {
            Some(ImageIndex(index))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// True if this index falls in the application range `1..=96`.
    pub fn is_application(self) -> bool {
        (IMAGE_INDEX_APP_LOW..=IMAGE_INDEX_APP_HIGH).contains(&self.0)
    }

    /// True if this index falls in the reserved range `97..=127`.
    pub fn is_reserved(self) -> bool {
        (IMAGE_INDEX_RESERVED_LOW..=IMAGE_INDEX_RESERVED_HIGH).contains(&self.0)
    }
}

/// Command identifiers, bits 7..4 of the header byte.
///
/// `0` is illegal and `15` is reserved/terminator; both are excluded from
/// this enum so a successful `FromPrimitive::from_u8` already proves the
/// command id is in the valid `1..=14` range.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Command {
    NegotiateMtu = 1,
    BeginRcv = 2,
    AbortXfer = 3,
    RcvComplete = 4,
    RcvData = 5,
    Reboot = 6,
    DeviceStatus = 7,
    KeepAlive = 8,
    BeginSession = 9,
    EndSession = 10,
    ImageStatus = 11,
    BeginSend = 12,
    SendData = 13,
    InstallImage = 14,
}

/// One past the highest legal command id, i.e. the reserved terminator.
pub const LAST_COMMAND: u8 = 15;

impl Command {
    /// Parse a 4-bit command field, rejecting `0` and `LAST_COMMAND` (15).
    pub fn from_id(id: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(id)
    }

    pub fn id(self) -> u8 {
        num_traits::ToPrimitive::to_u8(&self).unwrap()
    }
}

/// Message type, bits 2..0 of the header byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum MsgType {
    Command = 0,
    Response = 1,
    Ack = 2,
    Nak = 3,
    Unsolicited = 4,
}

impl MsgType {
    pub fn from_bits(bits: u8) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(bits)
    }

    pub fn bits(self) -> u8 {
        num_traits::ToPrimitive::to_u8(&self).unwrap()
    }
}

/// Encode a 24-bit little-endian field into the low 3 bytes of `out`.
///
/// The high byte of `value` is silently dropped, matching the original's
/// `numTarget &= 0x00FFFFFF` masking on encode.
pub(crate) fn write_u24_le(out: &mut [u8], value: u32) {
    let bytes = value.to_le_bytes();
    out[0] = bytes[0];
    out[1] = bytes[1];
    out[2] = bytes[2];
}

/// Decode a 24-bit little-endian field stored in the low 3 bytes of `input`.
pub(crate) fn read_u24_le(input: &[u8]) -> u32 {
    u32::from_le_bytes([input[0], input[1], input[2], 0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_id_zero_and_fifteen_are_invalid() {
        assert!(Command::from_id(0).is_none());
        assert!(Command::from_id(15).is_none());
        assert!(Command::from_id(16).is_none());
    }

    #[test]
    fn command_round_trips_through_id() {
        for id in 1..=14u8 {
            let cmd = Command::from_id(id).expect("valid command id");
            assert_eq!(cmd.id(), id);
        }
    }

    #[test]
    fn u24_round_trip_at_max_value() {
        let mut buf = [0u8; 3];
        write_u24_le(&mut buf, 0x00FF_FFFF);
        assert_eq!(read_u24_le(&buf), 0x00FF_FFFF);
    }

    #[test]
    fn u24_write_drops_high_byte() {
        let mut buf = [0u8; 3];
        write_u24_le(&mut buf, 0xDEAD_BEEF);
        // high byte (0xDE) must not leak into the 3-byte field
        assert_eq!(read_u24_le(&buf), 0x00AD_BEEF);
    }

    #[test]
    fn image_index_rejects_zero_and_above_127() {
        assert!(ImageIndex::new(0).is_none());
        assert!(ImageIndex::new(128).is_none());
        assert!(ImageIndex::new(255).is_none());
    }

    #[test]
    fn image_index_classifies_application_and_reserved_ranges() {
        let app = ImageIndex::new(1).unwrap();
        assert!(app.is_application());
        assert!(!app.is_reserved());

        let reserved = ImageIndex::new(CHALLENGE_IMAGE_INDEX).unwrap();
        assert!(reserved.is_reserved());
        assert!(!reserved.is_application());
        assert_eq!(reserved.get(), 127);
    }
}
