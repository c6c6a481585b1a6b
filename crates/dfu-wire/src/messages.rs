//! Per-command `build_*`/`decode_*` pairs.
//!
//! Builders never allocate: every one writes into a caller-supplied
//! `&mut [u8]` and returns the number of bytes written. Decoders only ever
//! read the bytes the caller says are valid (`msg[..len]`).

use crate::{header::Header, read_u24_le, write_u24_le, CodecError, Command, MsgType};

fn write_header(out: &mut [u8], command: Command, msg_type: MsgType, toggle: bool) -> Result<(), CodecError> {
    if out.is_empty() {
        return Err(CodecError::BufferTooSmall);
    }
    out[0] = Header::pack(command.id(), toggle, msg_type);
    Ok(())
}

/// `NEGOTIATE_MTU`: 1-byte header + 2-byte little-endian MTU.
pub fn build_negotiate_mtu(
    out: &mut [u8],
    toggle: bool,
    msg_type: MsgType,
    mtu: u16,
) -> Result<usize, CodecError> {
    if out.len() < 3 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::NegotiateMtu, msg_type, toggle)?;
    out[1..3].copy_from_slice(&mtu.to_le_bytes());
    Ok(3)
}

pub fn decode_negotiate_mtu(msg: &[u8]) -> Result<u16, CodecError> {
    if msg.len() < 3 {
        return Err(CodecError::TooShort);
    }
    Ok(u16::from_le_bytes([msg[1], msg[2]]))
}

/// `BEGIN_RCV`: header + `(index<<1)|encrypted` + 3-byte size + 3-byte addr.
pub fn build_begin_rcv(
    out: &mut [u8],
    toggle: bool,
    msg_type: MsgType,
    image_index: u8,
    encrypted: bool,
    image_size: u32,
    image_addr: u32,
) -> Result<usize, CodecError> {
    if out.len() < 8 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::BeginRcv, msg_type, toggle)?;
    out[1] = ((image_index << 1) & 0xFE) | (encrypted as u8);
    write_u24_le(&mut out[2..5], image_size);
    write_u24_le(&mut out[5..8], image_addr);
    Ok(8)
}

pub struct BeginRcv {
    pub image_index: u8,
    pub encrypted: bool,
    pub image_size: u32,
    pub image_addr: u32,
}

pub fn decode_begin_rcv(msg: &[u8]) -> Result<BeginRcv, CodecError> {
    if msg.len() < 8 {
        return Err(CodecError::TooShort);
    }
    Ok(BeginRcv {
        encrypted: msg[1] & 0x01 != 0,
        image_index: msg[1] >> 1,
        image_size: read_u24_le(&msg[2..5]),
        image_addr: read_u24_le(&msg[5..8]),
    })
}

/// `ABORT_XFER`: header only.
pub fn build_abort_xfer(out: &mut [u8], toggle: bool, msg_type: MsgType) -> Result<usize, CodecError> {
    write_header(out, Command::AbortXfer, msg_type, toggle)?;
    Ok(1)
}

/// `RCV_COMPLETE`: header + 3-byte little-endian total.
pub fn build_rcv_complete(
    out: &mut [u8],
    toggle: bool,
    msg_type: MsgType,
    total_transferred: u32,
) -> Result<usize, CodecError> {
    if out.len() < 4 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::RcvComplete, msg_type, toggle)?;
    write_u24_le(&mut out[1..4], total_transferred);
    Ok(4)
}

pub fn decode_rcv_complete(msg: &[u8]) -> Result<u32, CodecError> {
    if msg.len() < 4 {
        return Err(CodecError::TooShort);
    }
    Ok(read_u24_le(&msg[1..4]))
}

/// `RCV_DATA`: header + raw payload, `dataLen <= mtu - 1`.
pub fn build_rcv_data(
    out: &mut [u8],
    toggle: bool,
    msg_type: MsgType,
    data: &[u8],
    mtu: u16,
) -> Result<usize, CodecError> {
    if data.len() > mtu.saturating_sub(1) as usize {
        return Err(CodecError::OutOfRange);
    }
    if out.len() < 1 + data.len() {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::RcvData, msg_type, toggle)?;
    out[1..1 + data.len()].copy_from_slice(data);
    Ok(1 + data.len())
}

/// Returns the payload slice (everything after the header byte).
pub fn decode_rcv_data(msg: &[u8]) -> Result<&[u8], CodecError> {
    if msg.is_empty() {
        return Err(CodecError::TooShort);
    }
    Ok(&msg[1..])
}

/// `REBOOT`: header + 2-byte little-endian delay in ms.
pub fn build_reboot(
    out: &mut [u8],
    toggle: bool,
    msg_type: MsgType,
    delay_ms: u16,
) -> Result<usize, CodecError> {
    if out.len() < 3 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::Reboot, msg_type, toggle)?;
    out[1..3].copy_from_slice(&delay_ms.to_le_bytes());
    Ok(3)
}

pub fn decode_reboot(msg: &[u8]) -> Result<u16, CodecError> {
    if msg.len() < 3 {
        return Err(CodecError::TooShort);
    }
    Ok(u16::from_le_bytes([msg[1], msg[2]]))
}

/// `DEVICE_STATUS`: header + the 8-byte `DeviceStatus` payload
/// (`RESPONSE`/`UNSOLICITED` variants only; `COMMAND` carries no payload).
pub fn build_device_status(
    out: &mut [u8],
    toggle: bool,
    msg_type: MsgType,
    status: &crate::DeviceStatus,
) -> Result<usize, CodecError> {
    if out.len() < 9 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::DeviceStatus, msg_type, toggle)?;
    status.encode(&mut out[1..9])?;
    Ok(9)
}

pub fn decode_device_status(msg: &[u8]) -> Result<crate::DeviceStatus, CodecError> {
    if msg.len() < 2 {
        return Err(CodecError::TooShort);
    }
    crate::DeviceStatus::decode(&msg[1..])
}

/// `KEEP_ALIVE`: header only, `UNSOLICITED` message type.
pub fn build_keep_alive(out: &mut [u8], toggle: bool) -> Result<usize, CodecError> {
    write_header(out, Command::KeepAlive, MsgType::Unsolicited, toggle)?;
    Ok(1)
}

/// `BEGIN_SESSION`: `COMMAND`/`ACK`/`NAK` carry only the header; `RESPONSE`
/// carries a 4-byte little-endian challenge.
pub fn build_begin_session(out: &mut [u8], toggle: bool, msg_type: MsgType) -> Result<usize, CodecError> {
    write_header(out, Command::BeginSession, msg_type, toggle)?;
    Ok(1)
}

pub fn build_begin_session_response(
    out: &mut [u8],
    toggle: bool,
    challenge: u32,
) -> Result<usize, CodecError> {
    if out.len() < 5 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::BeginSession, MsgType::Response, toggle)?;
    out[1..5].copy_from_slice(&challenge.to_le_bytes());
    Ok(5)
}

pub fn decode_begin_session_response(msg: &[u8]) -> Result<u32, CodecError> {
    if msg.len() < 5 {
        return Err(CodecError::TooShort);
    }
    Ok(u32::from_le_bytes([msg[1], msg[2], msg[3], msg[4]]))
}

/// `END_SESSION`: header only.
pub fn build_end_session(out: &mut [u8], toggle: bool, msg_type: MsgType) -> Result<usize, CodecError> {
    write_header(out, Command::EndSession, msg_type, toggle)?;
    Ok(1)
}

/// `IMAGE_STATUS`: `COMMAND` carries a 4-byte image index + query byte
/// (see `decode_image_status_query`); `RESPONSE` carries a 3-byte status
/// payload.
pub fn build_image_status_query(
    out: &mut [u8],
    toggle: bool,
    image_index: u8,
) -> Result<usize, CodecError> {
    if out.len() < 5 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::ImageStatus, MsgType::Command, toggle)?;
    out[1] = image_index;
    out[2..5].fill(0);
    Ok(5)
}

pub fn decode_image_status_query(msg: &[u8]) -> Result<u8, CodecError> {
    if msg.len() < 2 {
        return Err(CodecError::TooShort);
    }
    Ok(msg[1])
}

pub fn build_image_status_response(
    out: &mut [u8],
    toggle: bool,
    image_index: u8,
    valid: bool,
    version: [u8; 2],
) -> Result<usize, CodecError> {
    if out.len() < 4 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::ImageStatus, MsgType::Response, toggle)?;
    out[1] = image_index;
    out[2] = valid as u8;
    out[3] = version[0];
    let _ = version[1]; // reserved for a future minor-version byte
    Ok(4)
}

pub struct ImageStatusResponse {
    pub image_index: u8,
    pub valid: bool,
}

pub fn decode_image_status_response(msg: &[u8]) -> Result<ImageStatusResponse, CodecError> {
    if msg.len() < 4 {
        return Err(CodecError::TooShort);
    }
    Ok(ImageStatusResponse {
        image_index: msg[1],
        valid: msg[2] != 0,
    })
}

/// `BEGIN_SEND`: `COMMAND` carries a 1-byte image index; `RESPONSE` carries
/// the same `BEGIN_RCV`-shaped 7-byte payload (size + addr) describing what
/// the peer is prepared to accept.
pub fn build_begin_send(out: &mut [u8], toggle: bool, image_index: u8) -> Result<usize, CodecError> {
    if out.len() < 2 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::BeginSend, MsgType::Command, toggle)?;
    out[1] = image_index;
    Ok(2)
}

pub fn decode_begin_send(msg: &[u8]) -> Result<u8, CodecError> {
    if msg.len() < 2 {
        return Err(CodecError::TooShort);
    }
    Ok(msg[1])
}

pub fn build_begin_send_response(
    out: &mut [u8],
    toggle: bool,
    image_size: u32,
    image_addr: u32,
) -> Result<usize, CodecError> {
    if out.len() < 8 {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::BeginSend, MsgType::Response, toggle)?;
    write_u24_le(&mut out[1..4], image_size);
    write_u24_le(&mut out[4..7], image_addr);
    out[7] = 0;
    Ok(8)
}

/// `SEND_DATA`: `COMMAND` carries a 1-byte sequence/index field; `RESPONSE`
/// carries the payload chunk, bounded by MTU like `RCV_DATA`.
pub fn build_send_data_response(
    out: &mut [u8],
    toggle: bool,
    data: &[u8],
    mtu: u16,
) -> Result<usize, CodecError> {
    if data.len() > mtu.saturating_sub(1) as usize {
        return Err(CodecError::OutOfRange);
    }
    if out.len() < 1 + data.len() {
        return Err(CodecError::BufferTooSmall);
    }
    write_header(out, Command::SendData, MsgType::Response, toggle)?;
    out[1..1 + data.len()].copy_from_slice(data);
    Ok(1 + data.len())
}

pub fn decode_send_data_response(msg: &[u8]) -> Result<&[u8], CodecError> {
    if msg.is_empty() {
        return Err(CodecError::TooShort);
    }
    Ok(&msg[1..])
}

/// `INSTALL_IMAGE`: header + 1-byte image index (also present on the
/// `RESPONSE`/`ACK`/`NAK` side as an echo, per the 1-byte table entries).
pub fn build_install_image(
    out: &mut [u8],
    toggle: bool,
    msg_type: MsgType,
) -> Result<usize, CodecError> {
    write_header(out, Command::InstallImage, msg_type, toggle)?;
    Ok(1)
}

/// Build a bare `ACK`/`NAK` header-only frame for `command`. Every command
/// permits a 1-byte `ACK`/`NAK` entry in the length table, so this single
/// helper covers acknowledgement for the whole command set.
pub fn build_ack_or_nak(
    out: &mut [u8],
    toggle: bool,
    command: Command,
    msg_type: MsgType,
) -> usize {
    debug_assert!(matches!(msg_type, MsgType::Ack | MsgType::Nak));
    // write_header never fails against a non-empty buffer; callers pass a
    // scratch buffer sized at least MAX_MSG_LEN.
    let _ = write_header(out, command, msg_type, toggle);
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MsgType;

    #[test]
    fn negotiate_mtu_builds_and_decodes_387() {
        // 387 = 0x0183 little-endian => [0x83, 0x01]
        let mut buf = [0u8; 3];
        let len = build_negotiate_mtu(&mut buf, false, MsgType::Command, 387).unwrap();
        assert_eq!(len, 3);
        assert_eq!(buf[1], 0x83);
        assert_eq!(buf[2], 0x01);
        assert_eq!(decode_negotiate_mtu(&buf).unwrap(), 387);
    }

    #[test]
    fn begin_rcv_packs_index_encrypted_size_addr() {
        let mut buf = [0u8; 8];
        build_begin_rcv(&mut buf, false, MsgType::Command, 5, true, 0x004000, 0x600000).unwrap();
        assert_eq!(buf[1], 0x0B); // (5<<1)|1
        assert_eq!(&buf[2..5], &[0x00, 0x40, 0x00]);
        assert_eq!(&buf[5..8], &[0x00, 0x00, 0x60]);

        let decoded = decode_begin_rcv(&buf).unwrap();
        assert_eq!(decoded.image_index, 5);
        assert!(decoded.encrypted);
        assert_eq!(decoded.image_size, 0x4000);
        assert_eq!(decoded.image_addr, 0x600000);
    }

    #[test]
    fn begin_rcv_max_24_bit_size_round_trips() {
        let mut buf = [0u8; 8];
        build_begin_rcv(&mut buf, false, MsgType::Command, 1, false, 0x00FF_FFFF, 0).unwrap();
        let decoded = decode_begin_rcv(&buf).unwrap();
        assert_eq!(decoded.image_size, 0x00FF_FFFF);
    }

    #[test]
    fn rcv_data_rejects_length_at_mtu_accepts_mtu_minus_one() {
        let mut buf = [0u8; 16];
        let mtu = 16u16;
        let data_ok = [0xAAu8; 15];
        assert!(build_rcv_data(&mut buf, false, MsgType::Command, &data_ok, mtu).is_ok());

        let data_too_big = [0xAAu8; 16];
        assert_eq!(
            build_rcv_data(&mut buf, false, MsgType::Command, &data_too_big, mtu),
            Err(CodecError::OutOfRange)
        );
    }

    #[test]
    fn begin_session_response_round_trip() {
        let mut buf = [0u8; 5];
        build_begin_session_response(&mut buf, true, 0xCAFEBABE).unwrap();
        assert_eq!(decode_begin_session_response(&buf).unwrap(), 0xCAFEBABE);
    }

    #[test]
    fn rcv_complete_round_trip_24_bit() {
        let mut buf = [0u8; 4];
        build_rcv_complete(&mut buf, false, MsgType::Command, 40).unwrap();
        assert_eq!(decode_rcv_complete(&buf).unwrap(), 40);
    }
}
