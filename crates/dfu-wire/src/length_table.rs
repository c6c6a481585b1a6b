use crate::{Command, MsgType, MAX_MSG_LEN};

/// `RCV_DATA`/`SEND_DATA` entries are capped by the negotiated MTU rather
/// than a fixed constant; the table stores `MAX_MSG_LEN` as an upper bound
/// and callers additionally compare against the live MTU (dispatch step 9
/// in `spec.md` does both checks: `len > MTU` then `len >
/// size_table[cmd][type]`).
const MTU_BOUND: usize = MAX_MSG_LEN;

/// `(COMMAND, RESPONSE, ACK, NAK, UNSOLICITED)` maximum frame length in
/// bytes, header included. `0` means the variant is forbidden for that
/// command (see `spec.md` §3's per-variant length table).
const TABLE: [[usize; 5]; 14] = [
    // NEGOTIATE_MTU
    [3, 3, 1, 1, 0],
    // BEGIN_RCV
    [8, 0, 1, 1, 0],
    // ABORT_XFER
    [1, 0, 1, 1, 0],
    // RCV_COMPLETE
    [4, 0, 1, 1, 0],
    // RCV_DATA
    [MTU_BOUND, 0, 1, 1, 0],
    // REBOOT
    [3, 0, 1, 1, 0],
    // DEVICE_STATUS
    [1, 8, 1, 1, 8],
    // KEEP_ALIVE
    [0, 0, 0, 0, 1],
    // BEGIN_SESSION
    [1, 5, 1, 1, 0],
    // END_SESSION
    [1, 0, 1, 1, 0],
    // IMAGE_STATUS
    [5, 4, 1, 1, 0],
    // BEGIN_SEND
    [2, 8, 1, 1, 0],
    // SEND_DATA
    [2, MTU_BOUND, 1, 1, 0],
    // INSTALL_IMAGE
    [1, 1, 1, 1, 0],
];

// One row per command id (1..=14); `max_len` indexes by `command.id() - 1`
// with no further bounds check, so this must hold at compile time.
static_assertions::const_assert_eq!(TABLE.len(), (crate::LAST_COMMAND - 1) as usize);

/// Maximum permitted length (header included) for `(command, msg_type)`,
/// or `0` if that combination is forbidden. Message types outside
/// `0..=4` (the unused `5..=7` bit patterns) are treated the same as a
/// forbidden combination, since `TABLE` only has five columns.
pub fn max_len(command: Command, msg_type_bits: u8) -> usize {
    let row = &TABLE[command.id() as usize - 1];
    match MsgType::from_bits(msg_type_bits) {
        Some(ty) => row[ty as usize],
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_variant_reports_zero() {
        assert_eq!(max_len(Command::NegotiateMtu, MsgType::Unsolicited as u8), 0);
        assert_eq!(max_len(Command::KeepAlive, MsgType::Command as u8), 0);
    }

    #[test]
    fn rcv_data_bound_by_mtu_cap() {
        assert_eq!(max_len(Command::RcvData, MsgType::Command as u8), MAX_MSG_LEN);
    }

    #[test]
    fn reserved_msg_type_bits_are_forbidden() {
        assert_eq!(max_len(Command::BeginSession, 5), 0);
        assert_eq!(max_len(Command::BeginSession, 7), 0);
    }
}
