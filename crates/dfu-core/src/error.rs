use core::fmt;

/// Dispatch-level error taxonomy (spec.md §7). All are non-fatal at engine
/// scope: each is reported to the error callback (if installed) and the
/// engine continues to the next `drive()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    InvalidMsgType,
    InvalidCommand,
    MsgTooShort,
    MsgTooLong,
    MsgExceedsMtu,
    NoSession,
    SessionTimedOut,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolError::InvalidMsgType => "invalid message type",
            ProtocolError::InvalidCommand => "invalid command id",
            ProtocolError::MsgTooShort => "message too short",
            ProtocolError::MsgTooLong => "message too long for its variant",
            ProtocolError::MsgExceedsMtu => "message exceeds negotiated MTU",
            ProtocolError::NoSession => "command not permitted in current session state",
            ProtocolError::SessionTimedOut => "session timed out",
        };
        f.write_str(s)
    }
}
