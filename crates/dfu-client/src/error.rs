use core::fmt;

use dfu_wire::{CodecError, Command};

/// Errors surfaced by the transaction layer, image transfer orchestrator,
/// and session sequencer (spec.md §4.4, §4.5, §4.6). These are caller-
/// visible outcomes, distinct from `dfu_core::ProtocolError`, which stays
/// internal to one engine's dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionError {
    /// Another transaction is already outstanding on this instance
    /// (spec.md §4.4's concurrency contract).
    AlreadyInFlight,
    /// The link adapter refused to accept the outgoing frame.
    SendFailed,
    /// No matching response arrived before the caller's deadline.
    Timeout(Command),
    /// The peer replied with `NAK`.
    Nak(Command),
    /// The response could not be decoded.
    Codec(CodecError),
    /// A locally-rejected request, e.g. a chunk larger than `MTU - 1`.
    InvalidRequest,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::AlreadyInFlight => write!(f, "a transaction is already in flight"),
            TransactionError::SendFailed => write!(f, "link adapter rejected the outgoing frame"),
            TransactionError::Timeout(cmd) => write!(f, "timed out waiting for a reply to {cmd:?}"),
            TransactionError::Nak(cmd) => write!(f, "peer NAK'd {cmd:?}"),
            TransactionError::Codec(e) => write!(f, "response decode failed: {e}"),
            TransactionError::InvalidRequest => write!(f, "request rejected locally before sending"),
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<CodecError> for TransactionError {
    fn from(e: CodecError) -> Self {
        TransactionError::Codec(e)
    }
}

/// Outcome of a failed image transfer (spec.md §4.5: "a single chunk
/// failure terminates the transfer with a partial-failure status that
/// includes bytes transmitted and the failing chunk index").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFailure {
    pub error: TransactionError,
    pub bytes_sent: u32,
    pub failing_chunk_index: u32,
}
