use core::fmt;

/// Local codec failure. Dispatch-level failures (`MsgTooShort`,
/// `MsgTooLong`, `MsgExceedsMtu`) live in `dfu-core`'s error taxonomy;
/// this one only covers malformed payloads the codec itself refuses to
/// produce or consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The caller's buffer is too small to hold the encoded message.
    BufferTooSmall,
    /// The message is too short to contain the fields this decoder expects.
    TooShort,
    /// A field's value is out of range for the wire encoding (e.g. a
    /// `RCV_DATA` payload longer than `MTU - 1`).
    OutOfRange,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::BufferTooSmall => write!(f, "buffer too small to encode message"),
            CodecError::TooShort => write!(f, "message too short to decode"),
            CodecError::OutOfRange => write!(f, "field value out of range for wire encoding"),
        }
    }
}
