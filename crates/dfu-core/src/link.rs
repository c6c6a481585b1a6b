//! C2: the Link Adapter contract (spec.md §4.2, §6).
//!
//! Concrete adapters (raw Ethernet, CAN, UART, or the `dfu-link-udp` test
//! adapter in this workspace) implement this trait outside `dfu-core`; the
//! core never imports a concrete adapter.

/// Transmit destination: unicast to the most recently seen peer, or
/// broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Sender,
    Any,
}

/// Opaque identity of a frame's source, as reported by the adapter. Its
/// meaning (a MAC, a CAN arbitration id, ...) is link-specific; the engine
/// only ever compares it for equality.
pub type SourceId = u64;

/// Non-blocking link I/O, one instance per `dfu-core` engine instance.
///
/// `rx`/`tx` never block. `rx` returns `None` when no frame is immediately
/// available; the buffer it returns is only valid until the next call, so
/// the engine must finish with it before calling `rx` again (non-owning,
/// link-adapter-owned storage, per spec.md §4.2).
pub trait LinkAdapter {
    /// Non-blocking receive. Returns the frame bytes and the sender's
    /// identity if one is ready.
    fn rx(&mut self) -> Option<(&[u8], SourceId)>;

    /// Enqueue one frame for transmission. Returns `false` if the adapter
    /// could not accept it (e.g. its outbound buffer is full).
    fn tx(&mut self, bytes: &[u8], target: Target) -> bool;

    /// Report a link-level error (malformed envelope, filtered source,
    /// ...) upward. Default no-op; adapters that want visibility override
    /// it.
    fn err(&mut self, _bytes: Option<&[u8]>, _message: &str) {}
}
