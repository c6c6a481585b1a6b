//! C3: the protocol engine (spec.md §4.3).
//!
//! One `Engine` owns one instance's dispatch/timer state. It is generic
//! over the link adapter (`L`), the handler context type (`Ctx`, supplied
//! fresh on every `drive()` call rather than captured, per the redesign
//! note in `spec.md` §9), and the target's `ProtocolConfig`. `PERIODIC` is
//! the fixed size of the periodic-task table.

use dfu_wire::{Command, Header, MsgType, MAX_MSG_LEN};

use crate::config::ProtocolConfig;
use crate::error::ProtocolError;
use crate::handler::{HandlerArgs, HandlerFn, Responder};
use crate::link::LinkAdapter;
use crate::periodic::{PeriodicFn, PeriodicTask};
use crate::pool::{Handle, Pool};
use crate::session::{allowed_mask, SessionState};

/// Outcome of one `drive()` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    /// Reserved outcome value; not currently produced by `drive()` (the
    /// no-frame case returns `Unknown`, not `Idle` — see spec.md §4.3
    /// step 4). Kept so `DriveState` carries the full result set named
    /// there.
    Idle,
    /// A frame was dispatched and its handler succeeded.
    Ok,
    /// A frame was rejected before or during dispatch.
    Error,
    /// This dispatch was the one that promoted the session to `ACTIVE`.
    SessionActive,
    /// This dispatch was an `END_SESSION` that tore the session down.
    SessionEnded,
    /// The session or starting timer expired this tick.
    SessionTimeout,
    /// Nothing happened this pass: no periodic task was due and no frame
    /// was ready (`dfu_proto.c`'s `DDS_UNKNOWN` sentinel for a `dfuDrive()`
    /// call that pulled nothing).
    Unknown,
}

/// Command-id-indexed handler table size. Slot `0` is unused (command ids
/// start at 1); this keeps dispatch an O(1) direct index by command id.
const HANDLER_SLOTS: usize = dfu_wire::LAST_COMMAND as usize;

pub type ErrorFn<Ctx> = fn(ctx: &mut Ctx, error: ProtocolError);

pub struct Engine<L, Ctx, Cfg, const PERIODIC: usize = 4>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    mtu: u16,
    toggle: bool,
    device_status_bits: u8,
    session_state: SessionState,
    session_timer_start_ms: u64,
    uptime_timer_start_ms: u64,
    last_received_command: Option<Command>,
    handlers: [Option<HandlerFn<L, Ctx>>; HANDLER_SLOTS],
    periodic: [Option<PeriodicTask<L, Ctx>>; PERIODIC],
    error_handler: Option<ErrorFn<Ctx>>,
    rx_scratch: [u8; MAX_MSG_LEN],
    tx_scratch: [u8; MAX_MSG_LEN],
    _cfg: core::marker::PhantomData<Cfg>,
}

impl<L, Ctx, Cfg, const PERIODIC: usize> Engine<L, Ctx, Cfg, PERIODIC>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    const INIT_HANDLER: Option<HandlerFn<L, Ctx>> = None;
    const INIT_PERIODIC: Option<PeriodicTask<L, Ctx>> = None;

    /// Initialize MTU to `DEFAULT_MTU`, start the uptime timer, and
    /// install no handlers (every slot defaults to NAK-or-silent per
    /// `Cfg::NAK_UNSUPPORTED_COMMANDS`). Crate-private: instances are
    /// only ever minted through [`EnginePool::create`], which reserves
    /// the pool slot this initializes into.
    pub(crate) fn new(now_ms: u64) -> Self {
        Engine {
            mtu: dfu_wire::DEFAULT_MTU,
            toggle: true,
            device_status_bits: 0,
            session_state: SessionState::Inactive,
            session_timer_start_ms: now_ms,
            uptime_timer_start_ms: now_ms,
            last_received_command: None,
            handlers: [Self::INIT_HANDLER; HANDLER_SLOTS],
            periodic: [Self::INIT_PERIODIC; PERIODIC],
            error_handler: None,
            rx_scratch: [0u8; MAX_MSG_LEN],
            tx_scratch: [0u8; MAX_MSG_LEN],
            _cfg: core::marker::PhantomData,
        }
    }

    pub fn install_handler(&mut self, command: Command, f: HandlerFn<L, Ctx>) {
        self.handlers[command.id() as usize - 1] = Some(f);
    }

    pub fn remove_handler(&mut self, command: Command) {
        self.handlers[command.id() as usize - 1] = None;
    }

    pub fn set_error_handler(&mut self, f: ErrorFn<Ctx>) {
        self.error_handler = Some(f);
    }

    /// Install a periodic task. Returns `false` if the table is full.
    pub fn install_periodic(&mut self, f: PeriodicFn<L, Ctx>, interval_ms: u64, now_ms: u64) -> bool {
        for slot in self.periodic.iter_mut() {
            if slot.is_none() {
                *slot = Some(PeriodicTask {
                    f,
                    interval_ms,
                    last_run_ms: now_ms,
                });
                return true;
            }
        }
        false
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn set_mtu(&mut self, mtu: u16) {
        self.mtu = mtu.clamp(1, MAX_MSG_LEN as u16);
    }

    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    pub fn last_received_command(&self) -> Option<Command> {
        self.last_received_command
    }

    pub fn device_status_bits(&self) -> u8 {
        self.device_status_bits
    }

    pub fn set_device_status_bits(&mut self, bits: u8) {
        self.device_status_bits = bits;
    }

    pub fn uptime_minutes(&self, now_ms: u64) -> u16 {
        let elapsed_ms = now_ms.saturating_sub(self.uptime_timer_start_ms);
        (elapsed_ms / 60_000).min(u16::MAX as u64) as u16
    }

    pub fn toggle(&self) -> bool {
        self.toggle
    }

    /// Send a message through this instance's toggle/link, for use outside
    /// handler context (e.g. the transaction layer building a request).
    pub fn send_msg(&mut self, link: &mut L, bytes: &[u8], target: crate::link::Target) -> bool {
        let mut responder = Responder {
            link,
            toggle: &mut self.toggle,
            session_state: &mut self.session_state,
            scratch: &mut self.tx_scratch,
        };
        responder.send_msg(bytes, target)
    }

    fn report_error(&mut self, ctx: &mut Ctx, error: ProtocolError) {
        log::debug!("dfu dispatch error: {error}");
        if let Some(f) = self.error_handler {
            f(ctx, error);
        }
    }

    /// One non-blocking pass: run due periodic tasks, check session/starting
    /// timeouts, pull at most one frame, validate and dispatch it
    /// (spec.md §4.3's eleven-step algorithm).
    pub fn drive(&mut self, link: &mut L, ctx: &mut Ctx, now_ms: u64) -> DriveState {
        // Step 1: periodic tasks.
        for i in 0..self.periodic.len() {
            let due = match &self.periodic[i] {
                Some(task) => task.due(now_ms),
                None => false,
            };
            if due {
                let f = self.periodic[i].as_ref().unwrap().f;
                {
                    let mut responder = Responder {
                        link,
                        toggle: &mut self.toggle,
                        session_state: &mut self.session_state,
                        scratch: &mut self.tx_scratch,
                    };
                    f(ctx, &mut responder);
                }
                if let Some(task) = self.periodic[i].as_mut() {
                    task.last_run_ms = now_ms;
                }
            }
        }

        // Steps 2-3: session/starting timeouts.
        let elapsed = now_ms.saturating_sub(self.session_timer_start_ms);
        match self.session_state {
            SessionState::Active if elapsed >= Cfg::IDLE_SESSION_TIMEOUT_MINS as u64 * 60_000 => {
                self.session_state = SessionState::Inactive;
                log::warn!("dfu session idle-timed-out after {elapsed}ms");
                self.report_error(ctx, ProtocolError::SessionTimedOut);
                return DriveState::SessionTimeout;
            }
            SessionState::Starting if elapsed >= Cfg::SESSION_STARTING_TIMEOUT_MS => {
                self.session_state = SessionState::Inactive;
                log::warn!("dfu session-starting timed-out after {elapsed}ms");
                self.report_error(ctx, ProtocolError::SessionTimedOut);
                return DriveState::SessionTimeout;
            }
            _ => {}
        }

        // Step 4: pull at most one frame.
        let frame_len = match link.rx() {
            Some((bytes, _source)) => {
                let len = bytes.len().min(self.rx_scratch.len());
                self.rx_scratch[..len].copy_from_slice(&bytes[..len]);
                len
            }
            None => return DriveState::Unknown,
        };

        self.dispatch_frame(link, ctx, now_ms, frame_len)
    }

    fn dispatch_frame(&mut self, link: &mut L, ctx: &mut Ctx, now_ms: u64, len: usize) -> DriveState {
        // Steps 5-6: parse header, validate command id.
        let header = Header::unpack(self.rx_scratch[0]);
        let command = match header.command() {
            Some(c) => c,
            None => {
                self.report_error(ctx, ProtocolError::InvalidCommand);
                return DriveState::Error;
            }
        };
        self.last_received_command = Some(command);

        // Step 7: session-state gate.
        if !allowed_mask(command).allows(self.session_state) {
            self.report_error(ctx, ProtocolError::NoSession);
            return DriveState::Error;
        }

        // Step 8: restart session timer (first restart, pre-handler).
        self.session_timer_start_ms = now_ms;

        // Step 9: length checks.
        if len > self.mtu as usize {
            self.report_error(ctx, ProtocolError::MsgExceedsMtu);
            return DriveState::Error;
        }
        if len == 0 {
            self.report_error(ctx, ProtocolError::MsgTooShort);
            return DriveState::Error;
        }
        let max = dfu_wire::max_len(command, header.msg_type_bits);
        if len > max {
            self.report_error(ctx, ProtocolError::MsgTooLong);
            return DriveState::Error;
        }

        // Step 10: dispatch to the handler.
        let session_before = self.session_state;
        // Unused bits 5..7 of the msg-type field are leniently treated as
        // COMMAND for dispatch purposes (SPEC_FULL Open Question #1); the
        // size table already rejects oversized frames above regardless of
        // how the bits decode.
        let msg_type = header.msg_type().unwrap_or(MsgType::Command);

        if command == Command::BeginSession {
            self.session_state = SessionState::Starting;
        }

        let handler = self.handlers[command.id() as usize - 1];
        let outcome = {
            let args = HandlerArgs {
                command,
                msg_type,
                toggle: header.toggle,
                frame: &self.rx_scratch[..len],
            };
            match handler {
                Some(f) => {
                    let mut responder = Responder {
                        link,
                        toggle: &mut self.toggle,
                        session_state: &mut self.session_state,
                        scratch: &mut self.tx_scratch,
                    };
                    f(ctx, &mut responder, &args)
                }
                None => {
                    if Cfg::NAK_UNSUPPORTED_COMMANDS {
                        let mut responder = Responder {
                            link,
                            toggle: &mut self.toggle,
                            session_state: &mut self.session_state,
                            scratch: &mut self.tx_scratch,
                        };
                        responder.send_nak(command);
                    }
                    Ok(())
                }
            }
        };

        match outcome {
            Ok(()) => {
                // Step 10 cont'd: restart session timer again on success.
                self.session_timer_start_ms = now_ms;

                if command == Command::EndSession {
                    self.session_state = SessionState::Inactive;
                    return DriveState::SessionEnded;
                }
                if session_before != SessionState::Active
                    && self.session_state == SessionState::Active
                {
                    return DriveState::SessionActive;
                }
                DriveState::Ok
            }
            Err(()) => {
                if command == Command::BeginSession {
                    self.session_state = SessionState::Inactive;
                }
                DriveState::Error
            }
        }
    }
}

/// A bounded pool of protocol instances, sized by `N` (callers size this
/// to match `Cfg::MAX_PROTOCOL_INSTANCES` for the target they're
/// building). spec.md §4.3's `create`/`destroy` reserve and release a
/// pool slot rather than allocating an `Engine` directly; §9's redesign
/// note replaces the original's fixed array-of-structs-plus-signature
/// scheme with this crate's generation-checked [`Pool`], the same
/// discipline `dfu-registry` uses for discovered-device lists.
pub struct EnginePool<L, Ctx, Cfg, const PERIODIC: usize, const N: usize>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    pool: Pool<Engine<L, Ctx, Cfg, PERIODIC>, N>,
}

impl<L, Ctx, Cfg, const PERIODIC: usize, const N: usize> EnginePool<L, Ctx, Cfg, PERIODIC, N>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    pub const fn new() -> Self {
        EnginePool { pool: Pool::new() }
    }

    /// Reserve a slot and initialize a fresh instance in it. Returns
    /// `None` if every slot is already in use (spec.md §8: "reserving
    /// from a full pool returns 'none'").
    pub fn create(&mut self, now_ms: u64) -> Option<Handle> {
        self.pool.reserve(Engine::new(now_ms))
    }

    /// Release `handle`'s slot back to the pool.
    pub fn destroy(&mut self, handle: Handle) {
        self.pool.release(handle);
    }

    pub fn get(&self, handle: Handle) -> Option<&Engine<L, Ctx, Cfg, PERIODIC>> {
        self.pool.get(handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Engine<L, Ctx, Cfg, PERIODIC>> {
        self.pool.get_mut(handle)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }
}

impl<L, Ctx, Cfg, const PERIODIC: usize, const N: usize> Default for EnginePool<L, Ctx, Cfg, PERIODIC, N>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;
    use crate::link::Target;
    use std::collections::VecDeque;

    struct LoopbackLink {
        inbox: VecDeque<([u8; MAX_MSG_LEN], usize)>,
        sent: Vec<Vec<u8>>,
    }

    impl LoopbackLink {
        fn new() -> Self {
            LoopbackLink {
                inbox: VecDeque::new(),
                sent: Vec::new(),
            }
        }

        fn push(&mut self, bytes: &[u8]) {
            let mut buf = [0u8; MAX_MSG_LEN];
            buf[..bytes.len()].copy_from_slice(bytes);
            self.inbox.push_back((buf, bytes.len()));
        }
    }

    impl LinkAdapter for LoopbackLink {
        fn rx(&mut self) -> Option<(&[u8], u64)> {
            // `self.inbox` holds owned copies; return a reference valid
            // for the call by leaking the front's length into a thread
            // local is overkill for a test double, so just peek via index.
            None
        }

        fn tx(&mut self, bytes: &[u8], _target: Target) -> bool {
            self.sent.push(bytes.to_vec());
            true
        }
    }

    struct Ctx;

    #[test]
    fn oversize_frame_is_rejected_without_calling_handler() {
        // mirrors spec.md §8 scenario #4: a frame longer than the
        // negotiated MTU must be rejected before any handler runs.
        let mut link = LoopbackLink::new();
        let mut engine: Engine<LoopbackLink, Ctx, DefaultConfig> = Engine::new(0);
        engine.set_mtu(4);
        engine.rx_scratch[0] = Header::pack(Command::KeepAlive.id(), true, MsgType::Command);
        let state = engine.dispatch_frame(&mut link, &mut Ctx, 0, 5);
        assert_eq!(state, DriveState::Error);
        assert!(link.sent.is_empty());
    }

    #[test]
    fn session_starting_timeout_returns_to_inactive() {
        // mirrors spec.md §8 scenario #5.
        let mut link = LoopbackLink::new();
        let mut engine: Engine<LoopbackLink, Ctx, DefaultConfig> = Engine::new(0);
        engine.session_state = SessionState::Starting;
        engine.session_timer_start_ms = 0;
        let timeout_ms = DefaultConfig::SESSION_STARTING_TIMEOUT_MS;
        let state = engine.drive(&mut link, &mut Ctx, timeout_ms);
        assert_eq!(state, DriveState::SessionTimeout);
        assert_eq!(engine.session_state(), SessionState::Inactive);
    }

    #[test]
    fn unsupported_command_with_no_handler_sends_nak() {
        let mut link = LoopbackLink::new();
        let mut engine: Engine<LoopbackLink, Ctx, DefaultConfig> = Engine::new(0);
        // REBOOT requires an active session; force one for this test.
        engine.session_state = SessionState::Active;
        engine.rx_scratch[0] = Header::pack(Command::Reboot.id(), true, MsgType::Command);
        let state = engine.dispatch_frame(&mut link, &mut Ctx, 0, 1);
        assert_eq!(state, DriveState::Ok);
        assert_eq!(link.sent.len(), 1);
    }

    #[test]
    fn drive_with_no_frame_returns_unknown() {
        let mut link = LoopbackLink::new();
        let mut engine: Engine<LoopbackLink, Ctx, DefaultConfig> = Engine::new(0);
        assert_eq!(engine.drive(&mut link, &mut Ctx, 0), DriveState::Unknown);
    }

    #[test]
    fn engine_pool_create_and_destroy_round_trip() {
        let mut pool: EnginePool<LoopbackLink, Ctx, DefaultConfig, 4, 2> = EnginePool::new();
        let a = pool.create(0).expect("first slot is free");
        let _b = pool.create(0).expect("second slot is free");
        assert!(pool.create(0).is_none(), "pool capacity is 2");

        pool.destroy(a);
        assert!(pool.get(a).is_none(), "handle invalid once destroyed");
        assert!(pool.create(0).is_some(), "destroying a slot frees it for reuse");
    }
}
