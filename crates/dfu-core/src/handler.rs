use dfu_wire::{Command, MsgType};

use crate::link::{LinkAdapter, Target};
use crate::session::SessionState;

/// A handler either accepts the frame (the engine restarts the session
/// timer and returns `DriveState::Ok`) or rejects it (the engine returns
/// `DriveState::Error` without retrying).
pub type HandlerResult = Result<(), ()>;

/// Everything a handler needs to know about the frame that triggered it.
pub struct HandlerArgs<'a> {
    pub command: Command,
    pub msg_type: MsgType,
    pub toggle: bool,
    /// Full frame bytes, header included (decoders in `dfu_wire` expect
    /// this shape).
    pub frame: &'a [u8],
}

/// Facade a handler uses to send a reply. Wraps the link adapter so the
/// handler never touches it directly; every successful send flips the
/// engine's toggle bit, per spec.md's invariant.
pub struct Responder<'a, L: LinkAdapter> {
    pub(crate) link: &'a mut L,
    pub(crate) toggle: &'a mut bool,
    pub(crate) session_state: &'a mut SessionState,
    pub(crate) scratch: &'a mut [u8],
}

impl<'a, L: LinkAdapter> Responder<'a, L> {
    pub fn send_msg(&mut self, bytes: &[u8], target: Target) -> bool {
        let sent = self.link.tx(bytes, target);
        if sent {
            *self.toggle = !*self.toggle;
        }
        sent
    }

    pub fn send_ack(&mut self, command: Command) -> bool {
        let len = dfu_wire::messages::build_ack_or_nak(self.scratch, *self.toggle, command, MsgType::Ack);
        self.send_msg(&self.scratch[..len], Target::Sender)
    }

    pub fn send_nak(&mut self, command: Command) -> bool {
        let len = dfu_wire::messages::build_ack_or_nak(self.scratch, *self.toggle, command, MsgType::Nak);
        self.send_msg(&self.scratch[..len], Target::Sender)
    }

    pub fn session_state(&self) -> SessionState {
        *self.session_state
    }

    pub fn set_session_state(&mut self, state: SessionState) {
        *self.session_state = state;
    }

    pub fn scratch(&mut self) -> &mut [u8] {
        self.scratch
    }
}

/// A plain function pointer handler, keyed by command id (spec.md §4.3:
/// "install_handler(inst, cmd, fn, user)"). `Ctx` is supplied by the
/// instance owner on each `drive()` call rather than captured in the
/// table — replacing the original's raw `void *userPtr` with an explicit,
/// borrow-checked context reference (spec.md §9's "Callbacks with raw user
/// pointers" redesign note).
pub type HandlerFn<L, Ctx> =
    fn(ctx: &mut Ctx, responder: &mut Responder<'_, L>, args: &HandlerArgs<'_>) -> HandlerResult;
