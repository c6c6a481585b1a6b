//! C4: the transaction layer. Turns the polled engine into a synchronous
//! request/response call, one in flight at a time per instance
//! (spec.md §4.4).

use dfu_core::{Engine, EnginePool, Handle, HandlerArgs, HandlerResult, LinkAdapter, ProtocolConfig, Responder, Target};
use dfu_wire::{Command, MsgType, MAX_MSG_LEN};

use crate::clock::Clock;
use crate::error::TransactionError;

pub(crate) struct TxCtx {
    pending: Option<Command>,
    done: bool,
    accepted: bool,
    frame: [u8; MAX_MSG_LEN],
    frame_len: usize,
}

impl TxCtx {
    fn new() -> Self {
        TxCtx {
            pending: None,
            done: false,
            accepted: false,
            frame: [0u8; MAX_MSG_LEN],
            frame_len: 0,
        }
    }

    fn reset(&mut self, command: Command) {
        self.pending = Some(command);
        self.done = false;
        self.accepted = false;
        self.frame_len = 0;
    }

    pub(crate) fn response(&self) -> &[u8] {
        &self.frame[..self.frame_len]
    }
}

/// Installed under the command id the outstanding transaction is waiting
/// on. `ACK`/`RESPONSE` complete with the raw frame captured for the
/// caller to decode; `NAK` completes with failure.
fn transaction_handler<L: LinkAdapter>(
    ctx: &mut TxCtx,
    _responder: &mut Responder<'_, L>,
    args: &HandlerArgs<'_>,
) -> HandlerResult {
    if ctx.pending != Some(args.command) {
        return Err(());
    }
    match args.msg_type {
        MsgType::Ack | MsgType::Response => {
            let len = args.frame.len().min(ctx.frame.len());
            ctx.frame[..len].copy_from_slice(&args.frame[..len]);
            ctx.frame_len = len;
            ctx.accepted = true;
            ctx.done = true;
            Ok(())
        }
        MsgType::Nak => {
            ctx.accepted = false;
            ctx.done = true;
            Ok(())
        }
        _ => Err(()),
    }
}

/// One synchronous transaction at a time over a `dfu-core` `Engine`. The
/// engine instance itself is drawn from a single-slot `EnginePool`, paired
/// with an explicit `destroy` on drop, rather than held as a bare field
/// (spec.md §4.3's `create`/`destroy` pool discipline).
pub struct Transactor<L, Cfg, const PERIODIC: usize = 1>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    engine_pool: EnginePool<L, TxCtx, Cfg, PERIODIC, 1>,
    engine_handle: Handle,
    ctx: TxCtx,
    clock: Clock,
    in_flight: bool,
}

impl<L, Cfg, const PERIODIC: usize> Transactor<L, Cfg, PERIODIC>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    pub fn new() -> Self {
        let mut engine_pool: EnginePool<L, TxCtx, Cfg, PERIODIC, 1> = EnginePool::new();
        let engine_handle = engine_pool
            .create(0)
            .expect("a freshly constructed single-slot pool always has room for its first instance");
        Transactor {
            engine_pool,
            engine_handle,
            ctx: TxCtx::new(),
            clock: Clock::new(),
            in_flight: false,
        }
    }

    pub fn engine(&self) -> &Engine<L, TxCtx, Cfg, PERIODIC> {
        self.engine_pool
            .get(self.engine_handle)
            .expect("transactor-owned handle stays valid for the transactor's lifetime")
    }

    pub fn engine_mut(&mut self) -> &mut Engine<L, TxCtx, Cfg, PERIODIC> {
        self.engine_pool
            .get_mut(self.engine_handle)
            .expect("transactor-owned handle stays valid for the transactor's lifetime")
    }

    /// Run one request/response transaction (spec.md §4.4's six-step
    /// protocol): install a response handler keyed by `command`, send
    /// `frame`, busy-drive until the handler flags completion or
    /// `timeout_ms` elapses, then remove the handler and report the
    /// outcome. On success, `response()` holds the captured reply frame
    /// until the next call to `run`.
    pub fn run(
        &mut self,
        link: &mut L,
        command: Command,
        frame: &[u8],
        timeout_ms: u64,
    ) -> Result<(), TransactionError> {
        if self.in_flight {
            return Err(TransactionError::AlreadyInFlight);
        }
        self.in_flight = true;
        self.ctx.reset(command);
        self.engine_mut().install_handler(command, transaction_handler::<L>);

        let result = self.drive_to_completion(link, command, frame, timeout_ms);

        self.engine_mut().remove_handler(command);
        self.in_flight = false;
        result
    }

    fn drive_to_completion(
        &mut self,
        link: &mut L,
        command: Command,
        frame: &[u8],
        timeout_ms: u64,
    ) -> Result<(), TransactionError> {
        let engine = self
            .engine_pool
            .get_mut(self.engine_handle)
            .expect("transactor-owned handle stays valid for the transactor's lifetime");
        if !engine.send_msg(link, frame, Target::Sender) {
            return Err(TransactionError::SendFailed);
        }
        let deadline = self.clock.now_ms() + timeout_ms;
        loop {
            let now = self.clock.now_ms();
            let engine = self
                .engine_pool
                .get_mut(self.engine_handle)
                .expect("transactor-owned handle stays valid for the transactor's lifetime");
            engine.drive(link, &mut self.ctx, now);
            if self.ctx.done {
                break;
            }
            if now >= deadline {
                return Err(TransactionError::Timeout(command));
            }
        }
        if self.ctx.accepted {
            Ok(())
        } else {
            Err(TransactionError::Nak(command))
        }
    }

    pub fn response(&self) -> &[u8] {
        self.ctx.response()
    }
}

impl<L, Cfg, const PERIODIC: usize> Drop for Transactor<L, Cfg, PERIODIC>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    fn drop(&mut self) {
        self.engine_pool.destroy(self.engine_handle);
    }
}

impl<L, Cfg, const PERIODIC: usize> Default for Transactor<L, Cfg, PERIODIC>
where
    L: LinkAdapter,
    Cfg: ProtocolConfig,
{
    fn default() -> Self {
        Self::new()
    }
}
