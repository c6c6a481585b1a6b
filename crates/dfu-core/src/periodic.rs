use crate::link::LinkAdapter;

use crate::handler::Responder;

/// A periodic task callback: invoked by `drive()` once its interval has
/// elapsed, typically to emit `DEVICE_STATUS` or `KEEP_ALIVE` unsolicited
/// frames (spec.md §4.3, Glossary).
pub type PeriodicFn<L, Ctx> = fn(ctx: &mut Ctx, responder: &mut Responder<'_, L>);

pub(crate) struct PeriodicTask<L, Ctx> {
    pub(crate) f: PeriodicFn<L, Ctx>,
    pub(crate) interval_ms: u64,
    pub(crate) last_run_ms: u64,
}

impl<L, Ctx> PeriodicTask<L, Ctx> {
    pub(crate) fn due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_run_ms) >= self.interval_ms
    }
}
