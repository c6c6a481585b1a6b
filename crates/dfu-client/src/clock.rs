use std::time::Instant;

/// Monotonic millisecond clock for transaction deadlines. `dfu-core`'s
/// engine only ever sees relative elapsed time, so an arbitrary epoch
/// (process start) is fine.
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Clock { epoch: Instant::now() }
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
