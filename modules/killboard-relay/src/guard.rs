use std::sync::atomic::{AtomicBool, Ordering};

/// Non-blocking re-entrancy guard for a single scheduled job.
/// At most one holder at a time; a second caller is turned away instead of
/// queueing behind the first.
#[derive(Debug, Default)]
pub struct InFlight {
    running: AtomicBool,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to start a run. Returns `None` if one is already in flight.
    pub fn try_enter(&self) -> Option<InFlightToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightToken { flag: &self.running })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of a run; releases the guard on drop.
pub struct InFlightToken<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightToken<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
