//! Tick engine.
//!
//! `on_tick` is the interrupt-context entry point. It only ever moves tasks
//! between well-defined states, so it has no failure path and never blocks.

use log::{trace, warn};

use super::Kernel;
use crate::task::TaskFlags;
use crate::Tick;

/// Timeout bookkeeping captured when a wait starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOut {
    overflows: u32,
    entered: Tick,
}

impl Kernel {
    /// Advance time by one tick.
    ///
    /// Returns true when a strictly higher priority task than the running
    /// one is ready, or the running task's timeslice expired. While the
    /// scheduler is suspended the answer is held back as a pending yield.
    pub fn on_tick(&mut self) -> bool {
        if let Some(cur) = self.running_task() {
            if let Ok(tcb) = self.registry.get_mut(cur) {
                tcb.run_ticks = tcb.run_ticks.wrapping_add(1);
            }
        }

        self.tick = self.tick.wrapping_add(1);
        if self.tick == 0 {
            self.delayed.switch_epoch();
            self.overflows = self.overflows.wrapping_add(1);
            trace!("[SCHED] tick wrapped, overflow epoch promoted");
        }

        let due = self.delayed.drain_due(&mut self.registry, self.tick);
        for &h in &due {
            if let Ok(tcb) = self.registry.get_mut(h) {
                tcb.flags.insert(TaskFlags::TIMED_OUT);
            }
            if let Err(e) = self.make_ready(h) {
                warn!("[SCHED] tick {} could not ready {}: {}", self.tick, h, e);
            }
        }
        if !due.is_empty() {
            trace!("[SCHED] tick {} woke {}", self.tick, due.len());
        }

        let mut switch = match self.running_priority() {
            Some(prio) => {
                let mut expired = false;
                if self.config.time_slicing {
                    if self.ready.len_at(prio) == 0 {
                        // Alone at its level: the slice only starts once a peer shows up.
                        self.slice_used = 0;
                    } else {
                        self.slice_used = self.slice_used.saturating_add(1);
                        if self.slice_used >= self.config.timeslice_ticks {
                            self.rotate = true;
                            expired = true;
                        }
                    }
                }
                expired || self.ready.highest_priority().is_some_and(|top| top > prio)
            }
            None => !self.ready.is_empty(),
        };
        switch |= self.yield_pending;

        if !self.gate.is_open() {
            if switch {
                self.yield_pending = true;
            }
            return false;
        }
        switch && self.config.preemption
    }

    /// Apply ticks that could not be delivered on time.
    pub fn catch_up(&mut self, ticks: u32) -> bool {
        let mut switch = false;
        for _ in 0..ticks {
            switch |= self.on_tick();
        }
        switch
    }

    pub fn tick_count(&self) -> Tick {
        self.tick
    }

    /// How many times the tick counter has wrapped.
    pub fn overflow_count(&self) -> u32 {
        self.overflows
    }

    /// Earliest wake tick on the current-epoch delay list.
    pub fn next_unblock_tick(&self) -> Option<Tick> {
        self.delayed.next_wake(&self.registry)
    }

    /// Capture "now" for a later `check_timeout`.
    pub fn set_timeout(&self) -> TimeOut {
        TimeOut {
            overflows: self.overflows,
            entered: self.tick,
        }
    }

    /// Has the wait described by `timeout` run out of `remaining` ticks?
    ///
    /// When not, `remaining` is reduced by the time already spent and
    /// `timeout` restarted, so the caller can block again for the rest.
    /// An aborted delay on the running task counts as expired.
    pub fn check_timeout(&mut self, timeout: &mut TimeOut, remaining: &mut Tick) -> bool {
        if let Some(cur) = self.running_task() {
            if let Ok(tcb) = self.registry.get_mut(cur) {
                if tcb.flags.contains(TaskFlags::DELAY_ABORTED) {
                    tcb.flags.remove(TaskFlags::DELAY_ABORTED);
                    return true;
                }
            }
        }
        if *remaining == crate::WAIT_FOREVER {
            return false;
        }

        let now = self.tick;
        if timeout.overflows != self.overflows && now >= timeout.entered {
            // A full counter cycle has passed since the wait began.
            *remaining = 0;
            return true;
        }
        let elapsed = now.wrapping_sub(timeout.entered);
        if elapsed < *remaining {
            *remaining -= elapsed;
            *timeout = self.set_timeout();
            false
        } else {
            *remaining = 0;
            true
        }
    }
}
