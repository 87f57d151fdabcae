//! Blocking and unblocking.
//!
//! "Blocked" is a task state, not a blocking call: these operations move
//! TCBs between lists and leave the actual switch to the dispatcher.

use log::trace;

use super::Kernel;
use crate::error::SchedError;
use crate::task::{Membership, TaskFlags, TaskHandle, TaskState};
use crate::{Tick, WAIT_FOREVER};

impl Kernel {
    /// Move a Ready or Running task to Blocked for `ticks` ticks, or until
    /// woken if `ticks` is `WAIT_FOREVER`. Zero ticks leaves it untouched.
    ///
    /// Blocking the running task leaves the CPU to the dispatcher: the
    /// caller (a sync object, or `delay`) requests the switch.
    pub fn block(&mut self, handle: TaskHandle, ticks: Tick) -> Result<(), SchedError> {
        self.critical(|k| {
            let tcb = k.registry.get(handle)?;
            let state = tcb.state();
            if tcb.is_idle() || !matches!(state, TaskState::Ready | TaskState::Running) {
                return Err(SchedError::InvalidState);
            }
            k.check_may_leave_cpu(handle)?;
            if ticks == 0 {
                return Ok(());
            }

            k.unlink(handle)?;
            let tcb = k.registry.get_mut(handle)?;
            tcb.flags.remove(TaskFlags::TIMED_OUT | TaskFlags::DELAY_ABORTED);

            if ticks == WAIT_FOREVER {
                tcb.state = TaskState::Blocked;
                tcb.membership = Membership::Waiting;
                k.waiting.push_back(&mut k.registry, handle.index());
                trace!("[SCHED] {} blocked indefinitely", handle);
            } else {
                let now = k.tick;
                k.delayed.add(&mut k.registry, handle, now.wrapping_add(ticks), now)?;
                trace!("[SCHED] {} blocked until tick {}", handle, now.wrapping_add(ticks));
            }
            if state == TaskState::Running {
                k.yield_pending = true;
            }
            Ok(())
        })
    }

    /// Block the running task for `ticks` ticks relative to now, then
    /// dispatch. Zero ticks is a plain yield.
    pub fn delay(&mut self, ticks: Tick) -> Result<(), SchedError> {
        let cur = self.running_task().ok_or(SchedError::InvalidState)?;
        if ticks == 0 {
            self.yield_now();
            return Ok(());
        }
        self.block(cur, ticks)?;
        self.request_switch();
        Ok(())
    }

    /// Periodic delay: block the running task until `*last_wake + period`.
    ///
    /// `last_wake` is advanced by one period unless an error is returned.
    /// Returns false if that time had already passed, in which case the
    /// task did not block.
    pub fn delay_until(&mut self, last_wake: &mut Tick, period: Tick) -> Result<bool, SchedError> {
        let cur = self.running_task().ok_or(SchedError::InvalidState)?;
        let now = self.tick;
        let wake = last_wake.wrapping_add(period);

        let should_delay = if now < *last_wake {
            // Counter wrapped since last_wake: only delay if wake wrapped too
            // and is still ahead.
            wake < *last_wake && wake > now
        } else {
            wake < *last_wake || wake > now
        };
        if should_delay {
            self.block(cur, wake.wrapping_sub(now))?;
            *last_wake = wake;
            self.request_switch();
        } else {
            *last_wake = wake;
            self.yield_now();
        }
        Ok(should_delay)
    }

    /// Wake a Blocked task because the event it waited on happened.
    ///
    /// Returns true if it outranks the running task; a yield is then
    /// pending. While the scheduler is suspended the task is only recorded
    /// and the answer comes from `resume_all`.
    pub fn wake(&mut self, handle: TaskHandle) -> Result<bool, SchedError> {
        self.unblock(handle, TaskFlags::empty())
    }

    /// Force a Blocked task out of its wait before the timeout.
    pub fn abort_delay(&mut self, handle: TaskHandle) -> Result<bool, SchedError> {
        self.unblock(handle, TaskFlags::DELAY_ABORTED)
    }

    fn unblock(&mut self, handle: TaskHandle, flags: TaskFlags) -> Result<bool, SchedError> {
        self.critical(|k| {
            let tcb = k.registry.get(handle)?;
            if tcb.state() != TaskState::Blocked {
                return Err(SchedError::InvalidState);
            }
            let prio = tcb.priority();
            k.unlink(handle)?;
            let tcb = k.registry.get_mut(handle)?;
            tcb.flags.remove(TaskFlags::TIMED_OUT);
            tcb.flags.insert(flags);
            k.make_ready(handle)?;

            let switch = k.gate.is_open() && k.outranks_running(prio, false);
            if switch {
                k.yield_pending = true;
            }
            trace!("[SCHED] {} woken, switch={}", handle, switch);
            Ok(switch)
        })
    }
}
