//! Dispatcher: the one place that picks the running task.

use core::mem;
use log::{error, info, trace};

use super::Kernel;
use crate::config::IDLE_PRIORITY;
use crate::error::SchedError;
use crate::port::SwitchHook;
use crate::task::registry::TaskParams;
use crate::task::{TaskEntry, TaskFlags, TaskHandle, TaskState};

impl Kernel {
    /// Create the idle task and dispatch the first task.
    pub fn start(&mut self, idle_entry: TaskEntry) -> Result<TaskHandle, SchedError> {
        if self.idle.is_some() {
            return Err(SchedError::InvalidState);
        }
        let params = TaskParams::new(self.config.idle_name, idle_entry, IDLE_PRIORITY);
        let idle = self.spawn(params, TaskFlags::IDLE)?;
        self.idle = Some(idle);
        info!("[SCHED] Starting scheduler with {} tasks", self.registry.len());

        let first = self.select_next()?;
        (self.port.switch_context)(None, first);
        Ok(first)
    }

    /// Presently running task. Pure read.
    pub fn get_current_task(&self) -> Option<TaskHandle> {
        self.current
    }

    /// Decide which task runs next and record it as current.
    ///
    /// This is authoritative: the tick engine's switch signal is only an
    /// estimate, and an unchanged current task means no switch.
    pub fn select_next(&mut self) -> Result<TaskHandle, SchedError> {
        self.critical(|k| {
            if !k.gate.is_open() {
                // Ready set is frozen: keep whoever runs, dispatch on resume.
                k.yield_pending = true;
                return k.running_task().ok_or(SchedError::SchedulerSuspended);
            }
            k.yield_pending = false;
            let rotate = mem::take(&mut k.rotate);

            if let Some(cur) = k.running_task() {
                let prio = k.registry.get(cur)?.priority();
                match k.ready.highest_priority() {
                    Some(top) if top > prio => k.ready.insert_front(&mut k.registry, cur)?,
                    Some(top) if top == prio && rotate => k.ready.insert(&mut k.registry, cur)?,
                    _ => return Ok(cur),
                }
            }

            let next = k
                .ready
                .pop_highest(&mut k.registry)
                .ok_or(SchedError::SchedulerExhausted)?;
            k.registry.get_mut(next)?.state = TaskState::Running;
            k.current = Some(next);
            k.slice_used = 0;
            k.started = true;
            trace!("[SCHED] dispatch -> {}", next);
            Ok(next)
        })
    }

    /// Re-evaluate now and hand any change to the context-switch hook.
    ///
    /// Returns the task switched to, or `None` if the current task keeps
    /// the CPU. Halts if nothing at all is ready.
    pub fn request_switch(&mut self) -> Option<TaskHandle> {
        let (prev, next) = self.prepare_switch()?;
        (self.port.switch_context)(prev, next);
        Some(next)
    }

    /// Commit the dispatch decision without calling the switch hook.
    ///
    /// Returns `(outgoing, incoming)` when the running task changes. A port
    /// that keeps the kernel behind a lock must release it before running
    /// the hook, since the hook may never return to this stack.
    pub fn prepare_switch(&mut self) -> Option<(Option<TaskHandle>, TaskHandle)> {
        let prev = self.current;
        match self.select_next() {
            Ok(next) if Some(next) != prev => Some((prev, next)),
            Ok(_) | Err(SchedError::SchedulerSuspended) => None,
            Err(e) => halt(e),
        }
    }

    pub fn switch_hook(&self) -> SwitchHook {
        self.port.switch_context
    }

    /// Running task gives up the rest of its slice to equal-priority peers.
    pub fn yield_now(&mut self) -> Option<TaskHandle> {
        self.rotate = true;
        self.request_switch()
    }
}

/// Dispatching with nothing ready would run an undefined task.
fn halt(e: SchedError) -> ! {
    error!("[SCHED] fatal: {}", e);
    panic!("scheduler halted: {}", e);
}
