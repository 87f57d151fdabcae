//! Preemptive priority scheduler.
//!
//! `Kernel` is the whole scheduler context: registry, ready set, delay
//! list, suspension gate, tick counter and the current-task slot. It is
//! created once at system start and passed explicitly to every entry point,
//! so independent instances can be driven side by side in tests.
//!
//! Task-context mutators run inside a port critical section. The tick
//! engine (`on_tick`) is the interrupt-context entry point.

pub mod delay;
pub mod dispatch;
pub mod gate;
pub mod ready;
pub mod tick;
pub mod wait;

use alloc::vec::Vec;
use log::{debug, info};

use crate::config::SchedConfig;
use crate::error::SchedError;
use crate::list::List;
use crate::port::{CriticalSection, PortHooks};
use crate::task::registry::{Registry, TaskParams};
use crate::task::{Membership, TaskFlags, TaskHandle, TaskState, TaskStatus, Tcb};
use crate::Tick;

use delay::DelayList;
use gate::SuspensionGate;
use ready::ReadySet;

pub struct Kernel {
    config: SchedConfig,
    port: PortHooks,
    registry: Registry,
    ready: ReadySet,
    delayed: DelayList,
    /// Blocked with no timeout.
    waiting: List,
    /// Suspended by handle.
    suspended: List,
    gate: SuspensionGate,
    current: Option<TaskHandle>,
    idle: Option<TaskHandle>,
    tick: Tick,
    overflows: u32,
    slice_used: u32,
    /// Next dispatch rotates the running task to the tail of its level.
    rotate: bool,
    /// A switch was wanted but could not happen yet.
    yield_pending: bool,
    started: bool,
}

impl Kernel {
    pub fn new(config: SchedConfig, port: PortHooks) -> Result<Self, SchedError> {
        config.validate()?;
        debug!(
            "[SCHED] Kernel: {} priorities, {} task slots, slice {} ticks",
            config.max_priorities, config.max_tasks, config.timeslice_ticks
        );
        Ok(Kernel {
            registry: Registry::new(config.max_tasks, config.max_priorities),
            ready: ReadySet::new(config.max_priorities),
            delayed: DelayList::new(),
            waiting: List::new(),
            suspended: List::new(),
            gate: SuspensionGate::new(),
            current: None,
            idle: None,
            tick: config.initial_tick,
            overflows: 0,
            slice_used: 0,
            rotate: false,
            yield_pending: false,
            started: false,
            config,
            port,
        })
    }

    /// Run `f` with scheduler interrupts masked.
    pub(crate) fn critical<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let _cs = CriticalSection::enter(&self.port);
        f(self)
    }

    // ─── Registry ───────────────────────────────────────────────────

    /// Register a task, Ready or Suspended per `params.initial_state`.
    pub fn create(&mut self, params: TaskParams) -> Result<TaskHandle, SchedError> {
        self.spawn(params, TaskFlags::empty())
    }

    pub(crate) fn spawn(&mut self, params: TaskParams, flags: TaskFlags) -> Result<TaskHandle, SchedError> {
        self.critical(|k| {
            let handle = k.registry.create(params, flags)?;
            match params.initial_state {
                TaskState::Suspended => k.park_suspended(handle)?,
                _ => {
                    k.make_ready(handle)?;
                    if k.gate.is_open() && k.outranks_running(params.priority, false) {
                        k.yield_pending = true;
                    }
                }
            }
            debug!(
                "[SCHED] Created {} ({}, prio {}, {})",
                params.name, handle, params.priority, params.initial_state
            );
            Ok(handle)
        })
    }

    /// Remove a task from every scheduler structure and retire its handle.
    ///
    /// Deleting the running task dispatches a replacement straight away
    /// unless the scheduler is suspended.
    pub fn delete(&mut self, handle: TaskHandle) -> Result<(), SchedError> {
        let was_running = self.critical(|k| {
            if k.registry.get(handle)?.is_idle() {
                return Err(SchedError::InvalidState);
            }
            k.check_may_leave_cpu(handle)?;
            k.unlink(handle)?;
            let tcb = k.registry.delete(handle)?;
            debug!("[SCHED] Deleted {} ({})", tcb.name(), handle);
            if k.current == Some(handle) {
                k.current = None;
                k.slice_used = 0;
                return Ok(true);
            }
            Ok(false)
        })?;

        if was_running {
            self.reschedule();
        }
        Ok(())
    }

    pub fn get(&self, handle: TaskHandle) -> Result<&Tcb, SchedError> {
        self.registry.get(handle)
    }

    /// Store the port's saved context word for a task.
    pub fn set_context(&mut self, handle: TaskHandle, context: usize) -> Result<(), SchedError> {
        self.registry.get_mut(handle)?.context = context;
        Ok(())
    }

    // ─── Task-level suspend / resume ────────────────────────────────

    /// Take a task out of scheduling until `resume`. Not cumulative.
    pub fn suspend(&mut self, handle: TaskHandle) -> Result<(), SchedError> {
        let was_running = self.critical(|k| {
            let tcb = k.registry.get(handle)?;
            if tcb.is_idle() {
                return Err(SchedError::InvalidState);
            }
            if tcb.state() == TaskState::Suspended {
                return Ok(false);
            }
            let was_running = tcb.state() == TaskState::Running;
            k.check_may_leave_cpu(handle)?;
            k.unlink(handle)?;
            k.park_suspended(handle)?;
            info!("[SCHED] Suspended {}", handle);
            Ok(was_running)
        })?;

        if was_running {
            self.reschedule();
        }
        Ok(())
    }

    /// Make a suspended task ready again. Returns true if it is at or above
    /// the running task's priority, so the caller should consider a switch.
    pub fn resume(&mut self, handle: TaskHandle) -> Result<bool, SchedError> {
        self.critical(|k| {
            let tcb = k.registry.get(handle)?;
            if tcb.state() != TaskState::Suspended {
                return Ok(false);
            }
            let prio = tcb.priority();
            k.unlink(handle)?;
            k.make_ready(handle)?;
            info!("[SCHED] Resumed {}", handle);
            let switch = k.gate.is_open() && k.outranks_running(prio, true);
            if switch {
                k.yield_pending = true;
            }
            Ok(switch)
        })
    }

    // ─── Priority ───────────────────────────────────────────────────

    pub fn priority(&self, handle: TaskHandle) -> Result<u8, SchedError> {
        Ok(self.registry.get(handle)?.priority())
    }

    /// Change a task's priority. Returns true if a switch should follow.
    pub fn set_priority(&mut self, handle: TaskHandle, priority: u8) -> Result<bool, SchedError> {
        if priority >= self.config.max_priorities {
            return Err(SchedError::InvalidPriority);
        }
        self.critical(|k| {
            let tcb = k.registry.get(handle)?;
            let old = tcb.priority();
            let state = tcb.state();
            let queued = matches!(tcb.membership(), Membership::Ready(_));
            if old == priority {
                return Ok(false);
            }

            if queued {
                k.ready.remove(&mut k.registry, handle)?;
            }
            k.registry.get_mut(handle)?.priority = priority;
            if queued {
                k.ready.insert(&mut k.registry, handle)?;
            }
            debug!("[SCHED] {} priority {} -> {}", handle, old, priority);

            let switch = match state {
                TaskState::Running => k.ready.highest_priority().is_some_and(|top| top > priority),
                TaskState::Ready if queued => k.outranks_running(priority, false),
                _ => false,
            };
            if switch {
                k.yield_pending = true;
            }
            Ok(switch)
        })
    }

    // ─── Introspection ──────────────────────────────────────────────

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn task_count(&self) -> usize {
        self.registry.len()
    }

    pub fn task_status(&self, handle: TaskHandle) -> Result<TaskStatus, SchedError> {
        Ok(self.registry.get(handle)?.status())
    }

    /// Snapshot of every live task, in slot order.
    pub fn system_state(&self) -> Vec<TaskStatus> {
        self.registry.iter().map(|t| t.status()).collect()
    }

    pub fn handle_by_name(&self, name: &str) -> Option<TaskHandle> {
        self.registry.find_by_name(name)
    }

    pub fn idle_task(&self) -> Option<TaskHandle> {
        self.idle
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn yield_pending(&self) -> bool {
        self.yield_pending
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Ready tasks at one priority level, head first.
    pub fn ready_at(&self, priority: u8) -> Vec<TaskHandle> {
        self.ready.level(&self.registry, priority)
    }

    pub fn highest_ready_priority(&self) -> Option<u8> {
        self.ready.highest_priority()
    }

    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn suspended_len(&self) -> usize {
        self.suspended.len()
    }

    // ─── Internal helpers ───────────────────────────────────────────

    /// The current task, if it is actually executing.
    pub(crate) fn running_task(&self) -> Option<TaskHandle> {
        let cur = self.current?;
        match self.registry.get(cur) {
            Ok(t) if t.state() == TaskState::Running => Some(cur),
            _ => None,
        }
    }

    pub(crate) fn running_priority(&self) -> Option<u8> {
        self.running_task()
            .and_then(|h| self.registry.get(h).ok())
            .map(|t| t.priority())
    }

    /// Whether `prio` beats the running task (or nothing is running).
    pub(crate) fn outranks_running(&self, prio: u8, or_equal: bool) -> bool {
        match self.running_priority() {
            Some(p) if or_equal => prio >= p,
            Some(p) => prio > p,
            None => true,
        }
    }

    /// The running task cannot give up the CPU while the ready set is
    /// frozen: nothing could be dispatched in its place.
    pub(crate) fn check_may_leave_cpu(&self, handle: TaskHandle) -> Result<(), SchedError> {
        if !self.gate.is_open() && self.running_task() == Some(handle) {
            return Err(SchedError::SchedulerSuspended);
        }
        Ok(())
    }

    pub(crate) fn note_yield(&mut self) {
        self.yield_pending = true;
    }

    /// Ready an unlinked task, or park it on the pending list while the
    /// scheduler is suspended.
    pub(crate) fn make_ready(&mut self, handle: TaskHandle) -> Result<(), SchedError> {
        if self.gate.is_open() {
            self.ready.insert(&mut self.registry, handle)
        } else {
            self.gate.defer(&mut self.registry, handle)
        }
    }

    fn park_suspended(&mut self, handle: TaskHandle) -> Result<(), SchedError> {
        let tcb = self.registry.get_mut(handle)?;
        if tcb.membership != Membership::Unlinked {
            return Err(SchedError::InvalidState);
        }
        tcb.state = TaskState::Suspended;
        tcb.membership = Membership::Suspended;
        self.suspended.push_back(&mut self.registry, handle.index());
        Ok(())
    }

    /// Take a task off whichever list holds it. Running tasks are already
    /// unlinked.
    pub(crate) fn unlink(&mut self, handle: TaskHandle) -> Result<(), SchedError> {
        let membership = self.registry.get(handle)?.membership();
        match membership {
            Membership::Unlinked => {}
            Membership::Ready(_) => self.ready.remove(&mut self.registry, handle)?,
            Membership::Delayed(_) => self.delayed.remove(&mut self.registry, handle)?,
            Membership::PendingReady => self.gate.remove(&mut self.registry, handle)?,
            Membership::Waiting => {
                self.waiting.remove(&mut self.registry, handle.index());
                self.registry.get_mut(handle)?.membership = Membership::Unlinked;
            }
            Membership::Suspended => {
                self.suspended.remove(&mut self.registry, handle.index());
                self.registry.get_mut(handle)?.membership = Membership::Unlinked;
            }
        }
        Ok(())
    }

    /// The running task just left the CPU: dispatch now, or remember to.
    fn reschedule(&mut self) {
        if self.started && self.gate.is_open() {
            self.request_switch();
        } else {
            self.yield_pending = true;
        }
    }
}
