//! Suspension gate for scheduler-level suspend/resume.
//!
//! While the nesting counter is non-zero the ready set is frozen: anything
//! that would become ready is parked on the pending list instead, and the
//! tick keeps running. Reaching zero again drains the pending list into the
//! ready set in arrival order.

use alloc::vec::Vec;
use log::{trace, warn};

use super::Kernel;
use crate::error::SchedError;
use crate::list::List;
use crate::task::registry::Registry;
use crate::task::{Membership, TaskHandle, TaskState};

pub struct SuspensionGate {
    depth: u32,
    pending: List,
}

impl SuspensionGate {
    pub const fn new() -> Self {
        SuspensionGate { depth: 0, pending: List::new() }
    }

    pub fn suspend(&mut self) {
        self.depth = self.depth.saturating_add(1);
    }

    /// Drop one nesting level. `Ok(true)` means the gate just opened and
    /// the pending list must be drained.
    pub fn release(&mut self) -> Result<bool, SchedError> {
        if self.depth == 0 {
            return Err(SchedError::SuspensionUnderflow);
        }
        self.depth -= 1;
        Ok(self.depth == 0)
    }

    pub fn is_open(&self) -> bool {
        self.depth == 0
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Record a task made ready while the gate is closed.
    pub fn defer(&mut self, reg: &mut Registry, handle: TaskHandle) -> Result<(), SchedError> {
        let tcb = reg.get_mut(handle)?;
        if tcb.membership != Membership::Unlinked {
            return Err(SchedError::InvalidState);
        }
        tcb.state = TaskState::Ready;
        tcb.membership = Membership::PendingReady;
        self.pending.push_back(reg, handle.index());
        Ok(())
    }

    /// Drop a pending entry (task deleted or suspended before the drain).
    pub fn remove(&mut self, reg: &mut Registry, handle: TaskHandle) -> Result<(), SchedError> {
        let tcb = reg.get_mut(handle)?;
        if tcb.membership != Membership::PendingReady {
            return Err(SchedError::InvalidState);
        }
        tcb.membership = Membership::Unlinked;
        self.pending.remove(reg, handle.index());
        Ok(())
    }

    /// Unlink every pending entry, oldest first.
    pub fn take_pending(&mut self, reg: &mut Registry) -> Vec<TaskHandle> {
        debug_assert!(self.is_open());
        let mut out = Vec::with_capacity(self.pending.len());
        while let Some(idx) = self.pending.pop_front(reg) {
            if let Some(tcb) = reg.at_mut(idx) {
                tcb.membership = Membership::Unlinked;
                out.push(tcb.handle());
            }
        }
        out
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for SuspensionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Suspend scheduling. Nests to any depth; interrupts stay enabled.
    pub fn suspend_all(&mut self) {
        self.gate.suspend();
        trace!("[SCHED] suspend_all depth={}", self.gate.depth());
    }

    /// Undo one `suspend_all`.
    ///
    /// Returns true when this call reopened the gate and the drain (or a
    /// switch deferred while suspended) means the dispatcher should run.
    /// An unmatched call is logged and ignored.
    pub fn resume_all(&mut self) -> bool {
        self.critical(|k| {
            match k.gate.release() {
                Err(e) => {
                    warn!("[SCHED] resume_all ignored: {}", e);
                    return false;
                }
                Ok(false) => return false,
                Ok(true) => {}
            }

            let running = k.running_priority();
            let mut switch = k.yield_pending;
            let drained = k.gate.take_pending(&mut k.registry);
            for &h in &drained {
                if let Err(e) = k.ready.insert(&mut k.registry, h) {
                    warn!("[SCHED] resume_all could not ready {}: {}", h, e);
                    continue;
                }
                let prio = k.registry.get(h).map_or(0, |t| t.priority());
                if running.map_or(true, |p| prio >= p) {
                    switch = true;
                }
            }
            trace!("[SCHED] resume_all drained {} switch={}", drained.len(), switch);
            k.yield_pending = switch;
            switch
        })
    }

    pub fn suspension_depth(&self) -> u32 {
        self.gate.depth()
    }

    pub fn pending_len(&self) -> usize {
        self.gate.pending_len()
    }
}
