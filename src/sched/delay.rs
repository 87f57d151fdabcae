//! Delay list: time-ordered wake scheduling across tick wraparound.
//!
//! Two wake-ordered sub-lists. A wake tick computed as `now + delay` that
//! came out numerically below `now` has wrapped, so it waits in the overflow
//! sub-list until the tick counter itself wraps and the two swap roles.
//! Entries are tagged with the index of the sub-list that holds them, so a
//! swap never touches a TCB.

use alloc::vec::Vec;

use crate::error::SchedError;
use crate::list::List;
use crate::task::registry::Registry;
use crate::task::{Epoch, Membership, TaskHandle, TaskState};
use crate::Tick;

pub struct DelayList {
    lists: [List; 2],
    /// Index of the current-epoch sub-list; the other is overflow.
    current: u8,
}

fn wake_key(reg: &Registry, idx: u32) -> Tick {
    reg.at(idx).map_or(Tick::MAX, |t| t.wake_tick)
}

impl DelayList {
    pub const fn new() -> Self {
        DelayList { lists: [List::new(), List::new()], current: 0 }
    }

    fn overflow(&self) -> u8 {
        self.current ^ 1
    }

    /// Block `handle` until `wake_tick`, relative to the counter value `now`.
    pub fn add(
        &mut self,
        reg: &mut Registry,
        handle: TaskHandle,
        wake_tick: Tick,
        now: Tick,
    ) -> Result<(), SchedError> {
        let epoch = if wake_tick < now { self.overflow() } else { self.current };
        let tcb = reg.get_mut(handle)?;
        if tcb.membership != Membership::Unlinked {
            return Err(SchedError::InvalidState);
        }
        tcb.state = TaskState::Blocked;
        tcb.membership = Membership::Delayed(Epoch(epoch));
        tcb.wake_tick = wake_tick;
        self.lists[epoch as usize].insert_sorted(reg, handle.index(), wake_key);
        Ok(())
    }

    /// Take a task off whichever sub-list holds it (early wake or delete).
    pub fn remove(&mut self, reg: &mut Registry, handle: TaskHandle) -> Result<(), SchedError> {
        let tcb = reg.get_mut(handle)?;
        let Membership::Delayed(Epoch(e)) = tcb.membership else {
            return Err(SchedError::InvalidState);
        };
        tcb.membership = Membership::Unlinked;
        self.lists[e as usize].remove(reg, handle.index());
        Ok(())
    }

    /// Pop every current-epoch entry with `wake_tick <= now`, earliest first.
    ///
    /// Drained tasks are unlinked but still Blocked; the caller decides
    /// where they go next.
    pub fn drain_due(&mut self, reg: &mut Registry, now: Tick) -> Vec<TaskHandle> {
        let mut due = Vec::new();
        let list = &mut self.lists[self.current as usize];
        while let Some(idx) = list.head() {
            if wake_key(reg, idx) > now {
                break;
            }
            list.remove(reg, idx);
            if let Some(tcb) = reg.at_mut(idx) {
                tcb.membership = Membership::Unlinked;
                due.push(tcb.handle());
            }
        }
        due
    }

    /// Promote the overflow sub-list. Called when the tick counter wraps.
    pub fn switch_epoch(&mut self) {
        debug_assert!(self.lists[self.current as usize].is_empty());
        self.current = self.overflow();
    }

    /// Earliest wake tick in the current epoch.
    pub fn next_wake(&self, reg: &Registry) -> Option<Tick> {
        self.lists[self.current as usize]
            .head()
            .map(|idx| wake_key(reg, idx))
    }

    pub fn current_len(&self) -> usize {
        self.lists[self.current as usize].len()
    }

    pub fn overflow_len(&self) -> usize {
        self.lists[self.overflow() as usize].len()
    }

    pub fn len(&self) -> usize {
        self.current_len() + self.overflow_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DelayList {
    fn default() -> Self {
        Self::new()
    }
}
