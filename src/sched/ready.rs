//! Ready-queue set: one FIFO per priority level plus a bitmap of non-empty
//! levels, so "what runs next" is a leading-zeros count and a list head.

use alloc::vec::Vec;

use crate::error::SchedError;
use crate::list::List;
use crate::task::registry::Registry;
use crate::task::{Membership, TaskHandle, TaskState};

pub struct ReadySet {
    levels: Vec<List>,
    /// Bit `p` set while level `p` is non-empty.
    top: u64,
}

impl ReadySet {
    pub fn new(levels: u8) -> Self {
        ReadySet {
            levels: (0..levels).map(|_| List::new()).collect(),
            top: 0,
        }
    }

    /// Append to the tail of the task's priority level and mark it Ready.
    pub fn insert(&mut self, reg: &mut Registry, handle: TaskHandle) -> Result<(), SchedError> {
        let prio = Self::enter(reg, handle)?;
        self.levels[prio as usize].push_back(reg, handle.index());
        self.top |= 1u64 << prio;
        Ok(())
    }

    /// Put a preempted task back at the head of its level so it keeps its
    /// place ahead of peers that have not run yet.
    pub fn insert_front(&mut self, reg: &mut Registry, handle: TaskHandle) -> Result<(), SchedError> {
        let prio = Self::enter(reg, handle)?;
        self.levels[prio as usize].push_front(reg, handle.index());
        self.top |= 1u64 << prio;
        Ok(())
    }

    pub fn remove(&mut self, reg: &mut Registry, handle: TaskHandle) -> Result<(), SchedError> {
        let tcb = reg.get_mut(handle)?;
        let Membership::Ready(prio) = tcb.membership else {
            return Err(SchedError::InvalidState);
        };
        tcb.membership = Membership::Unlinked;
        let level = &mut self.levels[prio as usize];
        level.remove(reg, handle.index());
        if level.is_empty() {
            self.top &= !(1u64 << prio);
        }
        Ok(())
    }

    /// Highest non-empty priority level.
    pub fn highest_priority(&self) -> Option<u8> {
        if self.top == 0 {
            None
        } else {
            Some((63 - self.top.leading_zeros()) as u8)
        }
    }

    /// Head of the highest non-empty level, `None` when nothing is ready.
    pub fn peek_highest(&self, reg: &Registry) -> Option<TaskHandle> {
        let prio = self.highest_priority()?;
        let idx = self.levels[prio as usize].head()?;
        reg.at(idx).map(|t| t.handle())
    }

    pub fn pop_highest(&mut self, reg: &mut Registry) -> Option<TaskHandle> {
        let handle = self.peek_highest(reg)?;
        self.remove(reg, handle).ok()?;
        Some(handle)
    }

    pub fn len_at(&self, prio: u8) -> usize {
        self.levels.get(prio as usize).map_or(0, |l| l.len())
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(|l| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    /// Handles queued at one level, head first.
    pub fn level(&self, reg: &Registry, prio: u8) -> Vec<TaskHandle> {
        match self.levels.get(prio as usize) {
            Some(l) => l.iter(reg).filter_map(|i| reg.at(i)).map(|t| t.handle()).collect(),
            None => Vec::new(),
        }
    }

    fn enter(reg: &mut Registry, handle: TaskHandle) -> Result<u8, SchedError> {
        let tcb = reg.get_mut(handle)?;
        if tcb.membership != Membership::Unlinked {
            return Err(SchedError::InvalidState);
        }
        tcb.state = TaskState::Ready;
        tcb.membership = Membership::Ready(tcb.priority);
        Ok(tcb.priority)
    }
}
