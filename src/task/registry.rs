//! Task Control Block registry, the only owner of TCBs.
//!
//! Fixed-capacity slot arena. Every other component refers to tasks by
//! handle or slot index and goes through here to read or mutate them.

use alloc::vec::Vec;

use super::{Membership, TaskEntry, TaskFlags, TaskHandle, TaskState, Tcb};
use crate::error::SchedError;
use crate::list::{Link, Linked};

struct Slot {
    generation: u32,
    link: Link,
    tcb: Option<Tcb>,
}

/// Parameters for a new task.
#[derive(Debug, Clone, Copy)]
pub struct TaskParams {
    pub name: &'static str,
    pub entry: TaskEntry,
    pub arg: usize,
    pub priority: u8,
    /// `Ready` or `Suspended`.
    pub initial_state: TaskState,
}

impl TaskParams {
    pub fn new(name: &'static str, entry: TaskEntry, priority: u8) -> Self {
        TaskParams {
            name,
            entry,
            arg: 0,
            priority,
            initial_state: TaskState::Ready,
        }
    }

    /// Builder: argument passed to the entry point.
    pub fn with_arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    /// Builder: register the task already suspended.
    pub fn suspended(mut self) -> Self {
        self.initial_state = TaskState::Suspended;
        self
    }
}

pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    capacity: usize,
    max_priorities: u8,
}

impl Registry {
    pub fn new(capacity: usize, max_priorities: u8) -> Self {
        Registry {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
            capacity,
            max_priorities,
        }
    }

    /// Register a task. The caller links it into the matching list.
    pub fn create(&mut self, params: TaskParams, flags: TaskFlags) -> Result<TaskHandle, SchedError> {
        if params.priority >= self.max_priorities {
            return Err(SchedError::InvalidPriority);
        }
        if !matches!(params.initial_state, TaskState::Ready | TaskState::Suspended) {
            return Err(SchedError::InvalidState);
        }

        let index = match self.free.pop() {
            Some(i) => i,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Slot { generation: 0, link: Link::default(), tcb: None });
                (self.slots.len() - 1) as u32
            }
            None => return Err(SchedError::RegistryFull),
        };

        let slot = &mut self.slots[index as usize];
        let handle = TaskHandle::new(index, slot.generation);
        slot.link = Link::default();
        slot.tcb = Some(Tcb {
            handle,
            name: params.name,
            entry: params.entry,
            arg: params.arg,
            priority: params.priority,
            state: params.initial_state,
            membership: Membership::Unlinked,
            context: 0,
            wake_tick: 0,
            flags,
            run_ticks: 0,
        });
        self.live += 1;
        Ok(handle)
    }

    /// Retire a task. It must already be unlinked from every list.
    pub fn delete(&mut self, handle: TaskHandle) -> Result<Tcb, SchedError> {
        let slot = self.slot_mut(handle)?;
        let mut tcb = slot.tcb.take().ok_or(SchedError::UnknownHandle)?;
        debug_assert_eq!(tcb.membership, Membership::Unlinked);
        slot.generation = slot.generation.wrapping_add(1);
        slot.link = Link::default();
        tcb.state = TaskState::Deleted;
        self.free.push(handle.index());
        self.live -= 1;
        Ok(tcb)
    }

    pub fn get(&self, handle: TaskHandle) -> Result<&Tcb, SchedError> {
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.tcb.as_ref())
            .ok_or(SchedError::UnknownHandle)
    }

    pub(crate) fn get_mut(&mut self, handle: TaskHandle) -> Result<&mut Tcb, SchedError> {
        self.slot_mut(handle)?.tcb.as_mut().ok_or(SchedError::UnknownHandle)
    }

    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// Live TCB at a slot index taken from a scheduler list.
    pub(crate) fn at(&self, idx: u32) -> Option<&Tcb> {
        self.slots.get(idx as usize).and_then(|s| s.tcb.as_ref())
    }

    pub(crate) fn at_mut(&mut self, idx: u32) -> Option<&mut Tcb> {
        self.slots.get_mut(idx as usize).and_then(|s| s.tcb.as_mut())
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_priorities(&self) -> u8 {
        self.max_priorities
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tcb> {
        self.slots.iter().filter_map(|s| s.tcb.as_ref())
    }

    pub fn find_by_name(&self, name: &str) -> Option<TaskHandle> {
        self.iter().find(|t| t.name == name).map(|t| t.handle)
    }

    fn slot_mut(&mut self, handle: TaskHandle) -> Result<&mut Slot, SchedError> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
            .ok_or(SchedError::UnknownHandle)
    }
}

impl Linked for Registry {
    fn link(&self, idx: u32) -> Link {
        self.slots.get(idx as usize).map_or(Link::default(), |s| s.link)
    }

    fn set_link(&mut self, idx: u32, link: Link) {
        if let Some(s) = self.slots.get_mut(idx as usize) {
            s.link = link;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: usize) {}

    #[test]
    fn create_rejects_bad_priority() {
        let mut reg = Registry::new(4, 3);
        let err = reg.create(TaskParams::new("t", noop, 3), TaskFlags::empty());
        assert_eq!(err, Err(SchedError::InvalidPriority));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn create_rejects_blocked_initial_state() {
        let mut reg = Registry::new(4, 3);
        let mut params = TaskParams::new("t", noop, 1);
        params.initial_state = TaskState::Blocked;
        assert_eq!(reg.create(params, TaskFlags::empty()), Err(SchedError::InvalidState));
    }

    #[test]
    fn full_registry() {
        let mut reg = Registry::new(1, 3);
        reg.create(TaskParams::new("a", noop, 1), TaskFlags::empty()).unwrap();
        let err = reg.create(TaskParams::new("b", noop, 1), TaskFlags::empty());
        assert_eq!(err, Err(SchedError::RegistryFull));
    }

    #[test]
    fn stale_handle_rejected_after_reuse() {
        let mut reg = Registry::new(1, 3);
        let old = reg.create(TaskParams::new("a", noop, 1), TaskFlags::empty()).unwrap();
        let tcb = reg.delete(old).unwrap();
        assert_eq!(tcb.state(), TaskState::Deleted);

        let new = reg.create(TaskParams::new("b", noop, 2), TaskFlags::empty()).unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert_eq!(reg.get(old).err(), Some(SchedError::UnknownHandle));
        assert_eq!(reg.delete(old).err(), Some(SchedError::UnknownHandle));
        assert_eq!(reg.get(new).unwrap().name(), "b");
    }

    #[test]
    fn lookup_by_name() {
        let mut reg = Registry::new(4, 3);
        let a = reg.create(TaskParams::new("alpha", noop, 1), TaskFlags::empty()).unwrap();
        reg.create(TaskParams::new("beta", noop, 1).suspended(), TaskFlags::empty()).unwrap();
        assert_eq!(reg.find_by_name("alpha"), Some(a));
        assert_eq!(reg.find_by_name("gamma"), None);
        assert_eq!(reg.len(), 2);
    }
}
