//! Task control blocks and handles.
//!
//! A task is an entry point plus scheduling state. The scheduler never runs
//! the entry itself; the port builds the initial stack from it and keeps the
//! saved context word up to date across switches.

pub mod registry;

use crate::Tick;

/// Task entry point, called by the port with the task's argument.
pub type TaskEntry = fn(usize);

/// Opaque task identifier: registry slot plus generation.
///
/// A deleted task's slot may be reused, but the generation moves on, so an
/// outstanding handle to the old task is rejected instead of aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle {
    index: u32,
    generation: u32,
}

impl TaskHandle {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        TaskHandle { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl core::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Task#{}.{}", self.index, self.generation)
    }
}

/// Task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    /// Waiting on a delay or an external event.
    Blocked,
    /// Excluded from scheduling until resumed by handle.
    Suspended,
    Deleted,
}

impl core::fmt::Display for TaskState {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let s = match self {
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Blocked => "blocked",
            TaskState::Suspended => "suspended",
            TaskState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Which of the two delay sub-lists holds a delayed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(pub(crate) u8);

/// The one scheduler list a TCB's link is threaded through.
///
/// Exactly one variant at a time; the running task is `Unlinked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Unlinked,
    Ready(u8),
    Delayed(Epoch),
    /// Blocked with no timeout.
    Waiting,
    Suspended,
    /// Made ready while the scheduler was suspended.
    PendingReady,
}

bitflags::bitflags! {
    /// Per-task flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u8 {
        /// The always-ready idle task. Never deleted or suspended.
        const IDLE          = 0b0000_0001;
        /// Last unblock came from `abort_delay`.
        const DELAY_ABORTED = 0b0000_0010;
        /// Last unblock came from the tick, not an event.
        const TIMED_OUT     = 0b0000_0100;
    }
}

/// Task Control Block.
#[derive(Debug, Clone)]
pub struct Tcb {
    pub(crate) handle: TaskHandle,
    pub(crate) name: &'static str,
    pub(crate) entry: TaskEntry,
    pub(crate) arg: usize,
    pub(crate) priority: u8,
    pub(crate) state: TaskState,
    pub(crate) membership: Membership,
    /// Owned by the port (saved stack pointer or similar).
    pub(crate) context: usize,
    /// Valid only while `membership` is `Delayed`.
    pub(crate) wake_tick: Tick,
    pub(crate) flags: TaskFlags,
    /// Ticks that landed while this task held the CPU. Wraps.
    pub(crate) run_ticks: u32,
}

impl Tcb {
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entry(&self) -> TaskEntry {
        self.entry
    }

    pub fn arg(&self) -> usize {
        self.arg
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    pub fn context(&self) -> usize {
        self.context
    }

    /// Wake tick, if the task is on a delay list.
    pub fn wake_tick(&self) -> Option<Tick> {
        match self.membership {
            Membership::Delayed(_) => Some(self.wake_tick),
            _ => None,
        }
    }

    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    pub fn run_ticks(&self) -> u32 {
        self.run_ticks
    }

    pub fn is_idle(&self) -> bool {
        self.flags.contains(TaskFlags::IDLE)
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            handle: self.handle,
            name: self.name,
            priority: self.priority,
            state: self.state,
            wake_tick: self.wake_tick(),
            run_ticks: self.run_ticks,
        }
    }
}

/// Snapshot of one task, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStatus {
    pub handle: TaskHandle,
    pub name: &'static str,
    pub priority: u8,
    pub state: TaskState,
    pub wake_tick: Option<Tick>,
    pub run_ticks: u32,
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{} {} prio={} {}", self.handle, self.name, self.priority, self.state)?;
        if let Some(t) = self.wake_tick {
            write!(f, " wake@{}", t)?;
        }
        write!(f, " ran={}", self.run_ticks)
    }
}
