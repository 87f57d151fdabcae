//! ParyantaOS real-time scheduler core.
//!
//! Preemptive, priority-based task scheduling for a single processor:
//! - Task registry with generation-checked handles
//! - Per-priority ready queues with round-robin timeslicing
//! - Wrap-safe delay list driven by the periodic tick
//! - Nested scheduler suspension that defers, never drops, wake-ups
//!
//! The physical context switch, interrupt masking and tick source belong to
//! the port (see [`port`]).

#![cfg_attr(not(test), no_std)]
#![cfg_attr(
    all(target_arch = "x86_64", target_os = "none"),
    feature(abi_x86_interrupt)
)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod list;
pub mod port;
pub mod sched;
pub mod task;

/// The scheduler's unit of time. Wraps.
pub type Tick = u32;

/// Block with no timeout.
pub const WAIT_FOREVER: Tick = Tick::MAX;

pub use config::SchedConfig;
pub use error::SchedError;
pub use port::{KernelCell, PortHooks};
pub use sched::tick::TimeOut;
pub use sched::Kernel;
pub use task::registry::TaskParams;
pub use task::{Membership, TaskFlags, TaskHandle, TaskState, TaskStatus};
