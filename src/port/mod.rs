//! Architecture seam.
//!
//! The scheduler core never touches hardware. A port hands it three plain
//! function pointers: the context-switch routine and an interrupt
//! mask/restore pair used for the fine-grained critical sections around
//! task-context mutation.

mod cell;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod x86;

pub use cell::KernelCell;

use crate::task::TaskHandle;

/// Performs the actual register/stack swap. Invoked with the outgoing task
/// (if any) and the task the dispatcher picked. Must not re-enter the kernel.
pub type SwitchHook = fn(from: Option<TaskHandle>, to: TaskHandle);

/// Masks scheduler-relevant interrupts, returning the previous mask state.
pub type MaskFn = fn() -> bool;

/// Restores the mask state returned by the matching `MaskFn`.
pub type RestoreFn = fn(bool);

fn no_mask() -> bool {
    false
}

fn no_restore(_: bool) {}

fn no_switch(_: Option<TaskHandle>, _: TaskHandle) {}

/// Hooks supplied once by the port at kernel construction.
#[derive(Clone, Copy)]
pub struct PortHooks {
    pub switch_context: SwitchHook,
    pub mask_interrupts: MaskFn,
    pub restore_interrupts: RestoreFn,
}

impl PortHooks {
    /// Hooks with no interrupt masking, for hosted use and tests.
    pub const fn new(switch_context: SwitchHook) -> Self {
        PortHooks {
            switch_context,
            mask_interrupts: no_mask,
            restore_interrupts: no_restore,
        }
    }

    /// Builder: install the interrupt mask/restore pair.
    pub const fn with_critical(mut self, mask: MaskFn, restore: RestoreFn) -> Self {
        self.mask_interrupts = mask;
        self.restore_interrupts = restore;
        self
    }
}

impl Default for PortHooks {
    fn default() -> Self {
        Self::new(no_switch)
    }
}

impl core::fmt::Debug for PortHooks {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("PortHooks").finish_non_exhaustive()
    }
}

/// Scoped interrupt mask. Restores the saved state on drop, so nesting
/// works the same way `without_interrupts` does.
pub struct CriticalSection {
    restore: RestoreFn,
    saved: bool,
}

impl CriticalSection {
    pub fn enter(hooks: &PortHooks) -> Self {
        CriticalSection {
            restore: hooks.restore_interrupts,
            saved: (hooks.mask_interrupts)(),
        }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        (self.restore)(self.saved);
    }
}
