//! Shared kernel slot for ports.
//!
//! The core takes its context explicitly, but an interrupt handler has no
//! way to receive arguments, so a port parks its one `Kernel` here. Task
//! code locks normally; the tick handler only ever `try_lock`s. A tick that
//! finds the lock taken is counted and replayed by whoever holds it, so no
//! wake-up is lost.

use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

use crate::sched::Kernel;
use crate::task::TaskHandle;

pub struct KernelCell {
    inner: Mutex<Option<Kernel>>,
    missed_ticks: AtomicU32,
}

impl KernelCell {
    pub const fn new() -> Self {
        KernelCell {
            inner: Mutex::new(None),
            missed_ticks: AtomicU32::new(0),
        }
    }

    /// Install the kernel, returning any previous one.
    pub fn install(&self, kernel: Kernel) -> Option<Kernel> {
        self.inner.lock().replace(kernel)
    }

    pub fn take(&self) -> Option<Kernel> {
        self.inner.lock().take()
    }

    /// Run `f` from task context. Ticks missed while the lock was held are
    /// applied before it is released.
    pub fn with<R>(&self, f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
        let mut guard = self.inner.lock();
        let kernel = guard.as_mut()?;
        let r = f(kernel);
        self.replay_missed(kernel);
        Some(r)
    }

    /// Run `f` only if nobody holds the kernel. Safe from interrupt context.
    pub fn try_with<R>(&self, f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
        let mut guard = self.inner.try_lock()?;
        let kernel = guard.as_mut()?;
        Some(f(kernel))
    }

    /// Tick entry for the timer interrupt. Returns whether a switch should
    /// be requested in the interrupt epilogue.
    pub fn tick_from_isr(&self) -> bool {
        match self.inner.try_lock() {
            Some(mut guard) => match guard.as_mut() {
                Some(kernel) => self.advance(kernel),
                None => false,
            },
            None => {
                self.missed_ticks.fetch_add(1, Ordering::AcqRel);
                false
            }
        }
    }

    /// Timer interrupt entry: tick, and if that calls for it, switch.
    ///
    /// The switch hook runs after the lock is released, so the task it
    /// leaves behind does not keep the kernel locked.
    pub fn tick_and_dispatch(&self) -> Option<(Option<TaskHandle>, TaskHandle)> {
        let (switch, hook) = {
            let Some(mut guard) = self.inner.try_lock() else {
                self.missed_ticks.fetch_add(1, Ordering::AcqRel);
                return None;
            };
            let kernel = guard.as_mut()?;
            if !self.advance(kernel) {
                return None;
            }
            (kernel.prepare_switch()?, kernel.switch_hook())
        };
        hook(switch.0, switch.1);
        Some(switch)
    }

    /// Task-context dispatch. Same as `Kernel::request_switch`, with the
    /// hook called outside the lock. Code running under [`with`](Self::with)
    /// should return and call this rather than switching in place.
    pub fn dispatch(&self) -> Option<TaskHandle> {
        let ((prev, next), hook) = {
            let mut guard = self.inner.lock();
            let kernel = guard.as_mut()?;
            self.replay_missed(kernel);
            (kernel.prepare_switch()?, kernel.switch_hook())
        };
        hook(prev, next);
        Some(next)
    }

    pub fn missed_ticks(&self) -> u32 {
        self.missed_ticks.load(Ordering::Acquire)
    }

    /// One tick plus any that were missed before it.
    fn advance(&self, kernel: &mut Kernel) -> bool {
        let missed = self.missed_ticks.swap(0, Ordering::AcqRel);
        kernel.catch_up(missed) | kernel.on_tick()
    }

    fn replay_missed(&self, kernel: &mut Kernel) {
        let missed = self.missed_ticks.swap(0, Ordering::AcqRel);
        if missed > 0 && kernel.catch_up(missed) {
            kernel.note_yield();
        }
    }
}

impl Default for KernelCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedConfig;
    use crate::port::PortHooks;
    use crate::task::registry::TaskParams;
    use core::sync::atomic::AtomicBool;

    static CELL: KernelCell = KernelCell::new();
    static HOOK_CALLS: AtomicU32 = AtomicU32::new(0);
    static HOOK_SAW_LOCK: AtomicBool = AtomicBool::new(false);

    fn checking_hook(_: Option<TaskHandle>, _: TaskHandle) {
        HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
        if CELL.inner.try_lock().is_none() {
            HOOK_SAW_LOCK.store(true, Ordering::SeqCst);
        }
    }

    fn noop(_: usize) {}

    fn kernel() -> Kernel {
        Kernel::new(SchedConfig::new(), PortHooks::default()).unwrap()
    }

    #[test]
    fn empty_cell_ignores_ticks() {
        let cell = KernelCell::new();
        assert!(!cell.tick_from_isr());
        assert_eq!(cell.with(|k| k.tick_count()), None);
    }

    #[test]
    fn tick_while_locked_is_replayed() {
        let cell = KernelCell::new();
        cell.install(kernel());

        let seen = cell.with(|k| {
            // Task code holds the lock; the interrupt arrives now.
            assert!(!cell.tick_from_isr());
            k.tick_count()
        });
        assert_eq!(seen, Some(0));
        assert_eq!(cell.missed_ticks(), 0);
        assert_eq!(cell.with(|k| k.tick_count()), Some(1));
    }

    #[test]
    fn isr_tick_advances() {
        let cell = KernelCell::new();
        cell.install(kernel());
        cell.tick_from_isr();
        cell.tick_from_isr();
        assert_eq!(cell.try_with(|k| k.tick_count()), Some(2));
        assert!(cell.take().is_some());
        assert!(cell.take().is_none());
    }

    #[test]
    fn switch_hook_runs_without_the_lock() {
        let mut k = Kernel::new(SchedConfig::new(), PortHooks::new(checking_hook)).unwrap();
        let idle = k.start(noop).unwrap();
        let t = k.create(TaskParams::new("sleeper", noop, 2)).unwrap();
        k.request_switch();
        k.delay(1).unwrap();
        CELL.install(k);

        assert_eq!(CELL.tick_and_dispatch(), Some((Some(idle), t)));
        assert_eq!(CELL.with(|k| k.block(t, 1)), Some(Ok(())));
        assert_eq!(CELL.dispatch(), Some(idle));

        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 5);
        assert!(!HOOK_SAW_LOCK.load(Ordering::SeqCst));
        assert!(CELL.take().is_some());
    }
}
