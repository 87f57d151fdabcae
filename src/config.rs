//! Scheduler configuration.
//!
//! Compile-time defaults plus a small builder so tests and ports can
//! instantiate independent kernels with different shapes.

use crate::error::SchedError;
use crate::Tick;

/// Default number of priority levels (0 = lowest).
pub const DEFAULT_MAX_PRIORITIES: u8 = 10;

/// Upper bound on priority levels: the ready bitmap is a `u64`.
pub const PRIORITY_LIMIT: u8 = 64;

/// Default registry capacity, idle task included.
pub const DEFAULT_MAX_TASKS: usize = 32;

/// Default timeslice in ticks for equal-priority round robin.
pub const DEFAULT_TIMESLICE: u32 = 1;

/// Priority the idle task always runs at.
pub const IDLE_PRIORITY: u8 = 0;

/// Static scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    pub max_priorities: u8,
    pub max_tasks: usize,
    pub timeslice_ticks: u32,
    /// Rotate equal-priority tasks when their slice expires.
    pub time_slicing: bool,
    /// Let the tick request a switch when a higher priority task wakes.
    pub preemption: bool,
    /// Tick counter value at construction. Handy for exercising wraparound.
    pub initial_tick: Tick,
    pub idle_name: &'static str,
}

impl SchedConfig {
    pub const fn new() -> Self {
        SchedConfig {
            max_priorities: DEFAULT_MAX_PRIORITIES,
            max_tasks: DEFAULT_MAX_TASKS,
            timeslice_ticks: DEFAULT_TIMESLICE,
            time_slicing: true,
            preemption: true,
            initial_tick: 0,
            idle_name: "IDLE",
        }
    }

    pub const fn with_max_priorities(mut self, levels: u8) -> Self {
        self.max_priorities = levels;
        self
    }

    pub const fn with_max_tasks(mut self, tasks: usize) -> Self {
        self.max_tasks = tasks;
        self
    }

    pub const fn with_timeslice(mut self, ticks: u32) -> Self {
        self.timeslice_ticks = ticks;
        self
    }

    pub const fn with_time_slicing(mut self, enabled: bool) -> Self {
        self.time_slicing = enabled;
        self
    }

    pub const fn with_preemption(mut self, enabled: bool) -> Self {
        self.preemption = enabled;
        self
    }

    pub const fn with_initial_tick(mut self, tick: Tick) -> Self {
        self.initial_tick = tick;
        self
    }

    pub fn validate(&self) -> Result<(), SchedError> {
        if self.max_priorities == 0 || self.max_priorities > PRIORITY_LIMIT {
            return Err(SchedError::InvalidConfig);
        }
        if self.max_tasks == 0 || self.max_tasks > u32::MAX as usize {
            return Err(SchedError::InvalidConfig);
        }
        if self.timeslice_ticks == 0 {
            return Err(SchedError::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(SchedConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_levels() {
        let cfg = SchedConfig::new().with_max_priorities(0);
        assert_eq!(cfg.validate(), Err(SchedError::InvalidConfig));
        let cfg = SchedConfig::new().with_max_priorities(PRIORITY_LIMIT + 1);
        assert_eq!(cfg.validate(), Err(SchedError::InvalidConfig));
        let cfg = SchedConfig::new().with_max_priorities(PRIORITY_LIMIT);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_slice_and_capacity() {
        assert!(SchedConfig::new().with_timeslice(0).validate().is_err());
        assert!(SchedConfig::new().with_max_tasks(0).validate().is_err());
    }
}
