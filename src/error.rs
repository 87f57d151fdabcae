//! Scheduler errors.
//!
//! Everything except `SchedulerExhausted` is recoverable and reported to the
//! caller synchronously. Nothing here crosses the interrupt boundary:
//! `on_tick` has no failure mode.

/// Scheduler operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Requested priority is not below the configured number of levels.
    InvalidPriority,
    /// Handle is stale or never referred to a live task.
    UnknownHandle,
    /// `resume_all` without a matching `suspend_all`. Tolerated, never fatal.
    SuspensionUnderflow,
    /// No task (not even idle) is ready to run.
    SchedulerExhausted,
    /// Every registry slot holds a live task.
    RegistryFull,
    /// Configuration rejected by `SchedConfig::validate`.
    InvalidConfig,
    /// The running task tried to block while the scheduler is suspended.
    SchedulerSuspended,
    /// Transition not allowed from the task's current state.
    InvalidState,
}

impl SchedError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPriority => "invalid priority",
            Self::UnknownHandle => "unknown task handle",
            Self::SuspensionUnderflow => "resume without matching suspend",
            Self::SchedulerExhausted => "no ready task to dispatch",
            Self::RegistryFull => "task registry full",
            Self::InvalidConfig => "invalid scheduler configuration",
            Self::SchedulerSuspended => "scheduler suspended",
            Self::InvalidState => "invalid task state for operation",
        }
    }

    /// Only exhaustion halts the system.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SchedulerExhausted)
    }
}

impl core::fmt::Display for SchedError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
