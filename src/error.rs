//! Failure taxonomy shared by both demonstration subsystems.
//!
//! Input problems are rejected synchronously, before any worker is
//! spawned. Races in the hazardous variants are not errors: lost updates,
//! overshoot and stale reads are the documented behavior being shown.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("target size {target} is below the current {current} entries")]
    InvalidTarget { target: usize, current: usize },

    #[error("concurrency degree must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("key universe must hold at least one key")]
    EmptyUniverse,

    /// A worker died outside a contained task body. Contained, per-task
    /// faults are reported as data on the run's observations instead.
    #[error("worker task panicked: {0}")]
    TaskFailure(String),

    #[error("failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),
}

/// Best-effort text of a panic payload, for `TaskFailure` messages.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_inputs() {
        let err = WorkloadError::InvalidTarget {
            target: 500,
            current: 900,
        };
        assert_eq!(
            err.to_string(),
            "target size 500 is below the current 900 entries"
        );

        let err = WorkloadError::InvalidConcurrency(0);
        assert_eq!(err.to_string(), "concurrency degree must be at least 1, got 0");
    }
}
