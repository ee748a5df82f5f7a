//! Two classic concurrency hazards and their fixes, runnable side by side.
//!
//! The counter aggregator shows what happens when a compound update on a
//! shared keyed map (read size then insert, or read count then write back)
//! is not atomic, and what an atomic per-key upsert looks like. The scoped
//! context store shows how a value set on a pooled worker slot leaks into
//! later tasks reusing that slot, and how a guaranteed release on every
//! exit path prevents it.

pub mod counter;
pub mod error;
pub mod report;
pub mod scoped;
pub mod workload;

pub use counter::{count_events, KeyedCount};
pub use error::WorkloadError;
pub use report::{timed, RunReport};
pub use scoped::{Observation, Outcome, TaskSpec, WorkerPool};

/// Which rendition of a subsystem to run. The hazardous variants are the
/// demonstration payload, not bugs to fix: their contract is the absence
/// of the guarantee the correct variants provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Hazardous,
    Correct,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Hazardous => "hazardous",
            Strategy::Correct => "correct",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names() {
        assert_eq!(Strategy::Hazardous.name(), "hazardous");
        assert_eq!(Strategy::Correct.name(), "correct");
    }
}
