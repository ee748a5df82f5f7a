//! Per-slot context storage on a reused worker pool.
//!
//! A pool owns a fixed array of slot cells, one per worker. Logical tasks
//! are assigned to slots round-robin and each task reads the slot's value,
//! sets it to its own identity, and reads it again. The hazardous strategy
//! never clears the cell, so a later task scheduled onto the same slot
//! observes the previous occupant's identity. The correct strategy arms a
//! reset that runs on every exit path out of the task, normal completion
//! and fault alike, so the slot always reads empty at the next task start.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::error::{panic_message, WorkloadError};
use crate::Strategy;

/// One worker slot's storage cell. `None` is the empty state; there is no
/// sentinel identity.
type SlotCell = Mutex<Option<String>>;

/// A fixed-size pool of worker slots. Cells are allocated once here and
/// live as long as the pool, which is what makes reuse across tasks (and
/// across whole `run` calls) observable.
pub struct WorkerPool {
    slots: Vec<Arc<SlotCell>>,
}

/// A logical unit of work: the identity it stores in its slot, plus an
/// optional injected fault that terminates the task abnormally after the
/// value has been set.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub identity: String,
    pub fault: bool,
}

impl TaskSpec {
    pub fn new(identity: impl Into<String>) -> Self {
        TaskSpec {
            identity: identity.into(),
            fault: false,
        }
    }

    pub fn faulting(identity: impl Into<String>) -> Self {
        TaskSpec {
            identity: identity.into(),
            fault: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Faulted,
}

/// What one task saw: the slot it ran on, the cell value before it set its
/// own identity, the value right after, and how the task ended.
#[derive(Debug, Clone)]
pub struct Observation {
    pub identity: String,
    pub slot: usize,
    pub before: Option<String>,
    pub after: Option<String>,
    pub outcome: Outcome,
}

/// Scoped acquisition with guaranteed release: dropping the guard is the
/// `Set -> Empty` transition, and drop runs on unwind as well as on normal
/// return.
struct SlotGuard<'a> {
    cell: &'a SlotCell,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *lock_cell(self.cell) = None;
    }
}

// A poisoned cell still holds its leftover value; take it either way.
fn lock_cell(cell: &SlotCell) -> MutexGuard<'_, Option<String>> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WorkerPool {
    pub fn new(slot_count: usize) -> Result<Self, WorkloadError> {
        if slot_count == 0 {
            return Err(WorkloadError::InvalidConcurrency(slot_count));
        }
        let slots = (0..slot_count).map(|_| Arc::new(Mutex::new(None))).collect();
        Ok(WorkerPool { slots })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The value currently sitting in a slot, if any. Lets drivers and
    /// tests inspect what a run left behind.
    pub fn slot_value(&self, slot: usize) -> Option<String> {
        self.slots.get(slot).and_then(|cell| lock_cell(cell).clone())
    }

    /// Execute `tasks` on the pool. Task `i` runs on slot `i % slot_count`,
    /// so which tasks share a slot is fixed up front rather than scheduler
    /// luck. Tasks sharing a slot run strictly in order; tasks on distinct
    /// slots run in parallel. Observations come back in task order.
    ///
    /// An injected fault is contained to its task: the worker records
    /// [`Outcome::Faulted`] and moves on to the rest of its queue. Only a
    /// worker dying outside a task body turns into an error.
    pub fn run(
        &self,
        tasks: Vec<TaskSpec>,
        strategy: Strategy,
    ) -> Result<Vec<Observation>, WorkloadError> {
        let mut queues: Vec<Vec<(usize, TaskSpec)>> = vec![Vec::new(); self.slots.len()];
        for (index, task) in tasks.into_iter().enumerate() {
            queues[index % self.slots.len()].push((index, task));
        }

        let mut handles = Vec::new();
        for (slot, queue) in queues.into_iter().enumerate() {
            let cell = Arc::clone(&self.slots[slot]);
            handles.push(thread::spawn(move || {
                queue
                    .into_iter()
                    .map(|(index, task)| (index, execute(&cell, slot, task, strategy)))
                    .collect::<Vec<_>>()
            }));
        }

        let mut indexed = Vec::new();
        for handle in handles {
            let worker = handle
                .join()
                .map_err(|payload| WorkloadError::TaskFailure(panic_message(payload)))?;
            indexed.extend(worker);
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, observation)| observation).collect())
    }
}

/// The read / set / read protocol for a single task on its assigned slot.
fn execute(cell: &SlotCell, slot: usize, task: TaskSpec, strategy: Strategy) -> Observation {
    let mut before = None;
    let mut after = None;
    let body = panic::catch_unwind(AssertUnwindSafe(|| {
        before = lock_cell(cell).clone();

        // Armed before the value goes in, dropped when the task leaves,
        // including by unwinding from the injected fault below.
        let _release = match strategy {
            Strategy::Correct => Some(SlotGuard { cell }),
            Strategy::Hazardous => None,
        };

        *lock_cell(cell) = Some(task.identity.clone());
        after = lock_cell(cell).clone();

        if task.fault {
            panic!("injected fault in task {}", task.identity);
        }
    }));

    Observation {
        identity: task.identity,
        slot,
        before,
        after,
        outcome: if body.is_ok() {
            Outcome::Completed
        } else {
            Outcome::Faulted
        },
    }
}
