//! Driver for the scoped context store: pooled-slot value leakage and the
//! guaranteed-release fix, on the same pool shape.
//!
//! Run with: cargo run --release --bin scoped_demo

use colored::Colorize;
use concurrency_pitfalls::{timed, workload, RunReport, Strategy, TaskSpec, WorkerPool};

const POOL_SLOTS: usize = 2;
const TASK_COUNT: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for strategy in [Strategy::Hazardous, Strategy::Correct] {
        println!(
            "{}",
            format!("=== Scoped context, {} strategy ===", strategy.name()).bold()
        );

        let pool = WorkerPool::new(POOL_SLOTS)?;
        let mut tasks: Vec<TaskSpec> = workload::identities(TASK_COUNT)
            .into_iter()
            .map(TaskSpec::new)
            .collect();
        // One task terminates abnormally mid-batch.
        tasks[2].fault = true;

        let (result, elapsed) = timed(|| pool.run(tasks, strategy));
        let observations = result?;

        let mut leaks = 0u64;
        for observation in &observations {
            let line = format!(
                "task {:>7} on slot {}: before = {:?}, after = {:?} ({:?})",
                observation.identity,
                observation.slot,
                observation.before,
                observation.after,
                observation.outcome
            );
            if observation.before.is_some() {
                leaks += 1;
                println!("{}", line.yellow());
            } else {
                println!("{}", line);
            }
        }
        println!("leaked before-reads: {}", leaks);

        let report = RunReport::new("scoped-context", strategy, elapsed, leaks);
        println!("{}", report.to_json()?);
        println!();
    }

    Ok(())
}
