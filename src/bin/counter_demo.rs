//! Driver for the concurrent counter aggregator: gap-filling and event
//! counting, each under the hazardous and the correct strategy.
//!
//! Run with: cargo run --release --bin counter_demo

use colored::Colorize;
use concurrency_pitfalls::{count_events, timed, KeyedCount, RunReport, Strategy};

const SEED_SIZE: usize = 900;
const TARGET_SIZE: usize = 1000;
const FILL_DEGREE: usize = 10;
const KEY_UNIVERSE: usize = 10;
const TOTAL_EVENTS: u64 = 1_000_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let count_degree = num_cpus::get().max(4);

    println!("{}", "=== Gap-filling a shared keyed map ===".bold());
    for strategy in [Strategy::Hazardous, Strategy::Correct] {
        let counts = KeyedCount::seed(SEED_SIZE);
        println!("[{}] init size: {}", strategy.name(), counts.len());

        let (result, elapsed) = timed(|| counts.fill(TARGET_SIZE, FILL_DEGREE, strategy));
        result?;

        let finish = counts.len();
        println!(
            "[{}] finish size: {} (target {})",
            strategy.name(),
            finish,
            TARGET_SIZE
        );
        if finish > TARGET_SIZE {
            println!(
                "  {}",
                format!("overshot by {} entries", finish - TARGET_SIZE).yellow()
            );
        }
        let report = RunReport::new("gap-fill", strategy, elapsed, finish as u64);
        println!("{}", report.to_json()?);
    }

    println!();
    println!("{}", "=== Counting events per key ===".bold());
    for strategy in [Strategy::Hazardous, Strategy::Correct] {
        let (result, elapsed) = timed(|| {
            count_events(KEY_UNIVERSE, TOTAL_EVENTS, count_degree, strategy)
        });
        let counts = result?;

        println!(
            "[{}] expected {} events, counted {}",
            strategy.name(),
            TOTAL_EVENTS,
            counts.total()
        );
        let lost = TOTAL_EVENTS - counts.total();
        if lost > 0 {
            println!(
                "  {}",
                format!("{} increments lost to the read/write race", lost).yellow()
            );
        }
        for (key, count) in counts.snapshot() {
            println!("  {}: {}", key, count);
        }
        let report = RunReport::new("count-events", strategy, elapsed, counts.total());
        println!("{}", report.to_json()?);
    }

    Ok(())
}
