//! Driver-facing run reports: elapsed wall time plus a checksum derived
//! from the run's results, printable as a log line or serialized as JSON.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::Strategy;

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub strategy: String,
    pub elapsed_ms: u64,
    pub checksum: u64,
}

impl RunReport {
    pub fn new(scenario: &str, strategy: Strategy, elapsed: Duration, checksum: u64) -> Self {
        RunReport {
            scenario: scenario.to_string(),
            strategy: strategy.name().to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            checksum,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} --> cost: {}ms, sum: {}",
            self.scenario, self.strategy, self.elapsed_ms, self.checksum
        )
    }
}

/// Run a closure and measure it.
pub fn timed<T>(work: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = work();
    (value, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_renders_as_log_line_and_json() {
        let report = RunReport::new(
            "count-events",
            Strategy::Correct,
            Duration::from_millis(42),
            1_000_000,
        );
        assert_eq!(
            report.to_string(),
            "count-events/correct --> cost: 42ms, sum: 1000000"
        );

        let json = report.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"scenario":"count-events","strategy":"correct","elapsed_ms":42,"checksum":1000000}"#
        );
    }

    #[test]
    fn test_timed_passes_the_value_through() {
        let (value, elapsed) = timed(|| 7);
        assert_eq!(value, 7);
        assert!(elapsed.as_secs() < 60);
    }
}
