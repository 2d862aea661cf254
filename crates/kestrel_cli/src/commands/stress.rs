//! Stress command implementation.

use kestrel_testkit::{run_counter_contention, run_unique_race, StressConfig, StressReport};
use serde::Serialize;

/// Output of a stress run.
#[derive(Debug, Serialize)]
pub struct StressOutput {
    /// Settings the run used.
    pub config: StressConfig,
    /// Commit outcomes.
    pub report: StressReport,
    /// Sum of all counters (counters) or email index entries (unique).
    pub final_state: i64,
    /// Whether the final state matches the committed operations.
    pub consistent: bool,
}

/// Runs the stress command.
pub fn run(mode: &str, config: &StressConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if config.threads == 0 {
        return Err("at least one thread is required".into());
    }
    let output = match mode {
        "counters" => {
            let (report, total) = run_counter_contention(config);
            StressOutput {
                consistent: total == report.committed as i64,
                config: config.clone(),
                report,
                final_state: total,
            }
        }
        "unique" => {
            let (report, entries) = run_unique_race(config);
            StressOutput {
                consistent: entries as u64 == report.committed,
                config: config.clone(),
                report,
                final_state: entries as i64,
            }
        }
        other => return Err(format!("unknown stress mode '{other}' (counters, unique)").into()),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            output.report.print_summary();
            println!("Final state: {}", output.final_state);
            println!("Consistent: {}", output.consistent);
        }
    }

    if output.consistent {
        Ok(())
    } else {
        Err("final state does not match committed operations".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tiny() -> StressConfig {
        StressConfig {
            threads: 2,
            operations_per_thread: 10,
            hot_records: 1,
            max_retries: 1_000,
            base_backoff: Duration::from_micros(1),
        }
    }

    #[test]
    fn test_both_modes_end_consistent() {
        run("counters", &tiny(), "json").unwrap();
        run("unique", &tiny(), "text").unwrap();
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(run("chaos", &tiny(), "text").is_err());
        let idle = StressConfig {
            threads: 0,
            ..tiny()
        };
        assert!(run("counters", &idle, "text").is_err());
    }
}
