//! Contention stress runs.
//!
//! These runners drive many sessions against shared records and unique keys
//! from several threads and report how commits fared.

use crate::fixtures::{scenarios, TestDatabase, EMAIL_INDEX, PERSON};
use kestrel_core::{CoreError, CoreResult, Database, Rid};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of a stress test run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StressReport {
    /// Name of the run.
    pub name: String,
    /// Transactions that committed.
    pub committed: u64,
    /// Commits refused with a version conflict, retried or not.
    pub conflicts: u64,
    /// Commits or saves refused with a duplicate key.
    pub duplicate_keys: u64,
    /// Operations abandoned after exhausting their retries.
    pub gave_up: u64,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
    /// Committed transactions per second.
    pub commits_per_second: f64,
}

impl StressReport {
    fn finish(name: &str, counters: &Counters, elapsed: Duration) -> Self {
        let committed = counters.committed.load(Ordering::Relaxed);
        let seconds = elapsed.as_secs_f64();
        Self {
            name: name.to_string(),
            committed,
            conflicts: counters.conflicts.load(Ordering::Relaxed),
            duplicate_keys: counters.duplicate_keys.load(Ordering::Relaxed),
            gave_up: counters.gave_up.load(Ordering::Relaxed),
            elapsed_ms: elapsed.as_millis() as u64,
            commits_per_second: if seconds > 0.0 {
                committed as f64 / seconds
            } else {
                0.0
            },
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self) {
        println!("\n=== {} ===", self.name);
        println!("Committed: {}", self.committed);
        println!("Conflicts: {}", self.conflicts);
        println!("Duplicate keys: {}", self.duplicate_keys);
        println!("Gave up: {}", self.gave_up);
        println!("Duration: {} ms", self.elapsed_ms);
        println!("Throughput: {:.2} commits/sec", self.commits_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone, Serialize)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Operations each thread performs.
    pub operations_per_thread: usize,
    /// Number of shared counters, or of distinct emails in a unique race.
    pub hot_records: usize,
    /// Retries after a conflict before an operation is abandoned.
    pub max_retries: u32,
    /// Backoff before the first retry; doubled on each further retry.
    pub base_backoff: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            operations_per_thread: 250,
            hot_records: 4,
            max_retries: 8,
            base_backoff: Duration::from_micros(50),
        }
    }
}

#[derive(Default)]
struct Counters {
    committed: AtomicU64,
    conflicts: AtomicU64,
    duplicate_keys: AtomicU64,
    gave_up: AtomicU64,
}

impl Counters {
    fn record_error(&self, err: &CoreError) {
        match err {
            CoreError::Conflict { .. } => self.conflicts.fetch_add(1, Ordering::Relaxed),
            CoreError::DuplicateKey { .. } => self.duplicate_keys.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries are spent. Sleeps with doubling backoff between
/// attempts, capped at 64 times the base.
///
/// Returns the outcome and the number of attempts made.
pub fn retry_with_backoff<T>(
    max_retries: u32,
    base_backoff: Duration,
    mut attempt: impl FnMut() -> CoreResult<T>,
) -> (CoreResult<T>, u32) {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt() {
            Err(err) if err.is_retryable() && attempts <= max_retries => {
                let backoff = base_backoff * (1u32 << (attempts - 1).min(6));
                debug!(attempts, backoff_us = backoff.as_micros() as u64, "retrying after conflict");
                thread::sleep(backoff);
            }
            outcome => return (outcome, attempts),
        }
    }
}

fn increment(db: &Database, rid: Rid, config: &StressConfig, counters: &Counters) {
    let mut session = db.session();
    let (outcome, _) = retry_with_backoff(config.max_retries, config.base_backoff, || {
        let outcome = session.transaction(|s| {
            let mut counter = s.load(rid)?.ok_or(CoreError::RecordNotFound { rid })?;
            let value = counter.get("value").and_then(|v| v.as_integer()).unwrap_or(0);
            counter.set("value", value + 1);
            s.save(&mut counter)
        });
        if let Err(err) = &outcome {
            counters.record_error(err);
        }
        outcome
    });
    match outcome {
        Ok(()) => counters.committed.fetch_add(1, Ordering::Relaxed),
        Err(_) => counters.gave_up.fetch_add(1, Ordering::Relaxed),
    };
}

/// Increments a few shared counters from every thread, retrying conflicts.
///
/// Returns the report and the final sum of all counters, which equals the
/// number of committed increments.
pub fn run_counter_contention(config: &StressConfig) -> (StressReport, i64) {
    let (test_db, counters_records) = scenarios::counters(config.hot_records.max(1));
    let rids: Arc<Vec<Rid>> = Arc::new(counters_records.iter().map(|r| r.rid()).collect());
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = test_db.db.clone();
            let rids = Arc::clone(&rids);
            let counters = Arc::clone(&counters);
            let config = config.clone();
            thread::spawn(move || {
                for i in 0..config.operations_per_thread {
                    let rid = rids[(t * 7 + i) % rids.len()];
                    increment(&db, rid, &config, &counters);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let report = StressReport::finish("counter contention", &counters, start.elapsed());
    let total = sum_counters(&test_db, &rids);
    info!(committed = report.committed, conflicts = report.conflicts, total, "counter contention finished");
    (report, total)
}

fn sum_counters(test_db: &TestDatabase, rids: &[Rid]) -> i64 {
    let mut session = test_db.session();
    rids.iter()
        .map(|rid| {
            session
                .load(*rid)
                .expect("Failed to load counter")
                .and_then(|counter| counter.get("value").and_then(|v| v.as_integer()))
                .unwrap_or(0)
        })
        .sum()
}

/// Has every thread race to claim emails from a small pool on a unique
/// index. Each email ends up owned by exactly one record.
///
/// Returns the report and the final number of entries in the email index.
pub fn run_unique_race(config: &StressConfig) -> (StressReport, usize) {
    let test_db = TestDatabase::people();
    let counters = Arc::new(Counters::default());
    let pool = config.hot_records.max(1);
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = test_db.db.clone();
            let counters = Arc::clone(&counters);
            let operations = config.operations_per_thread;
            thread::spawn(move || {
                let mut session = db.session();
                for i in 0..operations {
                    let email = format!("user{}@example.org", (t + i) % pool);
                    let outcome = session.transaction(|s| {
                        let mut person = s.new_record(PERSON)?;
                        person.set("email", email.as_str());
                        s.save(&mut person)
                    });
                    match outcome {
                        Ok(()) => {
                            counters.committed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => counters.record_error(&err),
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let report = StressReport::finish("unique race", &counters, start.elapsed());
    let entries = test_db
        .session()
        .index_size(EMAIL_INDEX)
        .expect("Failed to size email index");
    info!(committed = report.committed, duplicates = report.duplicate_keys, entries, "unique race finished");
    (report, entries)
}
