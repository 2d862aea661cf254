//! Scenario command implementation.
//!
//! Each scenario scripts two or more sessions against a fresh people
//! database and checks that the core answers the way it must.

use kestrel_core::{CoreError, Database, StatsSnapshot};
use kestrel_testkit::{insert_person, TestDatabase, EMAIL_INDEX};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Names of the built-in scenarios, in run order.
pub const NAMES: [&str; 4] = [
    "stale-read",
    "unique-fail-fast",
    "duplicate-at-commit",
    "remove-then-add",
];

/// Failure of a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The core answered differently than the scenario expects.
    #[error("scenario '{scenario}' failed: {detail}")]
    Unexpected {
        /// Scenario name.
        scenario: &'static str,
        /// What went wrong.
        detail: String,
    },

    /// A step failed that should have succeeded.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No scenario has this name.
    #[error("unknown scenario '{0}'")]
    Unknown(String),
}

/// Outcome of one scenario.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: &'static str,
    /// Steps taken, in order.
    pub steps: Vec<String>,
    /// Database statistics after the scenario.
    pub stats: StatsSnapshot,
}

struct Transcript {
    name: &'static str,
    steps: Vec<String>,
}

impl Transcript {
    fn step(&mut self, line: impl Into<String>) {
        self.steps.push(line.into());
    }

    fn expect(&self, holds: bool, detail: impl Into<String>) -> Result<(), ScenarioError> {
        if holds {
            Ok(())
        } else {
            Err(ScenarioError::Unexpected {
                scenario: self.name,
                detail: detail.into(),
            })
        }
    }
}

/// Runs one scenario, or all of them, and prints their transcripts.
pub fn run(name: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let selected: Vec<&'static str> = match name {
        None => NAMES.to_vec(),
        Some(name) => vec![NAMES
            .iter()
            .copied()
            .find(|candidate| *candidate == name)
            .ok_or_else(|| ScenarioError::Unknown(name.to_string()))?],
    };

    let reports = selected
        .into_iter()
        .map(run_one)
        .collect::<Result<Vec<_>, _>>()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            for report in &reports {
                print_text_output(report);
            }
        }
    }
    Ok(())
}

/// Runs a scenario on a fresh database.
pub fn run_one(name: &'static str) -> Result<ScenarioReport, ScenarioError> {
    let test_db = TestDatabase::people();
    let mut transcript = Transcript {
        name,
        steps: Vec::new(),
    };
    match name {
        "stale-read" => stale_read(&test_db, &mut transcript)?,
        "unique-fail-fast" => unique_fail_fast(&test_db, &mut transcript)?,
        "duplicate-at-commit" => duplicate_at_commit(&test_db, &mut transcript)?,
        "remove-then-add" => remove_then_add(&test_db, &mut transcript)?,
        other => return Err(ScenarioError::Unknown(other.to_string())),
    }
    info!(scenario = name, steps = transcript.steps.len(), "scenario passed");
    Ok(ScenarioReport {
        name,
        steps: transcript.steps,
        stats: test_db.stats(),
    })
}

fn stale_read(db: &Database, t: &mut Transcript) -> Result<(), ScenarioError> {
    let mut setup = db.session();
    let mut record = insert_person(&mut setup, "r@example.org", 30);
    for n in 1..=3i64 {
        record.set("visits", n);
        setup.save(&mut record)?;
    }
    let rid = record.rid();
    t.step(format!("R={rid} stored at v{}", record.version()));

    let mut a = db.session();
    let mut b = db.session();
    a.begin()?;
    b.begin()?;
    let mut a_copy = a.load(rid)?.ok_or(CoreError::RecordNotFound { rid })?;
    let mut b_copy = b.load(rid)?.ok_or(CoreError::RecordNotFound { rid })?;
    t.step(format!("A and B load R at v{}", a_copy.version()));

    b_copy.set("owner", "b");
    b.save(&mut b_copy)?;
    let committed = b.commit()?;
    t.step(format!("B commits, R now v{}", committed.version(rid).unwrap_or_default()));

    a_copy.set("owner", "a");
    a.save(&mut a_copy)?;
    match a.commit() {
        Err(err @ CoreError::Conflict { .. }) => t.step(format!("A commit refused: {err}")),
        other => {
            return t.expect(false, format!("A commit should conflict, got {other:?}"));
        }
    }

    a.begin()?;
    let mut fresh = a.load(rid)?.ok_or(CoreError::RecordNotFound { rid })?;
    t.step(format!("A reloads R at v{}", fresh.version()));
    fresh.set("owner", "a");
    a.save(&mut fresh)?;
    let result = a.commit()?;
    let version = result.version(rid).unwrap_or_default();
    t.step(format!("A commits, R now v{version}"));
    t.expect(version == 5, format!("expected v5, got v{version}"))
}

fn unique_fail_fast(db: &Database, t: &mut Transcript) -> Result<(), ScenarioError> {
    let mut session = db.session();
    session.begin()?;
    let x = insert_person(&mut session, "1", 20);
    t.step(format!("put key=1 -> X ({})", x.rid()));

    let mut y = session.new_record("Person")?;
    y.set("email", "1");
    match session.save(&mut y) {
        Err(err @ CoreError::DuplicateKey { .. }) => t.step(format!("put key=1 -> Y refused: {err}")),
        other => return t.expect(false, format!("second put should fail, got {other:?}")),
    }
    let holders = session.index_get(EMAIL_INDEX, "1")?;
    t.expect(holders == vec![x.rid()], "key=1 must still map to X")?;
    session.commit()?;
    t.step("commit succeeds with X only");
    Ok(())
}

fn duplicate_at_commit(db: &Database, t: &mut Transcript) -> Result<(), ScenarioError> {
    let mut slow = db.session();
    let mut fast = db.session();
    slow.begin()?;
    insert_person(&mut slow, "a@example.org", 20);
    insert_person(&mut slow, "b@example.org", 21);
    t.step("slow stages a@ and b@");

    insert_person(&mut fast, "b@example.org", 22);
    t.step("fast commits b@");

    match slow.commit() {
        Err(err @ CoreError::DuplicateKey { .. }) => t.step(format!("slow commit refused: {err}")),
        other => return t.expect(false, format!("slow commit should fail, got {other:?}")),
    }
    let leaked = slow.index_get(EMAIL_INDEX, "a@example.org")?;
    t.expect(leaked.is_empty(), "a@ must not be visible after the failed commit")?;
    t.step("a@ is absent, b@ belongs to fast");
    Ok(())
}

fn remove_then_add(db: &Database, t: &mut Transcript) -> Result<(), ScenarioError> {
    let mut session = db.session();
    let mut record = insert_person(&mut session, "keep@example.org", 40);
    let rid = record.rid();

    session.begin()?;
    record.set("email", "other@example.org");
    session.save(&mut record)?;
    record.set("email", "keep@example.org");
    session.save(&mut record)?;
    let during = session.index_get(EMAIL_INDEX, "keep@example.org")?;
    t.step(format!("within the transaction keep@ -> {during:?}"));
    t.expect(during == vec![rid], "keep@ must stay visible inside the transaction")?;

    session.commit()?;
    let after = session.index_get(EMAIL_INDEX, "keep@example.org")?;
    t.step(format!("after commit keep@ -> {after:?}"));
    t.expect(after == vec![rid], "keep@ must be present after commit")
}

fn print_text_output(report: &ScenarioReport) {
    println!("=== {} ===", report.name);
    for (i, step) in report.steps.iter().enumerate() {
        println!("{:>2}. {}", i + 1, step);
    }
    println!(
        "committed: {}, rolled back: {}, conflicts: {}, duplicate keys: {}",
        report.stats.transactions_committed,
        report.stats.transactions_rolled_back,
        report.stats.conflicts,
        report.stats.duplicate_keys
    );
    println!();
}
