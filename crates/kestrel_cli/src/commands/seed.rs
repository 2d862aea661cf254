//! Seed command implementation.

use kestrel_core::StatsSnapshot;
use kestrel_testkit::{seed_from_json, TestDatabase, PERSON};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Result of loading a seed file.
#[derive(Debug, Serialize)]
pub struct SeedResult {
    /// Seed file path.
    pub path: String,
    /// Class the records were created in.
    pub class: String,
    /// Records committed.
    pub records: usize,
    /// Entries per index after the load.
    pub indexes: Vec<IndexSize>,
    /// Database statistics after the load.
    pub stats: StatsSnapshot,
}

/// Size of one index.
#[derive(Debug, Serialize)]
pub struct IndexSize {
    /// Index name.
    pub name: String,
    /// Number of entries.
    pub entries: usize,
}

/// Runs the seed command.
///
/// The whole file is loaded in one transaction: a duplicate email or a
/// value that cannot be indexed rejects every record.
pub fn run(path: &Path, class: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)?;
    let result = load(&json, class, &path.display().to_string())?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

/// Loads seed records into a fresh people database.
pub fn load(json: &str, class: &str, path: &str) -> Result<SeedResult, Box<dyn std::error::Error>> {
    let test_db = TestDatabase::people();
    if test_db.class(class).is_none() {
        return Err(format!("unknown class '{class}', expected {PERSON} or a subclass").into());
    }

    let mut session = test_db.session();
    let records = session.transaction(|s| seed_from_json(s, class, json))?.len();
    info!(class, records, "seed file loaded");

    let indexes = test_db
        .index_names()
        .into_iter()
        .map(|name| {
            let entries = session.index_size(&name)?;
            Ok(IndexSize { name, entries })
        })
        .collect::<Result<Vec<_>, kestrel_core::CoreError>>()?;

    Ok(SeedResult {
        path: path.to_string(),
        class: class.to_string(),
        records,
        indexes,
        stats: test_db.stats(),
    })
}

fn print_text_output(result: &SeedResult) {
    println!("=== Seed ===");
    println!("File: {}", result.path);
    println!("Class: {}", result.class);
    println!("Records: {}", result.records);
    println!();
    println!("Indexes:");
    for index in &result.indexes {
        println!("  {}: {} entries", index.name, index.entries);
    }
}
