//! KestrelDB CLI
//!
//! Command-line tools for exercising the KestrelDB transactional core.
//!
//! # Commands
//!
//! - `scenario` - Run scripted transaction scenarios and check their outcome
//! - `stress` - Drive concurrent sessions against hot records or unique keys
//! - `seed` - Load JSON records into a people database and report index sizes

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// KestrelDB command-line tools.
#[derive(Parser)]
#[command(name = "kestrel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scripted transaction scenarios
    Scenario {
        /// Scenario to run (default: all)
        #[arg(short, long)]
        name: Option<String>,

        /// List scenario names and exit
        #[arg(short, long)]
        list: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a contention stress test
    Stress {
        /// Workload (counters, unique)
        #[arg(short, long, default_value = "counters")]
        mode: String,

        /// Number of concurrent sessions
        #[arg(short, long, default_value = "4")]
        threads: usize,

        /// Operations per session
        #[arg(short, long, default_value = "250")]
        ops: usize,

        /// Number of hot counters or distinct unique keys
        #[arg(long, default_value = "4")]
        hot: usize,

        /// Retries after a conflict before giving up
        #[arg(short, long, default_value = "8")]
        retries: u32,

        /// Backoff before the first retry, in microseconds
        #[arg(long, default_value = "50")]
        backoff_us: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Load a JSON array of records into a people database
    Seed {
        /// JSON file holding an array of objects
        file: PathBuf,

        /// Class to create the records in (Person, Employee)
        #[arg(short, long, default_value = "Person")]
        class: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Scenario { name, list, format } => {
            if list {
                for name in commands::scenario::NAMES {
                    println!("{name}");
                }
            } else {
                commands::scenario::run(name.as_deref(), &format)?;
            }
        }
        Commands::Stress {
            mode,
            threads,
            ops,
            hot,
            retries,
            backoff_us,
            format,
        } => {
            let config = kestrel_testkit::StressConfig {
                threads,
                operations_per_thread: ops,
                hot_records: hot,
                max_retries: retries,
                base_backoff: Duration::from_micros(backoff_us),
            };
            commands::stress::run(&mode, &config, &format)?;
        }
        Commands::Seed {
            file,
            class,
            format,
        } => {
            commands::seed::run(&file, &class, &format)?;
        }
        Commands::Version => {
            println!("KestrelDB CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
