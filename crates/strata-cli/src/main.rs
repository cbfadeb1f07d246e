//! `strata` CLI - build a filtered vector index and answer a query batch.
//!
//! Usage:
//!   `strata query <data_file> <query_file> <out_file>`
//!   `strata query -r <data_file> <query_file> <out_file>` (also appends a
//!   row to `query.csv`)

#![allow(clippy::cast_precision_loss)]

mod report;

use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata_core::{io, EngineConfig, StrataIndex};

#[derive(Parser)]
#[command(name = "strata")]
#[command(
    author,
    version,
    about = "Strata - hybrid filtered vector search engine"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index, run a query batch, write the result file
    Query {
        /// Also append per-kind QPS and build time to query.csv
        #[arg(short = 'r', long = "record")]
        record: bool,

        /// Path to the binary dataset file
        data_file: PathBuf,

        /// Path to the binary query file
        query_file: PathBuf,

        /// Path the result ids are written to
        out_file: PathBuf,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap handles --help/--version here as well
            let _ = err.print();
            process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        let code = err
            .downcast_ref::<strata_core::Error>()
            .map_or(2, strata_core::Error::exit_code);
        process::exit(code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Query {
            record,
            data_file,
            query_file,
            out_file,
        } => query_command(record, &data_file, &query_file, &out_file),
    }
}

fn query_command(
    record: bool,
    data_file: &Path,
    query_file: &Path,
    out_file: &Path,
) -> anyhow::Result<()> {
    let config = EngineConfig::load()?;

    let total = Instant::now();
    let dataset = io::read_dataset(data_file)?;
    let index = StrataIndex::build(dataset, config)?;
    let build_seconds = total.elapsed().as_secs_f64();
    println!("Index built in {build_seconds:.2} seconds");

    let batch = io::read_queries(query_file)?;
    let search = Instant::now();
    let (results, stats) = index.run_queries(&batch, config.query.k)?;
    let search_seconds = search.elapsed().as_secs_f64();

    io::write_results(out_file, &results)?;

    report::print_summary(build_seconds, search_seconds, &stats);

    if record {
        report::append_csv("query.csv", build_seconds, search_seconds, &stats)?;
    }

    Ok(())
}
