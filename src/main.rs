//! deteff - Pad map and result store tooling
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use deteff::config::{CliArgs, Command};
use deteff::db::{RelationalStore, StoreLocation};
use deteff::padmap::{HardwareAddress, PadIndex, PadMap};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    match args.command {
        Command::Lookup {
            padmap,
            cobo,
            asad,
            aget,
            channel,
        } => run_lookup(&padmap, HardwareAddress::new(cobo, asad, aget, channel)),
        Command::Reverse { padmap, pad } => run_reverse(&padmap, PadIndex(pad)),
        Command::Init { db, hits, trig } => run_init(&db, &hits, &trig),
        Command::Dump {
            db,
            table,
            delimiter,
        } => run_dump(&db, &table, &delimiter),
        Command::Count { db, table } => run_count(&db, &table),
    }
}

fn load_padmap(path: &Path) -> Result<PadMap> {
    PadMap::from_path(path)
        .with_context(|| format!("Failed to load pad map from {}", path.display()))
}

fn open_store(location: &str) -> Result<RelationalStore> {
    RelationalStore::open(StoreLocation::parse(location))
        .with_context(|| format!("Failed to open store {}", location))
}

/// Print the pad for an address, or the sentinel when unmapped
fn run_lookup(path: &Path, addr: HardwareAddress) -> Result<()> {
    let padmap = load_padmap(path)?;
    let pad = padmap.find(&addr);
    if pad.is_missing() {
        info!(address = %addr, "Address not mapped");
    }
    println!("{}", pad);
    Ok(())
}

fn run_reverse(path: &Path, pad: PadIndex) -> Result<()> {
    let padmap = load_padmap(path)?;
    match padmap.reverse_address(pad) {
        Some(addr) => {
            println!("{},{},{},{}", addr.cobo, addr.asad, addr.aget, addr.channel);
            Ok(())
        }
        None => bail!("Pad {} is not in the map", pad),
    }
}

fn run_init(location: &str, hits: &str, trig: &str) -> Result<()> {
    let mut store = open_store(location)?;
    store
        .create_result_tables(hits, trig)
        .context("Failed to create result tables")?;
    info!(hits = %hits, trig = %trig, "Result tables created");
    Ok(())
}

fn run_dump(location: &str, table: &str, delimiter: &str) -> Result<()> {
    let store = open_store(location)?;
    let matrix = store
        .read_table(table)
        .with_context(|| format!("Failed to read table {}", table))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for row in matrix.iter_rows() {
        let line = row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(delimiter);
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}

fn run_count(location: &str, table: &str) -> Result<()> {
    let store = open_store(location)?;
    let count = store
        .row_count(table)
        .with_context(|| format!("Failed to count rows of {}", table))?;
    println!("{}", count);
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("deteff=debug,warn")
    } else {
        EnvFilter::new("deteff=info,warn")
    };

    // Logs go to stderr so dump output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
