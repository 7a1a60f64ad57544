//! paging-sim - trace-driven virtual memory simulator
//!
//! Usage:
//!   paging-sim generate --tasks <N> [--seed <S>] [--output <FILE>] [--config <FILE>]
//!   paging-sim run <TRACE> [--config <FILE>] [--table <KIND>] [--page-size-kb <KB>] [--dump] [-v]
//!
//! Logging goes to stderr and honours RUST_LOG; the per-request report and
//! page-table dumps go to stdout.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use paging_sim::config::{SimConfig, TableKind};
use paging_sim::session::Session;
use paging_sim::trace::{TraceGenerator, read_trace, write_trace};

#[derive(Parser)]
#[command(name = "paging-sim")]
#[command(about = "Simulate per-task paging over a shared pool of physical frames")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); built-in defaults otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every request and allocation
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a random trace file
    Generate {
        /// Number of tasks
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        tasks: u32,

        /// Output trace file
        #[arg(short, long, default_value = "tracefile.txt")]
        output: PathBuf,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Feed a trace through the simulator
    Run {
        /// Trace file to replay
        trace: PathBuf,

        /// Page table structure (overrides the config file)
        #[arg(long, value_enum)]
        table: Option<TableKind>,

        /// Page size in KB (overrides the config file)
        #[arg(long)]
        page_size_kb: Option<u64>,

        /// Print every task's page table after the run
        #[arg(long)]
        dump: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Main logic separated from main() for cleaner error handling
fn run(cli: Cli) -> paging_sim::Result<()> {
    let mut config = match &cli.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };

    match cli.command {
        Commands::Generate {
            tasks,
            output,
            seed,
        } => cmd_generate(&config, tasks, &output, seed),
        Commands::Run {
            trace,
            table,
            page_size_kb,
            dump,
        } => {
            if let Some(table) = table {
                config.table = table;
            }
            if let Some(kb) = page_size_kb {
                config.page_size_kb = kb;
            }
            config.validate()?;
            cmd_run(config, &trace, dump)
        }
    }
}

fn cmd_generate(config: &SimConfig, tasks: u32, output: &Path, seed: Option<u64>) -> paging_sim::Result<()> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let entries = TraceGenerator::new(&config.sections, config.page_size(), rng).generate(tasks);
    write_trace(output, &entries)?;

    info!("wrote {} request(s) for {tasks} task(s)", entries.len());
    println!("Trace file generated: {}", output.display());
    Ok(())
}

fn cmd_run(config: SimConfig, trace: &Path, dump: bool) -> paging_sim::Result<()> {
    let entries = read_trace(trace)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut session = Session::new(config);
    session.run(entries, &mut out)?;

    if dump {
        writeln!(out)?;
        session.dump(&mut out)?;
    }

    // Counters as of the end of the trace, before tasks hand their frames back
    let stats = session.stats();
    session.finish()?;
    writeln!(out)?;
    writeln!(out, "=== Summary ===")?;
    writeln!(out, "{stats}")?;
    Ok(())
}
