#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dalkey")]
#[command(author, version, about = "Incremental build and dev server with HMR", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Build the project into the output directory
    Build {
        /// Entry point files (override config entries)
        entries: Vec<PathBuf>,

        /// Output directory (overrides config outDir)
        #[arg(long, short = 'o')]
        out_dir: Option<PathBuf>,

        /// Generate source maps
        #[arg(long)]
        sourcemap: bool,
    },

    /// Start the development server with HMR
    Dev {
        /// Port to listen on (overrides config)
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    match cli.command {
        Commands::Build {
            entries,
            out_dir,
            sourcemap,
        } => {
            let action = commands::build::BuildAction {
                cwd,
                entries,
                out_dir,
                sourcemap,
            };
            commands::build::run(action, cli.json)
        }
        Commands::Dev { port, host, open } => {
            let action = commands::dev::DevAction {
                cwd,
                port,
                host,
                open,
            };
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| miette::miette!("failed to start runtime: {e}"))?;
            rt.block_on(commands::dev::run(action))
        }
    }
}
