use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "catx",
    version,
    about = "Configuration-driven course catalog extraction",
    after_help = "Results are printed as JSON on stdout; logs go to stderr (set RUST_LOG to \
                  override the configured level)."
)]
pub struct Cli {
    /// Settings file (default: ./catx.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Extract a catalog into a per-course field map.
    ///
    /// SOURCE_ID selects the parser routine (see `catx sources`). Courses that
    /// fail are reported under "failures"; everything else is still printed.
    Extract {
        /// Registered source identifier, e.g. course-xml
        source_id: String,
        /// Catalog file to read
        input: PathBuf,
        /// Profile with field definitions (TOML or YAML)
        #[arg(short, long)]
        profile: PathBuf,
        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
        /// Exit with status 1 when any course failed
        #[arg(long)]
        strict: bool,
    },

    /// List registered source identifiers
    Sources,

    /// Resolve ${...} placeholders in an expression
    Resolve {
        /// Expression to resolve, e.g. '${system.os.name}'
        expression: String,
        /// Profile whose [variables] are visible as profile.*
        #[arg(short, long)]
        profile: Option<PathBuf>,
    },
}
