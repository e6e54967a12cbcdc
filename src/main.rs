// Inherit lint configuration from lib.rs for consistency
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::items_after_statements,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::fn_params_excessive_bools,
    clippy::unnecessary_wraps,
    clippy::match_same_arms
)]

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use catx::cli::commands::{Cli, Command};
use catx::cli::output::{self, ExtractionOutput};
use catx::config::Config;
use catx::extract::run_extraction;
use catx::models::scope::ConfigScope;
use catx::routine::{FileSource, Registry};
use catx::vars::VariableContext;

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", output::format_error(&e));
            std::process::exit(1);
        }
    };
    init_tracing(&config.settings.logging.level, cli.verbose);

    if let Err(e) = run(cli, &config) {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays pure JSON.
fn init_tracing(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn run(cli: Cli, config: &Config) -> Result<(), Box<dyn std::fmt::Display>> {
    match cli.command {
        Command::Extract {
            source_id,
            input,
            profile,
            pretty,
            strict,
        } => cmd_extract(config, &source_id, &input, &profile, pretty, strict),
        Command::Sources => cmd_sources(),
        Command::Resolve {
            expression,
            profile,
        } => cmd_resolve(&expression, profile.as_deref()),
    }
}

type CmdResult = Result<(), Box<dyn std::fmt::Display>>;

fn map_err(e: impl std::fmt::Display + 'static) -> Box<dyn std::fmt::Display> {
    Box::new(e.to_string())
}

fn cmd_extract(
    config: &Config,
    source_id: &str,
    input: &Path,
    profile: &Path,
    pretty: bool,
    strict: bool,
) -> CmdResult {
    let registry = Registry::with_builtin();
    if !registry.contains(source_id) {
        return Err(map_err(catx::ExtractError::RegistryLookup {
            id: source_id.to_string(),
        }));
    }

    let scope = ConfigScope::load(profile).map_err(map_err)?;
    let extraction = run_extraction(
        &registry,
        source_id,
        Box::new(FileSource::new(input)),
        Arc::new(scope),
        &config.settings.engine,
    )
    .map_err(map_err)?;

    let result = ExtractionOutput::from(&extraction);
    if pretty || config.settings.output.pretty {
        println!("{}", output::format_json_pretty(&result));
    } else {
        println!("{}", output::format_json(&result));
    }

    if strict && !extraction.is_complete() {
        return Err(map_err(format!(
            "{} unit(s) failed",
            extraction.failures.len()
        )));
    }
    Ok(())
}

fn cmd_sources() -> CmdResult {
    let registry = Registry::with_builtin();
    println!("{}", output::format_json(&registry.ids()));
    Ok(())
}

fn cmd_resolve(expression: &str, profile: Option<&Path>) -> CmdResult {
    let ctx = match profile {
        Some(path) => {
            let scope = ConfigScope::load(path).map_err(map_err)?;
            VariableContext::for_profile(&scope).map_err(map_err)?
        }
        None => VariableContext::with_defaults(),
    };
    let value = ctx.resolve(expression).map_err(map_err)?;
    println!(
        "{}",
        output::format_json(&serde_json::json!({ "expression": expression, "value": value }))
    );
    Ok(())
}
