//! Tweaker - script build pipeline
//!
//! Loads every script group below the configured directories, builds it and
//! runs it. Exits with status 1 when anything failed.

mod content;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tweaker_config::TweakerConfig;
use tweaker_core::ActionLog;
use tweaker_runtime::{CascadeSource, DirectorySource, ScriptBackend, Tweaker};
use tweaker_scripting::{BracketRegistry, Natives};

use crate::content::ContentStore;

#[derive(Parser)]
#[command(name = "tweaker", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./tweaker.cfg when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Script directories, replacing the configured ones
    #[arg(short, long = "scripts", value_name = "DIR")]
    scripts: Vec<PathBuf>,

    /// Compile without executing
    #[arg(long)]
    no_execute: bool,

    /// Compile with debug information
    #[arg(short, long)]
    debug: bool,

    /// Tolerate bracket errors in this unit (repeatable)
    #[arg(long = "ignore-bracket-errors", value_name = "UNIT")]
    ignore_bracket_errors: Vec<String>,

    /// Loader name matched against `#loader` directives
    #[arg(long)]
    loader: Option<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TweakerConfig::load_from_file(path)?,
        None => TweakerConfig::load_default()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    config.display();

    let mut settings = config.build_settings();
    if cli.debug {
        settings.enable_debug();
    }
    for unit in cli.ignore_bracket_errors {
        settings.suppress_bracket_errors(unit);
    }

    let store = ContentStore::new();
    let actions = ActionLog::new();
    let mut natives = Natives::with_defaults();
    content::register_natives(&mut natives, &store, &actions);

    let brackets = BracketRegistry::with_namespaces(config.bracket_namespaces.iter().cloned());
    let tweaker = Tweaker::new(ScriptBackend::new(natives, brackets), settings)
        .with_loader(cli.loader.unwrap_or_else(|| config.loader.clone()))
        .with_action_log(actions);

    let dirs = if cli.scripts.is_empty() {
        config.scripts_dirs.clone()
    } else {
        cli.scripts
    };
    let source = dirs
        .into_iter()
        .fold(CascadeSource::new(), |cascade, dir| cascade.with_source(DirectorySource::new(dir)));

    let execute = config.execute && !cli.no_execute;
    let report = tweaker.run(&source, execute)?;

    for description in tweaker.actions().descriptions() {
        info!("Applied: {}", description);
    }
    if !store.is_empty() {
        info!("{} content entries defined", store.len());
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
