//! # engine-cli
//!
//! Command-line runner for the migration engine: a single `run
//! <path-or-glob>` command that binds each matched configuration file to a
//! source/sink pair and runs it to completion.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use engine_core::RawConfig;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "engine-cli")]
#[command(about = "Batch data-migration engine runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one or more migration configs, selected by a path or glob.
    Run {
        /// A config file path or glob pattern (e.g. `configs/*.yaml`).
        path_or_glob: String,

        /// Treat the config as a text template before parsing YAML.
        #[arg(long)]
        template: bool,

        /// Also substitute process environment variables into the template
        /// dictionary (implies `--template`).
        #[arg(long)]
        template_with_env: bool,

        /// Batch channel capacity.
        #[arg(long, default_value_t = 8)]
        batch_capacity: usize,

        /// Error channel capacity.
        #[arg(long, default_value_t = 10)]
        error_capacity: usize,

        /// Error budget before a run aborts.
        #[arg(long, default_value_t = 50)]
        error_budget: usize,
    },
}

fn init_logging() {
    let development = std::env::var("LOGENV").map(|v| v == "development").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::from_default_env());
    if development {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let Command::Run {
        path_or_glob,
        template,
        template_with_env,
        batch_capacity,
        error_capacity,
        error_budget,
    } = cli.command;

    let mut paths = vec![];
    for entry in glob::glob(&path_or_glob)? {
        paths.push(entry?);
    }
    if paths.is_empty() {
        anyhow::bail!("no config matched: {}", path_or_glob);
    }

    let use_template = template || template_with_env;
    let vars: HashMap<String, String> = if template_with_env { engine_core::config::env_vars() } else { HashMap::new() };

    let opts = engine_pipeline::EngineOpts { batch_capacity, error_capacity, error_budget };
    let mut any_binding_failed = false;

    for path in &paths {
        match bind(path, use_template, &vars) {
            Err(e) => {
                error!(path = %path.display(), error = %e, "config binding failed");
                any_binding_failed = true;
            }
            Ok((source, sink)) => match engine_pipeline::run(source, sink, opts).await {
                Ok(outcome) => info!(path = %path.display(), ?outcome, "run finished"),
                Err(e) => error!(path = %path.display(), error = %e, "run failed"),
            },
        }
    }

    if any_binding_failed {
        std::process::exit(1);
    }
    Ok(())
}

type SourceSinkPair = (Box<dyn engine_core::Source>, Box<dyn engine_core::Sink>);

/// Reads and binds one config path to a source/sink pair. Kept distinct
/// from `engine_pipeline::run`'s own `Result<_, EngineError>` so the CLI can
/// tell a binding failure (which flips the process exit code) apart from a
/// later adapter-fatal error during the run itself (which doesn't).
fn bind(path: &PathBuf, use_template: bool, vars: &HashMap<String, String>) -> Result<SourceSinkPair, engine_core::EngineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| engine_core::EngineError::ConfigInvalid(e.to_string()))?;
    let text = if use_template {
        engine_core::config::render_template(&text, vars)
    } else {
        text
    };
    let config = RawConfig::parse(&text)?;

    let source = engine_adapters::bind_source(&config)?;
    let warehouse_root = std::env::temp_dir().join("engine-warehouse-stage");
    let sink = engine_adapters::bind_sink(&config, &warehouse_root)?;
    Ok((source, sink))
}
