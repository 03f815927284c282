//! `llms-gen` command line
//!
//! Loads `.env`, installs logging, layers configuration, then runs the
//! pipeline with Ctrl-C mapped onto the controller's halt signal.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use llmsgen_core::{ConfigLoader, GeminiClient, Pipeline};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Generate an llms.txt sitemap for a repository.
#[derive(Debug, Parser)]
#[command(name = "llms-gen", version, about)]
pub struct Cli {
    /// Repository root to scan
    #[arg(long, short = 'r', value_name = "DIR")]
    pub repo_path: PathBuf,

    /// Where to write the sitemap [default: temp/llms.txt]
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Log filter (overrides RUST_LOG), e.g. `debug` or `llmsgen_core=trace`
    #[arg(long, short = 'l', value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Configuration file (TOML)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Install the stderr subscriber. `--log-level` beats `RUST_LOG`; default `info`.
pub fn init_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> anyhow::Result<PathBuf> {
    let config = ConfigLoader::load_from(cli.config.as_deref()).context("loading configuration")?;
    config.log_effective();

    let client = GeminiClient::from_config(&config).context("creating Gemini client")?;
    let pipeline = Pipeline::new(config, client);

    let halt = pipeline.halt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received; stopping after the current batch");
            halt.cancel();
        }
    });

    info!(repo = %cli.repo_path.display(), "Generating sitemap");
    let outcome = match pipeline.run(&cli.repo_path, cli.output_path.as_deref()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                stage = %err.stage(),
                category = err.category().as_str(),
                error = %err,
                "Pipeline failed"
            );
            if let Some(raw) = err.raw_output() {
                error!(raw = %raw, "Offending service output");
            }
            let stage = err.stage();
            return Err(anyhow::Error::new(err).context(format!("pipeline failed during {stage}")));
        }
    };

    Ok(outcome.output_path)
}
