mod config;
mod telemetry;

use clap::Parser;
use collector::{Collector, PassError, PassReport};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use url::Url;

/// Publishes Rancher clusters and projects into a ConfigMap, one pass per run.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// YAML config file. Flags and environment variables take precedence.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Rancher server URL, without the API version
    #[arg(long, env = "RANCHER_SERVER_URL")]
    server_url: Option<Url>,

    /// Rancher API token
    #[arg(long, env = "RANCHER_TOKEN_KEY", hide_env_values = true)]
    token: Option<String>,

    /// Disable TLS certificate verification for the Rancher API
    #[arg(long)]
    insecure_skip_tls_verify: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        let rancher = &mut config.collector.rancher;
        if let Some(url) = &self.server_url {
            rancher.url = Some(url.clone());
        }
        if let Some(token) = &self.token {
            rancher.token = Some(token.clone());
        }
        if self.insecure_skip_tls_verify {
            rancher.accept_invalid_certs = true;
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = telemetry::init_logging(&config.logging);

    if let Some(metrics) = &config.metrics
        && let Err(e) = telemetry::init_metrics(metrics)
    {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(&config)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting after failed pass");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> Result<PassReport, PassError> {
    let collector = Collector::from_config(&config.collector).await?;
    collector.run_pass().await
}
