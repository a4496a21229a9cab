use std::process::ExitCode;

use anyhow::Context;
use envconfig::Envconfig;
use kube::Client;
use tracing::{error, info, warn};

use cfsquota::config::Config;
use cfsquota::exec::Executor;
use cfsquota::exec::remote::KubeExecutor;
use cfsquota::scenario::{default_scenarios, load_scenarios};
use cfsquota::suite::{Suite, SuiteOutcome};

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(SuiteOutcome::Passed { mode, reports }) => {
            info!(%mode, scenarios = reports.len(), "all cfs quota checks passed");
            ExitCode::SUCCESS
        }
        Ok(SuiteOutcome::Skipped { reason }) => {
            info!(%reason, "cfs quota checks skipped");
            ExitCode::SUCCESS
        }
        Ok(SuiteOutcome::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Completes on Ctrl-C. Never completes if the handler cannot be installed.
async fn interrupted() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn run() -> anyhow::Result<SuiteOutcome> {
    let config = Config::init_from_env().context("failed to read configuration")?;
    let scenarios = match &config.scenarios_file {
        Some(path) => load_scenarios(path)?,
        None => default_scenarios(),
    };
    info!(scenarios = scenarios.len(), image = %config.image, "starting cfs quota checks");

    let client = Client::try_default()
        .await
        .context("failed to build kubernetes client")?;
    let executor = Executor::Kube(KubeExecutor::new(client.clone()));
    let suite = Suite::new(client, executor, config, scenarios)?;
    Ok(suite.run(interrupted()).await?)
}
