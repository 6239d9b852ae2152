//! Pipeline-request automation.
//!
//! Run from cron: `start-runs` launches pipelines for eligible tickets and
//! `request-actions` runs the per-request actions on the request list.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use launch::exit_codes;
use launch::io::clickup::ClickupClient;
use launch::io::config::{AutomationConfig, config_path, load_config};
use launch::io::notify::SendmailNotifier;
use launch::io::process::SystemRunner;
use launch::io::queue::JobQueue;
use launch::logging;
use launch::request_actions::request_actions;
use launch::start_runs::start_runs;

#[derive(Parser)]
#[command(
    name = "launch",
    version,
    about = "Start pipeline runs and process pipeline requests from the ticketing system"
)]
struct Cli {
    /// Configuration file (default: $PIPELINE_LAUNCH_CONFIG or ./launch.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start runs for eligible to-do tickets of every configured pipeline.
    StartRuns,
    /// Run the configured actions for open tickets in the request list.
    RequestActions,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let path = config_path(cli.config.as_deref());
    let config = load_config(&path)?;
    logging::init(&config.log_level);

    let tickets = clickup_client(&config)?;
    let runner = SystemRunner::default();
    let notifier = SendmailNotifier::new(
        runner.clone(),
        &config.notify.sendmail,
        &config.notify.email,
        &config.notify.subject_prefix,
    );

    match cli.command {
        Command::StartRuns => {
            let queue = JobQueue::new(
                &config.queue.path,
                config.queue.max_retries,
                config.queue.retry_delay(),
            );
            start_runs(&config, &tickets, &notifier, &runner, &queue)?;
        }
        Command::RequestActions => {
            request_actions(&config, &tickets, &notifier, &runner)?;
        }
    }
    Ok(())
}

fn clickup_client(config: &AutomationConfig) -> Result<ClickupClient> {
    let token = config.clickup.resolve_token()?;
    ClickupClient::new(
        &config.clickup.api_url,
        token,
        Duration::from_secs(config.clickup.timeout_secs),
        config.clickup.page_limit,
    )
    .context("build ticket API client")
}
