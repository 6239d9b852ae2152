//! Post-run tooling for RNA-seq runs: delivery summary, output checks and
//! ticket close-out.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use launch::exit_codes;
use launch::io::clickup::ClickupClient;
use launch::io::config::{config_path, load_config};
use launch::logging;
use rnaseq::checks::{load_checks_config, run_checks};
use rnaseq::close::{CloseRequest, close_subtasks};
use rnaseq::summary;

#[derive(Parser)]
#[command(name = "rnaseq", version, about = "RNA-seq post-run tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write project_files/bicdelivery_summary.json for a finished run.
    Summary {
        /// Run output directory.
        output_dir: PathBuf,
    },
    /// Validate a run's outputs before delivery.
    Check {
        /// Working directory holding the request file (default: cwd).
        #[arg(default_value = ".")]
        wdir: PathBuf,
        /// TOML with genome_map, human_builds and gene_case_rows.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Stamp delivery fields and close the run's pipeline tickets.
    Close(CloseArgs),
}

#[derive(Args)]
struct CloseArgs {
    #[arg(long = "ticket_id")]
    ticket_id: String,
    #[arg(long = "rnaseq_ver")]
    rnaseq_ver: String,
    #[arg(long = "rsync_dir")]
    rsync_dir: String,
    #[arg(long = "del_path")]
    del_path: String,
    #[arg(long = "diff_ver")]
    diff_ver: Option<String>,
    /// Only add this comment to the ticket.
    #[arg(long)]
    comments: Option<String>,
    #[arg(
        long = "log_level",
        default_value = "INFO",
        value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"]
    )]
    log_level: String,
    /// Log intended writes without performing them.
    #[arg(long = "dry_run")]
    dry_run: bool,
    /// Automation configuration (default: $PIPELINE_LAUNCH_CONFIG or ./launch.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Summary { output_dir } => {
            logging::init("info");
            summary::run(&output_dir)?;
        }
        Command::Check { wdir, config } => {
            logging::init("info");
            let config = load_checks_config(config.as_deref())?;
            let findings = run_checks(&wdir, &config)?;
            if !findings.passed() {
                bail!("{} post-run check(s) failed", findings.failures.len());
            }
        }
        Command::Close(args) => {
            logging::init(tracing_level(&args.log_level));
            close(args)?;
        }
    }
    Ok(())
}

fn close(args: CloseArgs) -> Result<()> {
    let config = load_config(&config_path(args.config.as_deref()))?;
    let token = config.clickup.resolve_token()?;
    let tickets = ClickupClient::new(
        &config.clickup.api_url,
        token,
        Duration::from_secs(config.clickup.timeout_secs),
        config.clickup.page_limit,
    )
    .context("build ticket API client")?;
    let request = CloseRequest {
        ticket_id: args.ticket_id,
        rnaseq_ver: args.rnaseq_ver,
        rsync_dir: args.rsync_dir,
        del_path: args.del_path,
        diff_ver: args.diff_ver,
        comments: args.comments,
        dry_run: args.dry_run,
    };
    close_subtasks(&tickets, &config, &request)?;
    Ok(())
}

/// Map the accepted `--log_level` names onto tracing levels.
fn tracing_level(level: &str) -> &'static str {
    match level {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}
