//! FASTQ permission check for the projects named in a request.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde_json::Value;
use tracing::{info, warn};

use super::{ActionContext, Outcome};
use crate::core::fastq::extract_project_ids;
use crate::core::ticket::Ticket;
use crate::io::clickup::TicketApi;
use crate::io::config::FIELD_FASTQ_CHECKED;
use crate::io::notify::Notifier;
use crate::io::process::{CommandRunner, CommandSpec, ProcessError};

/// Look up every project id in the description and record who may read its FASTQs.
///
/// A failing lookup for one id is commented on the ticket and skipped; the
/// remaining ids are still checked. The `FASTQ Checked` marker is set once the
/// consolidated result has been posted.
pub fn check_fastq<T: TicketApi, N: Notifier, R: CommandRunner>(
    ctx: &ActionContext<'_, T, N, R>,
    ticket: &Ticket,
) -> Result<Outcome> {
    let fastq = ctx
        .config
        .fastq
        .as_ref()
        .ok_or_else(|| anyhow!("[fastq] is not configured"))?;
    let marker_id = ctx.config.field_id(FIELD_FASTQ_CHECKED)?;

    if ticket.field(FIELD_FASTQ_CHECKED).is_some_and(|f| f.is_true()) {
        return Ok(Outcome::AlreadyDone);
    }

    let ids = extract_project_ids(&ticket.description, &fastq.keywords);
    if ids.is_empty() {
        return Ok(Outcome::NotEligible(
            "no project ids in the description".to_string(),
        ));
    }

    let mut permitted = BTreeSet::new();
    let mut denied = BTreeSet::new();
    for id in &ids {
        match check_one(ctx, &fastq.lims_command, &fastq.permissions_command, fastq.timeout(), id) {
            Ok(true) => {
                permitted.insert(id.as_str());
            }
            Ok(false) => {
                denied.insert(id.as_str());
            }
            Err(err) => {
                warn!(ticket = %ticket.id, project = %id, err = %err, "FASTQ lookup failed");
                let mut comment = format!("FASTQ check for {id} failed: {err}");
                let output = err.output_text();
                if !output.trim().is_empty() {
                    comment.push('\n');
                    comment.push_str(output.trim_end());
                }
                ctx.tickets
                    .add_comment(&ticket.id, &comment)
                    .with_context(|| format!("comment on {}", ticket.id))?;
            }
        }
    }

    ctx.tickets
        .add_comment(&ticket.id, &summary_comment(&permitted, &denied))
        .with_context(|| format!("comment on {}", ticket.id))?;
    ctx.tickets
        .set_custom_field(&ticket.id, marker_id, Value::Bool(true))
        .with_context(|| format!("set {FIELD_FASTQ_CHECKED} on {}", ticket.id))?;
    info!(
        ticket = %ticket.id,
        permitted = permitted.len(),
        denied = denied.len(),
        "FASTQ permissions checked"
    );
    Ok(Outcome::Done)
}

/// `Ok(true)` when the permission check printed nothing.
fn check_one<T: TicketApi, N: Notifier, R: CommandRunner>(
    ctx: &ActionContext<'_, T, N, R>,
    lims: &[String],
    permissions: &[String],
    timeout: Duration,
    project_id: &str,
) -> Result<bool, ProcessError> {
    ctx.runner.run(&command(lims, project_id, timeout)?)?;
    let output = ctx.runner.run(&command(permissions, project_id, timeout)?)?;
    Ok(output.stdout_text().trim().is_empty())
}

fn command(
    argv: &[String],
    project_id: &str,
    timeout: Duration,
) -> Result<CommandSpec, ProcessError> {
    let argv = render_argv(argv, project_id).map_err(|err| ProcessError::Spawn {
        program: argv.first().cloned().unwrap_or_default(),
        source: std::io::Error::other(err.to_string()),
    })?;
    CommandSpec::from_argv(&argv, timeout).ok_or_else(|| ProcessError::Spawn {
        program: String::new(),
        source: std::io::Error::other("empty argv"),
    })
}

/// Substitute `{{ project_id }}` in every argv element.
pub fn render_argv(argv: &[String], project_id: &str) -> Result<Vec<String>, minijinja::Error> {
    let env = Environment::new();
    argv.iter()
        .map(|arg| env.render_str(arg, context! { project_id }))
        .collect()
}

fn summary_comment(permitted: &BTreeSet<&str>, denied: &BTreeSet<&str>) -> String {
    let list = |ids: &BTreeSet<&str>| {
        if ids.is_empty() {
            "none".to_string()
        } else {
            ids.iter().copied().collect::<Vec<_>>().join(", ")
        }
    };
    format!(
        "FASTQ permission check\nHas permission: {}\nLacks permission: {}",
        list(permitted),
        list(denied)
    )
}
