use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::{ActionContext, Outcome};
use crate::core::ticket::Ticket;
use crate::io::clickup::TicketApi;
use crate::io::notify::Notifier;
use crate::io::process::CommandRunner;

/// Apply the pipeline's tag unless the ticket already carries it.
pub fn tag_project<T: TicketApi, N: Notifier, R: CommandRunner>(
    ctx: &ActionContext<'_, T, N, R>,
    ticket: &Ticket,
) -> Result<Outcome> {
    let tag = ctx
        .pipeline
        .tag
        .as_deref()
        .ok_or_else(|| anyhow!("pipeline has no tag configured"))?;
    if ticket.has_tag(tag) {
        return Ok(Outcome::AlreadyDone);
    }
    ctx.tickets
        .add_tag(&ticket.id, tag)
        .with_context(|| format!("tag {} with '{tag}'", ticket.id))?;
    info!(ticket = %ticket.id, tag, "tag applied");
    Ok(Outcome::Done)
}
