//! `rnaseq close`: record delivery on the tickets of a finished run.
//!
//! The finished ticket and its open pipeline siblings get the archive path
//! and pipeline versions and are closed; the parent gets the delivery path.

use anyhow::{Context, Result, bail};
use launch::core::eligibility::select_siblings;
use launch::core::ticket::{Ticket, TicketStatus};
use launch::io::clickup::TicketApi;
use launch::io::config::{
    AutomationConfig, FIELD_ARCHIVE_PATH, FIELD_DELIVERY_PATH, FIELD_PIPELINE_VERSION,
};
use serde_json::Value;
use tracing::info;

/// Pipeline whose sibling suffixes select the tickets closed with the run.
pub const RNASEQ_PIPELINE: &str = "RNASEQ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseRequest {
    pub ticket_id: String,
    pub rnaseq_ver: String,
    pub rsync_dir: String,
    pub del_path: String,
    pub diff_ver: Option<String>,
    /// Post this comment and stop.
    pub comments: Option<String>,
    pub dry_run: bool,
}

/// What a close pass wrote (or, in a dry run, would have written).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CloseReport {
    /// Tickets closed, in order.
    pub closed: Vec<String>,
    /// `(ticket id, field name)` of every field write.
    pub fields_set: Vec<(String, String)>,
    pub commented: bool,
}

struct Closer<'a, T: TicketApi> {
    tickets: &'a T,
    config: &'a AutomationConfig,
    dry_run: bool,
    report: CloseReport,
}

pub fn close_subtasks<T: TicketApi>(
    tickets: &T,
    config: &AutomationConfig,
    request: &CloseRequest,
) -> Result<CloseReport> {
    let mut closer = Closer {
        tickets,
        config,
        dry_run: request.dry_run,
        report: CloseReport::default(),
    };

    if let Some(comment) = &request.comments {
        if request.dry_run {
            info!(ticket = %request.ticket_id, comment = %comment, "dry run: would comment");
        } else {
            tickets
                .add_comment(&request.ticket_id, comment)
                .with_context(|| format!("comment on {}", request.ticket_id))?;
            info!(ticket = %request.ticket_id, "added comment");
        }
        closer.report.commented = true;
        return Ok(closer.report);
    }

    let ticket = tickets
        .get_task(&request.ticket_id)
        .with_context(|| format!("fetch ticket {}", request.ticket_id))?;
    let Some(parent_id) = ticket.parent.clone() else {
        bail!("ticket {} ({}) has no parent", ticket.id, ticket.name);
    };
    if ticket.status == TicketStatus::Closed {
        info!(ticket = %ticket.id, "ticket already closed; nothing to do");
        return Ok(closer.report);
    }

    closer.set_fields(
        &ticket,
        &[
            (FIELD_ARCHIVE_PATH, request.rsync_dir.clone()),
            (
                FIELD_PIPELINE_VERSION,
                format!("bic-rnaseq: {}", request.rnaseq_ver),
            ),
        ],
    )?;
    closer.close(&ticket)?;

    let parent = tickets
        .get_task(&parent_id)
        .with_context(|| format!("fetch parent {parent_id}"))?;
    let pipeline = config.pipeline(RNASEQ_PIPELINE)?;
    for sibling_id in select_siblings(&parent, &pipeline.siblings_to_start) {
        if sibling_id == ticket.id {
            continue;
        }
        let sibling = tickets
            .get_task(&sibling_id)
            .with_context(|| format!("fetch sibling {sibling_id}"))?;
        if sibling.status == TicketStatus::Closed {
            continue;
        }
        let mut fields = vec![(FIELD_ARCHIVE_PATH, request.rsync_dir.clone())];
        if let Some(diff_ver) = &request.diff_ver {
            fields.push((
                FIELD_PIPELINE_VERSION,
                format!("bic-differentialabundance: {diff_ver}"),
            ));
        }
        closer.set_fields(&sibling, &fields)?;
        closer.close(&sibling)?;
    }

    closer.set_fields(&parent, &[(FIELD_DELIVERY_PATH, request.del_path.clone())])?;
    info!(
        ticket = %ticket.id,
        closed = closer.report.closed.len(),
        fields = closer.report.fields_set.len(),
        dry_run = request.dry_run,
        "close finished"
    );
    Ok(closer.report)
}

impl<T: TicketApi> Closer<'_, T> {
    /// Write each field whose current value differs from the target.
    fn set_fields(&mut self, ticket: &Ticket, fields: &[(&str, String)]) -> Result<()> {
        for (name, value) in fields {
            if ticket.field_value(name) == Some(value.as_str()) {
                info!(ticket = %ticket.id, field = %name, "field already set");
                continue;
            }
            let field_id = self.config.field_id(name)?;
            if self.dry_run {
                info!(ticket = %ticket.id, field = %name, value = %value, "dry run: would set field");
            } else {
                self.tickets
                    .set_custom_field(&ticket.id, field_id, Value::String(value.clone()))
                    .with_context(|| format!("set {name} on {}", ticket.id))?;
                info!(ticket = %ticket.id, field = %name, value = %value, "set field");
            }
            self.report
                .fields_set
                .push((ticket.id.clone(), (*name).to_string()));
        }
        Ok(())
    }

    fn close(&mut self, ticket: &Ticket) -> Result<()> {
        if self.dry_run {
            info!(ticket = %ticket.id, name = %ticket.name, "dry run: would close");
        } else {
            self.tickets
                .update_status(&ticket.id, &TicketStatus::Closed)
                .with_context(|| format!("close {}", ticket.id))?;
            info!(ticket = %ticket.id, name = %ticket.name, "closed");
        }
        self.report.closed.push(ticket.id.clone());
        Ok(())
    }
}
