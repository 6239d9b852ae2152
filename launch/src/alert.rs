//! Operator alerts that stick.
//!
//! A user-visible failure is emailed to the operator and recorded in a
//! checkbox field on the ticket. The next poll sees the checkbox and stays
//! quiet until an operator clears it.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{error, warn};

use crate::core::types::Rejection;
use crate::io::clickup::TicketApi;
use crate::io::notify::Notifier;

pub struct Alerter<'a, T: TicketApi, N: Notifier> {
    tickets: &'a T,
    notifier: &'a N,
}

impl<'a, T: TicketApi, N: Notifier> Alerter<'a, T, N> {
    pub fn new(tickets: &'a T, notifier: &'a N) -> Self {
        Self { tickets, notifier }
    }

    /// Log, email, and set `marker_field_id` to true on `ticket_id`.
    ///
    /// A failed email is logged but does not prevent the marker write.
    pub fn raise(&self, ticket_id: &str, marker_field_id: &str, subject: &str, body: &str) -> Result<()> {
        error!(ticket = ticket_id, "{subject}");
        self.send(subject, body);
        self.tickets
            .set_custom_field(ticket_id, marker_field_id, Value::Bool(true))
            .with_context(|| format!("set alert marker on {ticket_id}"))?;
        Ok(())
    }

    pub fn reject(&self, ticket_id: &str, marker_field_id: &str, rejection: &Rejection) -> Result<()> {
        self.raise(ticket_id, marker_field_id, &rejection.subject, &rejection.detail)
    }

    /// Email without touching the ticket (start notices, queue failures).
    pub fn send(&self, subject: &str, body: &str) {
        if let Err(err) = self.notifier.notify(subject, body) {
            warn!(err = %format!("{err:#}"), subject, "failed to email operator");
        }
    }
}
