//! Per-request actions run by `request-actions`.
//!
//! Routes name their actions in configuration; [`run_action`] maps each
//! [`Action`] to its implementation with an exhaustive match, so adding a
//! variant without a handler does not compile.

mod fastq;
mod import;
mod tag;

use std::fmt;

use anyhow::Result;

use crate::alert::Alerter;
use crate::core::ticket::Ticket;
use crate::core::types::{Action, Rejection};
use crate::io::clickup::TicketApi;
use crate::io::config::{AutomationConfig, PipelineConfig};
use crate::io::notify::Notifier;
use crate::io::process::CommandRunner;

pub use fastq::check_fastq;
pub use import::import_project;
pub use tag::tag_project;

/// Collaborators shared by every action of one `request-actions` pass.
pub struct ActionContext<'a, T: TicketApi, N: Notifier, R: CommandRunner> {
    pub config: &'a AutomationConfig,
    pub pipeline: &'a PipelineConfig,
    pub tickets: &'a T,
    pub notifier: &'a N,
    pub runner: &'a R,
}

impl<'a, T: TicketApi, N: Notifier, R: CommandRunner> ActionContext<'a, T, N, R> {
    pub fn alerter(&self) -> Alerter<'a, T, N> {
        Alerter::new(self.tickets, self.notifier)
    }
}

/// What an action did to one ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// A marker shows the work was already done.
    AlreadyDone,
    /// Preconditions do not hold yet; looked at again next poll.
    NotEligible(String),
    /// Alerted and blocked until an operator clears the marker.
    Rejected(Rejection),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::AlreadyDone => f.write_str("already done"),
            Self::NotEligible(reason) => write!(f, "not eligible: {reason}"),
            Self::Rejected(rejection) => write!(f, "rejected: {rejection}"),
        }
    }
}

pub fn run_action<T: TicketApi, N: Notifier, R: CommandRunner>(
    action: Action,
    ctx: &ActionContext<'_, T, N, R>,
    ticket: &Ticket,
) -> Result<Outcome> {
    match action {
        Action::CheckFastq => check_fastq(ctx, ticket),
        Action::ImportProject => import_project(ctx, ticket),
        Action::TagProject => tag_project(ctx, ticket),
    }
}
