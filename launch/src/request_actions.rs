//! Orchestration for `launch request-actions`.

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::actions::{ActionContext, Outcome, run_action};
use crate::core::classifier::classify;
use crate::core::types::Action;
use crate::io::clickup::{TaskQuery, TicketApi};
use crate::io::config::AutomationConfig;
use crate::io::notify::Notifier;
use crate::io::process::CommandRunner;

/// Summary of one `request-actions` pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestReport {
    /// Open tickets seen in the request list.
    pub examined: usize,
    /// Tickets whose title matched a configured route.
    pub matched: usize,
    /// `(ticket id, action, outcome)` for every action that returned.
    pub outcomes: Vec<(String, Action, Outcome)>,
    /// Actions that failed with an error.
    pub failures: usize,
}

/// Run the configured actions for every open ticket in the request list.
///
/// A failing action is logged and counted; the remaining actions and tickets
/// still run. Only a failure to list the tickets ends the pass.
pub fn request_actions<T: TicketApi, N: Notifier, R: CommandRunner>(
    config: &AutomationConfig,
    tickets: &T,
    notifier: &N,
    runner: &R,
) -> Result<RequestReport> {
    let query = TaskQuery {
        include_closed: false,
        ..TaskQuery::default()
    };
    let open = tickets
        .list_tasks(&config.clickup.request_list_id, &query)
        .with_context(|| format!("list request tickets in {}", config.clickup.request_list_id))?;

    let mut report = RequestReport {
        examined: open.len(),
        ..RequestReport::default()
    };
    for ticket in &open {
        let Some(route) = classify(&ticket.name, &config.requests) else {
            debug!(ticket = %ticket.id, name = %ticket.name, "not a pipeline request");
            continue;
        };
        report.matched += 1;

        let pipeline = match config.pipeline(&route.pipeline) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                error!(ticket = %ticket.id, err = %err, "request route has no pipeline");
                report.failures += 1;
                continue;
            }
        };
        let ctx = ActionContext {
            config,
            pipeline,
            tickets,
            notifier,
            runner,
        };

        for &action in &route.actions {
            // Later actions see the writes of earlier ones.
            let current = match tickets.get_task(&ticket.id) {
                Ok(current) => current,
                Err(err) => {
                    error!(ticket = %ticket.id, %action, err = %err, "failed to refresh ticket");
                    report.failures += 1;
                    continue;
                }
            };
            match run_action(action, &ctx, &current) {
                Ok(outcome) => {
                    info!(ticket = %ticket.id, pipeline = %route.pipeline, %action, %outcome, "action finished");
                    report.outcomes.push((ticket.id.clone(), action, outcome));
                }
                Err(err) => {
                    error!(ticket = %ticket.id, pipeline = %route.pipeline, %action, err = %format!("{err:#}"), "action failed");
                    report.failures += 1;
                }
            }
        }
    }

    info!(
        examined = report.examined,
        matched = report.matched,
        failures = report.failures,
        "request-actions finished"
    );
    Ok(report)
}
