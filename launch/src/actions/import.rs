//! Hand a ready project over to the pipeline's import script.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use super::{ActionContext, Outcome};
use crate::core::eligibility::FIELD_PROJECT_FOLDER;
use crate::core::ticket::{Ticket, TicketStatus};
use crate::core::types::{Gate, Rejection};
use crate::io::clickup::TicketApi;
use crate::io::config::FIELD_BLOCK_AUTO_IMPORT;
use crate::io::glob::glob_in;
use crate::io::notify::Notifier;
use crate::io::process::{CommandRunner, CommandSpec};

/// Run the import script for a ticket in "ready for pipeline".
///
/// Every refusal alerts the operator and sets `Block Auto Import`, so the
/// ticket is left alone until someone clears it. A successful import moves
/// the ticket to "submitted to pipeline", which makes repeat calls no-ops.
pub fn import_project<T: TicketApi, N: Notifier, R: CommandRunner>(
    ctx: &ActionContext<'_, T, N, R>,
    ticket: &Ticket,
) -> Result<Outcome> {
    if ticket.status != TicketStatus::ReadyForPipeline {
        return Ok(Outcome::NotEligible(format!(
            "status is '{}', not 'ready for pipeline'",
            ticket.status
        )));
    }
    if ticket.field(FIELD_BLOCK_AUTO_IMPORT).is_some_and(|f| f.is_true()) {
        return Ok(Outcome::NotEligible("auto import is blocked".to_string()));
    }
    let block_id = ctx.config.field_id(FIELD_BLOCK_AUTO_IMPORT)?;
    let script = ctx
        .pipeline
        .import_script
        .as_ref()
        .ok_or_else(|| anyhow!("pipeline has no import_script configured"))?;

    let request_file = match locate_request_file(ctx, ticket)? {
        Ok(path) => path,
        Err(rejection) => return block(ctx, ticket, block_id, rejection),
    };

    let spec = CommandSpec::new(script.display().to_string(), ctx.pipeline.script_timeout())
        .arg(request_file.display().to_string());
    info!(ticket = %ticket.id, command = %spec.display(), "running import script");
    let result = ctx.runner.run(&spec);

    let output = match &result {
        Ok(out) => out.combined_text(),
        Err(err) => err.output_text(),
    };
    // A lost comment must not keep an imported project out of "submitted".
    if let Err(err) = ctx
        .tickets
        .add_comment(&ticket.id, &format!("Import script output:\n{output}"))
    {
        warn!(ticket = %ticket.id, err = %err, "could not post import script output");
    }

    if let Err(err) = result {
        let rejection = Rejection::new(
            Gate::ImportScript,
            format!("Import failed for {}", ticket.name),
            format!(
                "{} failed for {}: {err}\n{output}",
                spec.display(),
                ticket.name
            ),
        );
        return block(ctx, ticket, block_id, rejection);
    }

    ctx.tickets
        .update_status(&ticket.id, &TicketStatus::SubmittedToPipeline)
        .with_context(|| format!("set status of {}", ticket.id))?;
    info!(ticket = %ticket.id, "project imported");
    Ok(Outcome::Done)
}

/// The single request file inside the ticket's project folder.
fn locate_request_file<T: TicketApi, N: Notifier, R: CommandRunner>(
    ctx: &ActionContext<'_, T, N, R>,
    ticket: &Ticket,
) -> Result<Result<PathBuf, Rejection>> {
    let Some(folder) = ticket.field_value(FIELD_PROJECT_FOLDER) else {
        return Ok(Err(Rejection::new(
            Gate::ProjectFolder,
            format!("No project folder for {}", ticket.name),
            format!("Task {} has no {FIELD_PROJECT_FOLDER} value.", ticket.name),
        )));
    };
    let folder = Path::new(folder);
    if !folder.is_dir() {
        return Ok(Err(Rejection::new(
            Gate::ProjectFolder,
            format!("Project folder missing for {}", ticket.name),
            format!("Project folder {} does not exist.", folder.display()),
        )));
    }

    let mut matches = glob_in(folder, &ctx.pipeline.request_file_glob)?;
    if matches.len() != 1 {
        let found = matches
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Ok(Err(Rejection::new(
            Gate::RequestFile,
            format!("Request file not unique for {}", ticket.name),
            format!(
                "Expected exactly one {} in {}, found {}: [{found}]",
                ctx.pipeline.request_file_glob,
                folder.display(),
                matches.len()
            ),
        )));
    }
    Ok(Ok(matches.remove(0)))
}

fn block<T: TicketApi, N: Notifier, R: CommandRunner>(
    ctx: &ActionContext<'_, T, N, R>,
    ticket: &Ticket,
    block_id: &str,
    rejection: Rejection,
) -> Result<Outcome> {
    let mut body = rejection.detail.clone();
    if !ctx.config.manual_import_script.is_empty() {
        body.push_str(&format!(
            "\n\nImport manually with {} once the problem is fixed, then clear {FIELD_BLOCK_AUTO_IMPORT}.",
            ctx.config.manual_import_script
        ));
    }
    ctx.alerter()
        .raise(&ticket.id, block_id, &rejection.subject, &body)?;
    Ok(Outcome::Rejected(rejection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FakeTickets, RecordingNotifier, ScriptedRunner, field_uuid, sample_config, ticket,
    };
    use serde_json::Value;
    use std::fs;

    struct Setup {
        temp: tempfile::TempDir,
        tickets: FakeTickets,
        notifier: RecordingNotifier,
        runner: ScriptedRunner,
    }

    impl Setup {
        fn new(request: Ticket) -> Self {
            Self {
                temp: tempfile::tempdir().expect("tempdir"),
                tickets: FakeTickets::new([request]),
                notifier: RecordingNotifier::new(),
                runner: ScriptedRunner::new(),
            }
        }

        fn run(&self) -> Outcome {
            let config = sample_config(self.temp.path()).expect("config");
            let ctx = ActionContext {
                config: &config,
                pipeline: config.pipeline("RNASEQ").expect("pipeline"),
                tickets: &self.tickets,
                notifier: &self.notifier,
                runner: &self.runner,
            };
            let current = self.tickets.ticket("t1").expect("t1");
            import_project(&ctx, &current).expect("import")
        }
    }

    fn ready(folder: &Path) -> Ticket {
        ticket("t1", "#REQUEST:RNASEQ ProjectX")
            .status(TicketStatus::ReadyForPipeline)
            .field(FIELD_PROJECT_FOLDER, &folder.display().to_string())
            .empty_field(FIELD_BLOCK_AUTO_IMPORT)
            .build()
    }

    fn project_with_request(root: &Path) -> PathBuf {
        let folder = root.join("ProjectX");
        fs::create_dir_all(&folder).expect("mkdir");
        fs::write(folder.join("Proj_12345_request.txt"), "Build: hg38\n").expect("write");
        folder
    }

    #[test]
    fn successful_import_submits_and_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let folder = project_with_request(temp.path());
        let setup = Setup::new(ready(&folder));
        setup.runner.push_output("imported 3 samples");

        assert_eq!(setup.run(), Outcome::Done);
        assert_eq!(
            setup.tickets.statuses("t1"),
            vec![TicketStatus::SubmittedToPipeline]
        );
        assert_eq!(
            setup.tickets.comments("t1"),
            vec!["Import script output:\nimported 3 samples"]
        );
        let calls = setup.runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "/opt/bic/import.sh");
        assert_eq!(
            calls[0].args,
            vec![folder.join("Proj_12345_request.txt").display().to_string()]
        );

        // Second pass sees "submitted to pipeline" and does nothing.
        assert!(matches!(setup.run(), Outcome::NotEligible(_)));
        assert_eq!(setup.runner.calls().len(), 1);
        assert!(setup.notifier.sent().is_empty());
    }

    #[test]
    fn missing_project_folder_alerts_and_blocks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let setup = Setup::new(ready(&temp.path().join("absent")));

        let outcome = setup.run();

        let Outcome::Rejected(rejection) = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert_eq!(rejection.gate, Gate::ProjectFolder);
        assert_eq!(
            setup.tickets.field_writes("t1"),
            vec![(field_uuid(FIELD_BLOCK_AUTO_IMPORT), Value::Bool(true))]
        );
        let sent = setup.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("/opt/bic/manual_import.sh"));
        assert!(setup.runner.calls().is_empty());

        // Blocked now; the next poll stays quiet.
        assert!(matches!(setup.run(), Outcome::NotEligible(_)));
        assert_eq!(setup.notifier.sent().len(), 1);
    }

    #[test]
    fn ambiguous_request_file_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let folder = project_with_request(temp.path());
        fs::write(folder.join("Proj_99999_request.txt"), "").expect("write");
        let setup = Setup::new(ready(&folder));

        let Outcome::Rejected(rejection) = setup.run() else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.gate, Gate::RequestFile);
        assert!(rejection.detail.contains("found 2"));
    }

    #[test]
    fn failing_script_comments_output_then_blocks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let folder = project_with_request(temp.path());
        let setup = Setup::new(ready(&folder));
        setup.runner.push_failure(1, "sample sheet invalid");

        let Outcome::Rejected(rejection) = setup.run() else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.gate, Gate::ImportScript);
        assert_eq!(
            setup.tickets.comments("t1"),
            vec!["Import script output:\nsample sheet invalid"]
        );
        assert!(setup.tickets.statuses("t1").is_empty());
        assert_eq!(
            setup.tickets.field_writes("t1"),
            vec![(field_uuid(FIELD_BLOCK_AUTO_IMPORT), Value::Bool(true))]
        );
    }

    #[test]
    fn comment_failure_still_submits_imported_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        let folder = project_with_request(temp.path());
        let setup = Setup::new(ready(&folder));
        setup.runner.push_output("imported 3 samples");
        setup.tickets.fail_comments();

        assert_eq!(setup.run(), Outcome::Done);
        assert!(setup.tickets.comments("t1").is_empty());
        assert_eq!(
            setup.tickets.statuses("t1"),
            vec![TicketStatus::SubmittedToPipeline]
        );

        // Submitted, so the script is not run a second time.
        assert!(matches!(setup.run(), Outcome::NotEligible(_)));
        assert_eq!(setup.runner.calls().len(), 1);
    }

    #[test]
    fn other_statuses_are_not_eligible() {
        let temp = tempfile::tempdir().expect("tempdir");
        let folder = project_with_request(temp.path());
        let mut to_do = ready(&folder);
        to_do.status = TicketStatus::ToDo;
        let setup = Setup::new(to_do);

        assert!(matches!(setup.run(), Outcome::NotEligible(_)));
        assert!(setup.tickets.calls().is_empty());
    }
}
