//! Orchestration for `launch start-runs`.
//!
//! For every configured pipeline: list the to-do subtasks assigned to the
//! automation user, run the eligibility gates, and for each ticket that passes
//! materialize the run directory, generate the pipeline inputs, queue the
//! launch command, and move the ticket family to "in progress".

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::alert::Alerter;
use crate::core::eligibility::{plan_run, screen_candidate};
use crate::core::ticket::{Ticket, TicketStatus};
use crate::core::types::{Gate, Rejection, RunPlan};
use crate::io::clickup::{TaskQuery, TicketApi};
use crate::io::config::{
    AutomationConfig, FIELD_ARCHIVE_PATH, FIELD_EMAIL_ALERTED, FIELD_RUN_PATH, PipelineConfig,
};
use crate::io::glob::glob_in;
use crate::io::notify::Notifier;
use crate::io::process::{CommandRunner, CommandSpec};
use crate::io::queue::{JobQueue, QueueError};
use crate::io::workdir::materialize_run_dir;

/// Summary of one `start-runs` pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// Ids of tickets whose runs were queued.
    pub started: Vec<String>,
    /// `(ticket id, rejection)` for every alerted refusal.
    pub rejected: Vec<(String, Rejection)>,
    /// Candidates silently passed over.
    pub skipped: usize,
    /// Tickets whose processing failed with an unexpected error.
    pub failed: usize,
}

enum Candidate {
    Started,
    Rejected(Rejection),
}

/// Poll every pipeline list and start the eligible runs.
///
/// Per-ticket failures are logged and counted; only listing failures and an
/// exhausted queue lock end the pass early.
pub fn start_runs<T: TicketApi, N: Notifier, R: CommandRunner>(
    config: &AutomationConfig,
    tickets: &T,
    notifier: &N,
    runner: &R,
    queue: &JobQueue,
) -> Result<StartReport> {
    let mut report = StartReport::default();
    let query = TaskQuery {
        assignees: vec![config.clickup.user_id],
        statuses: vec![TicketStatus::ToDo.as_str().to_string()],
        include_closed: false,
        subtasks: true,
    };

    for (name, pipeline) in &config.pipelines {
        let candidates = tickets
            .list_tasks(&pipeline.list_id, &query)
            .with_context(|| format!("list tasks of pipeline {name}"))?;
        debug!(pipeline = %name, count = candidates.len(), "fetched candidates");
        let policy = pipeline.start_policy(config.clickup.user_id);

        for ticket in &candidates {
            let parent_id = match screen_candidate(ticket, &policy) {
                Ok(parent_id) => parent_id,
                Err(skip) => {
                    debug!(ticket = %ticket.id, pipeline = %name, reason = %skip, "skipped");
                    report.skipped += 1;
                    continue;
                }
            };

            let run = StartRun {
                config,
                pipeline,
                tickets,
                notifier,
                runner,
                queue,
            };
            match run.process(ticket, parent_id) {
                Ok(Candidate::Started) => report.started.push(ticket.id.clone()),
                Ok(Candidate::Rejected(rejection)) => {
                    report.rejected.push((ticket.id.clone(), rejection));
                }
                Err(err) if is_lock_exhausted(&err) => return Err(err),
                Err(err) => {
                    error!(ticket = %ticket.id, pipeline = %name, err = %format!("{err:#}"), "failed to start run");
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        started = report.started.len(),
        rejected = report.rejected.len(),
        skipped = report.skipped,
        failed = report.failed,
        "start-runs finished"
    );
    Ok(report)
}

fn is_lock_exhausted(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<QueueError>(),
        Some(QueueError::LockExhausted { .. })
    )
}

struct StartRun<'a, T: TicketApi, N: Notifier, R: CommandRunner> {
    config: &'a AutomationConfig,
    pipeline: &'a PipelineConfig,
    tickets: &'a T,
    notifier: &'a N,
    runner: &'a R,
    queue: &'a JobQueue,
}

impl<T: TicketApi, N: Notifier, R: CommandRunner> StartRun<'_, T, N, R> {
    fn process(&self, ticket: &Ticket, parent_id: &str) -> Result<Candidate> {
        let alert_id = self.config.field_id(FIELD_EMAIL_ALERTED)?;
        let alerter = Alerter::new(self.tickets, self.notifier);
        let parent = self
            .tickets
            .get_task(parent_id)
            .with_context(|| format!("fetch parent {parent_id} of {}", ticket.id))?;

        let policy = self.pipeline.start_policy(self.config.clickup.user_id);
        let plan = match plan_run(ticket, &parent, &policy, Path::exists) {
            Ok(plan) => plan,
            Err(rejection) => {
                alerter.reject(&ticket.id, alert_id, &rejection)?;
                return Ok(Candidate::Rejected(rejection));
            }
        };

        let request_file = match self.prepare(&plan)? {
            Ok(request_file) => request_file,
            Err(rejection) => {
                alerter.reject(&ticket.id, alert_id, &rejection)?;
                return Ok(Candidate::Rejected(rejection));
            }
        };

        let command = render_launch_command(
            &self.pipeline.launch_command,
            &plan,
            &self.pipeline.launch_script,
            &request_file,
            &self.config.notify.email,
            &self.pipeline.rsync_dir,
        )?;
        if let Err(err) = self.queue.append(&command) {
            if matches!(err, QueueError::LockExhausted { .. }) {
                alerter.send(
                    "Job queue is locked",
                    &format!(
                        "Could not queue the run for {}: {err}\n\nCommand:\n{command}",
                        plan.ticket_name
                    ),
                );
            }
            return Err(err.into());
        }
        info!(ticket = %plan.ticket_id, queue = %self.queue.path().display(), "launch command queued");

        self.mark_started(&plan)?;
        alerter.send(
            &format!("Pipeline started for task {}", plan.ticket_name),
            &start_summary(&plan, &command),
        );
        Ok(Candidate::Started)
    }

    /// Create the run directory and its inputs; returns the request file.
    fn prepare(&self, plan: &RunPlan) -> Result<Result<PathBuf, Rejection>> {
        let folder = &plan.fields.project_folder;
        if !folder.is_dir() {
            return Ok(Err(Rejection::new(
                Gate::ProjectFolder,
                format!("Project folder missing for {}", plan.ticket_name),
                format!(
                    "Project folder {} of {} does not exist. You must do this manually.",
                    folder.display(),
                    plan.project_name
                ),
            )));
        }
        materialize_run_dir(&plan.run_path, folder, &plan.ticket_id)?;
        info!(ticket = %plan.ticket_id, run_path = %plan.run_path.display(), "run directory created");

        if let Some(script) = &self.pipeline.create_nf_files
            && let Err(rejection) = self.create_nf_files(script, plan)?
        {
            return Ok(Err(rejection));
        }

        let mut requests = glob_in(&plan.run_path, &self.pipeline.request_file_glob)?;
        if requests.len() != 1 {
            return Ok(Err(Rejection::new(
                Gate::RequestFile,
                format!("Request file not unique for {}", plan.ticket_name),
                format!(
                    "Expected exactly one {} in {}, found {}. You must do this manually.",
                    self.pipeline.request_file_glob,
                    plan.run_path.display(),
                    requests.len()
                ),
            )));
        }
        Ok(Ok(requests.remove(0)))
    }

    fn create_nf_files(&self, script: &Path, plan: &RunPlan) -> Result<Result<(), Rejection>> {
        let mut mappings = glob_in(&plan.run_path, &self.pipeline.mapping_glob)?;
        if mappings.len() != 1 {
            return Ok(Err(Rejection::new(
                Gate::MappingFile,
                format!("Mapping file not unique for {}", plan.ticket_name),
                format!(
                    "Expected exactly one {} in {}, found {}. You must do this manually.",
                    self.pipeline.mapping_glob,
                    plan.run_path.display(),
                    mappings.len()
                ),
            )));
        }
        let mapping = mappings.remove(0);
        let keys = optional_matches(self.pipeline.sample_key_glob.as_deref(), &plan.run_path)?;
        let comparisons =
            optional_matches(self.pipeline.sample_comp_glob.as_deref(), &plan.run_path)?;

        let spec = create_nf_files_command(
            script,
            &mapping,
            plan,
            &keys,
            &comparisons,
            self.pipeline.script_timeout(),
        );
        info!(ticket = %plan.ticket_id, command = %spec.display(), "generating pipeline inputs");
        match self.runner.run(&spec) {
            Ok(_) => Ok(Ok(())),
            Err(err) => {
                warn!(ticket = %plan.ticket_id, err = %err, "input generation failed");
                Ok(Err(Rejection::new(
                    Gate::CreateNfFiles,
                    format!("Creating pipeline files failed for {}", plan.ticket_name),
                    format!(
                        "{} failed: {err}\n{}\nYou must do this manually.",
                        spec.display(),
                        err.output_text()
                    ),
                )))
            }
        }
    }

    /// Move the ticket, its parent and the siblings to "in progress" and stamp the paths.
    fn mark_started(&self, plan: &RunPlan) -> Result<()> {
        let run_path_id = self.config.field_id(FIELD_RUN_PATH)?;
        let archive_path_id = self.config.field_id(FIELD_ARCHIVE_PATH)?;
        let run_path = Value::String(plan.run_path.display().to_string());
        let archive_path = Value::String(plan.archive_path.clone());

        let in_progress = TicketStatus::InProgress;
        self.tickets
            .update_status(&plan.parent_id, &in_progress)
            .with_context(|| format!("set status of parent {}", plan.parent_id))?;

        let family = std::iter::once(&plan.ticket_id)
            .chain(plan.siblings.iter().filter(|id| **id != plan.ticket_id));
        for id in family {
            self.tickets
                .update_status(id, &in_progress)
                .with_context(|| format!("set status of {id}"))?;
            self.tickets
                .set_custom_field(id, run_path_id, run_path.clone())
                .with_context(|| format!("set {FIELD_RUN_PATH} on {id}"))?;
            self.tickets
                .set_custom_field(id, archive_path_id, archive_path.clone())
                .with_context(|| format!("set {FIELD_ARCHIVE_PATH} on {id}"))?;
        }
        Ok(())
    }
}

fn optional_matches(pattern: Option<&str>, dir: &Path) -> Result<Vec<PathBuf>> {
    match pattern {
        Some(pattern) => glob_in(dir, pattern),
        None => Ok(Vec::new()),
    }
}

/// argv for the input generator:
/// `<script> -m <mapping> -s <strand> -b <build> --dir <run> [--key ...] [--comparisons ...]`.
pub fn create_nf_files_command(
    script: &Path,
    mapping: &Path,
    plan: &RunPlan,
    keys: &[PathBuf],
    comparisons: &[PathBuf],
    timeout: Duration,
) -> CommandSpec {
    let mut spec = CommandSpec::new(script.display().to_string(), timeout)
        .arg("-m")
        .arg(mapping.display().to_string())
        .arg("-s")
        .arg(plan.fields.strand.as_str())
        .arg("-b")
        .arg(plan.fields.build.as_str())
        .arg("--dir")
        .arg(plan.run_path.display().to_string())
        .current_dir(&plan.run_path);
    if !keys.is_empty() {
        spec = spec
            .arg("--key")
            .args(keys.iter().map(|p| p.display().to_string()));
    }
    if !comparisons.is_empty() {
        spec = spec
            .arg("--comparisons")
            .args(comparisons.iter().map(|p| p.display().to_string()));
    }
    spec
}

/// Render the queue line from the pipeline's `launch_command` template.
pub fn render_launch_command(
    template: &str,
    plan: &RunPlan,
    script: &Path,
    request_file: &Path,
    email: &str,
    rsync_dir: &str,
) -> Result<String> {
    let env = Environment::new();
    let rendered = env
        .render_str(
            template,
            context! {
                script => script.display().to_string(),
                request_file => request_file.display().to_string(),
                run_path => plan.run_path.display().to_string(),
                email => email,
                rsync_dir => rsync_dir,
                project => plan.project_name.as_str(),
                build => plan.fields.build.as_str(),
                strand => plan.fields.strand.as_str(),
                run_number => plan.fields.run_number.as_str(),
            },
        )
        .context("render launch_command")?;
    let line = rendered.trim();
    if line.is_empty() || line.contains('\n') {
        return Err(anyhow!("launch_command must render to a single non-empty line"));
    }
    Ok(line.to_string())
}

fn start_summary(plan: &RunPlan, command: &str) -> String {
    format!(
        "Project: {}\nTask: {} ({})\nBuild: {}\nStrand: {}\nRun number: {}\nRun path: {}\nArchive path: {}\nSiblings started: {}\n\nQueued command:\n{command}",
        plan.project_name,
        plan.ticket_name,
        plan.ticket_id,
        plan.fields.build,
        plan.fields.strand,
        plan.fields.run_number,
        plan.run_path.display(),
        plan.archive_path,
        plan.siblings.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ParentFields;

    fn plan() -> RunPlan {
        RunPlan {
            ticket_id: "t1".to_string(),
            ticket_name: "ProjectX - Counts".to_string(),
            parent_id: "p1".to_string(),
            project_name: "ProjectX".to_string(),
            fields: ParentFields {
                project_folder: PathBuf::from("/projects/ProjectX"),
                build: "hg38".to_string(),
                strand: "unstranded".to_string(),
                run_number: "1".to_string(),
                comments: None,
            },
            run_path: PathBuf::from("/work/ProjectX"),
            archive_path: "/archive/ProjectX".to_string(),
            archive_run_path: PathBuf::from("/archive/ProjectX/r_001"),
            siblings: vec!["s1".to_string()],
        }
    }

    #[test]
    fn default_template_reproduces_launch_line() {
        let line = render_launch_command(
            crate::io::config::DEFAULT_LAUNCH_COMMAND,
            &plan(),
            Path::new("/opt/launch.sh"),
            Path::new("/work/ProjectX/Proj_request.txt"),
            "ops@example.org",
            "archive01:/archive",
        )
        .expect("render");
        assert_eq!(
            line,
            "/opt/launch.sh /work/ProjectX/Proj_request.txt /work/ProjectX ops@example.org archive01:/archive > /work/ProjectX/start_pipeline.log 2>&1"
        );
    }

    #[test]
    fn multi_line_template_is_refused() {
        let err = render_launch_command(
            "{{ script }}\n{{ run_path }}",
            &plan(),
            Path::new("/opt/launch.sh"),
            Path::new("/r.txt"),
            "ops@example.org",
            "/archive",
        )
        .expect_err("multi-line");
        assert!(err.to_string().contains("single"));
    }

    #[test]
    fn create_nf_files_argv_lists_keys_and_comparisons() {
        let spec = create_nf_files_command(
            Path::new("/opt/create_nf_files.sh"),
            Path::new("/work/ProjectX/Proj_sample_mapping.txt"),
            &plan(),
            &[PathBuf::from("/work/ProjectX/a_sample_key.xlsx")],
            &[
                PathBuf::from("/work/ProjectX/a_sample_comparisons.xlsx"),
                PathBuf::from("/work/ProjectX/b_sample_comparisons.xlsx"),
            ],
            Duration::from_secs(5),
        );
        assert_eq!(
            spec.args,
            vec![
                "-m",
                "/work/ProjectX/Proj_sample_mapping.txt",
                "-s",
                "unstranded",
                "-b",
                "hg38",
                "--dir",
                "/work/ProjectX",
                "--key",
                "/work/ProjectX/a_sample_key.xlsx",
                "--comparisons",
                "/work/ProjectX/a_sample_comparisons.xlsx",
                "/work/ProjectX/b_sample_comparisons.xlsx",
            ]
        );
        assert_eq!(spec.workdir, Some(PathBuf::from("/work/ProjectX")));
    }

    #[test]
    fn optional_inputs_are_omitted_when_absent() {
        let spec = create_nf_files_command(
            Path::new("/opt/create_nf_files.sh"),
            Path::new("/m.txt"),
            &plan(),
            &[],
            &[],
            Duration::from_secs(5),
        );
        assert!(!spec.args.iter().any(|a| a == "--key" || a == "--comparisons"));
    }
}
