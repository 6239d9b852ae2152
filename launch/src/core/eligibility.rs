//! Run-start eligibility gates.
//!
//! A ticket moves through a fixed chain of gates:
//!
//! ```text
//! candidate -> parent-checked -> fields-extracted -> path-checked -> archive-checked -> started
//! ```
//!
//! Gates 1-4 ([`screen_candidate`]) are silent: a failing ticket is simply not
//! eligible on this poll. Gates 5-8 ([`plan_run`]) produce a [`Rejection`]
//! that the caller alerts on and marks, so the ticket is not retried until an
//! operator clears the marker. Both functions are pure; filesystem existence
//! checks go through the `exists` probe.

use std::path::{Path, PathBuf};

use crate::core::paths::{archive_run_path, project_archive_path, run_path};
use crate::core::ticket::{Ticket, TicketStatus};
use crate::core::types::{Gate, ParentFields, Rejection, RunPlan, Skip};

pub const FIELD_PROJECT_FOLDER: &str = "ProjectFolder";
pub const FIELD_BUILD: &str = "Build";
pub const FIELD_STRAND: &str = "Strand";
pub const FIELD_RUN_NUMBER: &str = "RunNumber";
pub const FIELD_COMMENTS: &str = "Comments";

/// Pipeline-specific inputs to the start gates.
#[derive(Debug, Clone)]
pub struct StartPolicy<'a> {
    /// Automation user the ticket must be assigned to.
    pub user_id: u64,
    /// List the ticket must belong to.
    pub list_id: &'a str,
    /// Accepted ticket-name suffixes.
    pub acceptable_tickets: &'a [String],
    /// Suffixes of sibling subtasks that start together with the ticket.
    pub siblings_to_start: &'a [String],
    /// Marker in the parent's comments that reserves the project for a manual run.
    pub manual_pipeline_comment: &'a str,
    pub work_dir: &'a Path,
    /// rsync destination, `host:path` or a plain path.
    pub rsync_dir: &'a str,
    /// Display name of the "already alerted" checkbox.
    pub alert_field: &'a str,
}

/// Gates 1-4. Returns the parent id of an eligible candidate.
pub fn screen_candidate<'t>(ticket: &'t Ticket, policy: &StartPolicy<'_>) -> Result<&'t str, Skip> {
    // Gate 1: to-do, assigned to automation, in the pipeline's list.
    if ticket.status != TicketStatus::ToDo {
        return Err(Skip::NotToDo {
            status: ticket.status.to_string(),
        });
    }
    if !ticket.is_assigned_to(policy.user_id) {
        return Err(Skip::NotAssigned);
    }
    if ticket.list_id.as_deref() != Some(policy.list_id) {
        return Err(Skip::WrongList);
    }

    // Gate 2
    if !ends_with_any(&ticket.name, policy.acceptable_tickets) {
        return Err(Skip::NameNotAcceptable);
    }

    // Gate 3
    let parent_id = ticket.parent.as_deref().ok_or(Skip::NoParent)?;

    // Gate 4
    let alerted = ticket.field(policy.alert_field).ok_or(Skip::NoAlertField)?;
    if alerted.is_true() {
        return Err(Skip::AlreadyAlerted);
    }

    Ok(parent_id)
}

/// Gate 5: read and normalize the run parameters from the parent ticket.
pub fn extract_parent_fields(parent: &Ticket) -> Result<ParentFields, Rejection> {
    let missing: Vec<&str> = [FIELD_PROJECT_FOLDER, FIELD_BUILD, FIELD_STRAND, FIELD_RUN_NUMBER]
        .into_iter()
        .filter(|name| parent.field_value(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(Rejection::new(
            Gate::ParentFields,
            format!("Parent task {} is missing fields", parent.name),
            format!(
                "Parent task {} has no value for: {}. You must do this manually.",
                parent.name,
                missing.join(", ")
            ),
        ));
    }

    // Checked non-empty above.
    let value = |name: &str| parent.field_value(name).unwrap_or_default().to_string();

    Ok(ParentFields {
        project_folder: PathBuf::from(value(FIELD_PROJECT_FOLDER)),
        build: value(FIELD_BUILD).to_lowercase(),
        strand: normalize_strand(&value(FIELD_STRAND)),
        run_number: value(FIELD_RUN_NUMBER),
        comments: parent.field_value(FIELD_COMMENTS).map(str::to_string),
    })
}

/// Lower-case the strandedness; the ticketing system's `None` means unstranded.
pub fn normalize_strand(raw: &str) -> String {
    let strand = raw.trim().to_lowercase();
    if strand == "none" {
        "unstranded".to_string()
    } else {
        strand
    }
}

/// Gates 5-8 for a screened candidate and its parent.
///
/// No filesystem state is touched: both the run path and the archive path are
/// checked through `exists` before anything is created.
pub fn plan_run(
    ticket: &Ticket,
    parent: &Ticket,
    policy: &StartPolicy<'_>,
    exists: impl Fn(&Path) -> bool,
) -> Result<RunPlan, Rejection> {
    // Gate 5
    let fields = extract_parent_fields(parent)?;

    // Gate 6
    if !policy.manual_pipeline_comment.is_empty()
        && fields
            .comments
            .as_deref()
            .is_some_and(|c| c.contains(policy.manual_pipeline_comment))
    {
        return Err(Rejection::new(
            Gate::ManualPipeline,
            format!("Task {} has a manual pipeline comment", ticket.name),
            format!(
                "Task {} has a manual pipeline comment. You must do this manually.",
                ticket.name
            ),
        ));
    }

    // The parent name becomes a directory under the work dir and the archive
    // root, and a word of the queue submission line.
    let project_name = parent.name.clone();
    if let Err(reason) = check_project_name(&project_name) {
        return Err(Rejection::new(
            Gate::ProjectName,
            format!("Parent task name {project_name:?} cannot name a run"),
            format!(
                "Parent task name {project_name:?} of {} {reason}. You must do this manually.",
                ticket.name
            ),
        ));
    }

    // Gate 7
    let run_path = run_path(policy.work_dir, &project_name);
    if exists(&run_path) {
        return Err(Rejection::new(
            Gate::RunPathExists,
            format!("Run path {} already exists", run_path.display()),
            format!(
                "Run path {} already exists. You must do this manually.",
                run_path.display()
            ),
        ));
    }

    // Gate 8
    let archive_run_path = archive_run_path(policy.rsync_dir, &project_name, &fields.run_number);
    if exists(&archive_run_path) {
        return Err(Rejection::new(
            Gate::ArchivePathExists,
            format!("Archive path {} already exists", archive_run_path.display()),
            format!(
                "Archive path {} already exists. You must do this manually.",
                archive_run_path.display()
            ),
        ));
    }

    Ok(RunPlan {
        ticket_id: ticket.id.clone(),
        ticket_name: ticket.name.clone(),
        parent_id: parent.id.clone(),
        archive_path: project_archive_path(policy.rsync_dir, &project_name),
        siblings: select_siblings(parent, policy.siblings_to_start),
        project_name,
        fields,
        run_path,
        archive_run_path,
    })
}

/// A project name must be one plain path component made of ASCII letters,
/// digits, `_`, `-` and `.`, not starting with `.`.
pub fn check_project_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("is empty".to_string());
    }
    if name.starts_with('/') {
        return Err("is an absolute path".to_string());
    }
    if name.contains('/') || name.contains("..") {
        return Err("is not a single path component".to_string());
    }
    if name.starts_with('.') {
        return Err("starts with a dot".to_string());
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(format!("contains the character {bad:?}"));
    }
    Ok(())
}

/// Ids of the parent's subtasks whose names end with one of `suffixes`.
pub fn select_siblings(parent: &Ticket, suffixes: &[String]) -> Vec<String> {
    parent
        .subtasks
        .iter()
        .filter(|subtask| ends_with_any(&subtask.name, suffixes))
        .map(|subtask| subtask.id.clone())
        .collect()
}

fn ends_with_any(name: &str, suffixes: &[String]) -> bool {
    let name = name.trim_end();
    suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ticket::{CustomField, SubtaskRef};

    const ALERT: &str = "Email Alerted";

    struct Fixture {
        acceptable: Vec<String>,
        siblings: Vec<String>,
        work_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                acceptable: vec!["- Counts".to_string()],
                siblings: vec!["- DE".to_string()],
                work_dir: PathBuf::from("/work"),
            }
        }

        fn policy(&self) -> StartPolicy<'_> {
            StartPolicy {
                user_id: 42,
                list_id: "list-rnaseq",
                acceptable_tickets: &self.acceptable,
                siblings_to_start: &self.siblings,
                manual_pipeline_comment: "MANUAL PIPELINE",
                work_dir: &self.work_dir,
                rsync_dir: "archive01:/archive",
                alert_field: ALERT,
            }
        }
    }

    fn field(name: &str, value: Option<&str>) -> CustomField {
        CustomField {
            id: format!("{name}-uuid"),
            name: name.to_string(),
            value: value.map(str::to_string),
        }
    }

    fn candidate() -> Ticket {
        Ticket {
            id: "t1".to_string(),
            name: "ProjectX - Counts".to_string(),
            status: TicketStatus::ToDo,
            list_id: Some("list-rnaseq".to_string()),
            assignees: vec![42],
            parent: Some("p1".to_string()),
            subtasks: Vec::new(),
            custom_fields: vec![field(ALERT, None)],
            tags: Vec::new(),
            description: String::new(),
        }
    }

    fn parent(strand: &str) -> Ticket {
        Ticket {
            id: "p1".to_string(),
            name: "ProjectX".to_string(),
            status: TicketStatus::ToDo,
            list_id: Some("list-rnaseq".to_string()),
            assignees: Vec::new(),
            parent: None,
            subtasks: vec![
                SubtaskRef {
                    id: "t1".to_string(),
                    name: "ProjectX - Counts".to_string(),
                    status: TicketStatus::ToDo,
                },
                SubtaskRef {
                    id: "t2".to_string(),
                    name: "ProjectX - DE".to_string(),
                    status: TicketStatus::ToDo,
                },
                SubtaskRef {
                    id: "t3".to_string(),
                    name: "ProjectX - Delivery".to_string(),
                    status: TicketStatus::ToDo,
                },
            ],
            custom_fields: vec![
                field(FIELD_PROJECT_FOLDER, Some("/projects/ProjectX")),
                field(FIELD_BUILD, Some("HG38")),
                field(FIELD_STRAND, Some(strand)),
                field(FIELD_RUN_NUMBER, Some("1")),
            ],
            tags: Vec::new(),
            description: String::new(),
        }
    }

    #[test]
    fn screen_accepts_eligible_candidate() {
        let fixture = Fixture::new();
        assert_eq!(screen_candidate(&candidate(), &fixture.policy()), Ok("p1"));
    }

    #[test]
    fn screen_skips_wrong_status_assignee_and_list() {
        let fixture = Fixture::new();
        let policy = fixture.policy();

        let mut ticket = candidate();
        ticket.status = TicketStatus::InProgress;
        assert!(matches!(
            screen_candidate(&ticket, &policy),
            Err(Skip::NotToDo { .. })
        ));

        let mut ticket = candidate();
        ticket.assignees = vec![7];
        assert_eq!(screen_candidate(&ticket, &policy), Err(Skip::NotAssigned));

        let mut ticket = candidate();
        ticket.list_id = Some("other".to_string());
        assert_eq!(screen_candidate(&ticket, &policy), Err(Skip::WrongList));
    }

    #[test]
    fn screen_requires_accepted_suffix() {
        let fixture = Fixture::new();
        let mut ticket = candidate();
        ticket.name = "ProjectX - Counts review".to_string();
        assert_eq!(
            screen_candidate(&ticket, &fixture.policy()),
            Err(Skip::NameNotAcceptable)
        );
    }

    #[test]
    fn screen_skips_without_parent() {
        let fixture = Fixture::new();
        let mut ticket = candidate();
        ticket.parent = None;
        assert_eq!(screen_candidate(&ticket, &fixture.policy()), Err(Skip::NoParent));
    }

    #[test]
    fn screen_skips_missing_or_set_alert_marker() {
        let fixture = Fixture::new();
        let mut ticket = candidate();
        ticket.custom_fields.clear();
        assert_eq!(
            screen_candidate(&ticket, &fixture.policy()),
            Err(Skip::NoAlertField)
        );

        let mut ticket = candidate();
        ticket.custom_fields = vec![field(ALERT, Some("true"))];
        assert_eq!(
            screen_candidate(&ticket, &fixture.policy()),
            Err(Skip::AlreadyAlerted)
        );
    }

    #[test]
    fn plan_normalizes_strand_none_to_unstranded() {
        let fixture = Fixture::new();
        let plan = plan_run(&candidate(), &parent("None"), &fixture.policy(), |_| false)
            .expect("plan");
        assert_eq!(plan.fields.strand, "unstranded");
        assert_eq!(plan.fields.build, "hg38");
    }

    #[test]
    fn plan_computes_deterministic_paths_and_siblings() {
        let fixture = Fixture::new();
        let plan = plan_run(&candidate(), &parent("Reverse"), &fixture.policy(), |_| false)
            .expect("plan");
        assert_eq!(plan.run_path, PathBuf::from("/work/ProjectX"));
        assert_eq!(plan.archive_path, "/archive/ProjectX");
        assert_eq!(plan.archive_run_path, PathBuf::from("/archive/ProjectX/r_001"));
        assert_eq!(plan.siblings, vec!["t2".to_string()]);
        assert_eq!(plan.fields.strand, "reverse");
    }

    #[test]
    fn plan_rejects_missing_parent_fields() {
        let fixture = Fixture::new();
        let mut parent = parent("None");
        parent.custom_fields.retain(|f| f.name != FIELD_RUN_NUMBER);
        let rejection =
            plan_run(&candidate(), &parent, &fixture.policy(), |_| false).expect_err("rejected");
        assert_eq!(rejection.gate, Gate::ParentFields);
        assert!(rejection.detail.contains(FIELD_RUN_NUMBER));
    }

    #[test]
    fn plan_rejects_manual_pipeline_comment() {
        let fixture = Fixture::new();
        let mut parent = parent("None");
        parent.custom_fields.push(field(
            FIELD_COMMENTS,
            Some("customer asked: MANUAL PIPELINE please"),
        ));
        let rejection =
            plan_run(&candidate(), &parent, &fixture.policy(), |_| false).expect_err("rejected");
        assert_eq!(rejection.gate, Gate::ManualPipeline);
    }

    fn rejected_name(name: &str) -> Rejection {
        let fixture = Fixture::new();
        let mut parent = parent("None");
        parent.name = name.to_string();
        plan_run(&candidate(), &parent, &fixture.policy(), |_| false).expect_err("rejected")
    }

    #[test]
    fn plan_rejects_absolute_project_name() {
        let rejection = rejected_name("/etc");
        assert_eq!(rejection.gate, Gate::ProjectName);
        assert!(rejection.detail.contains("absolute"));
    }

    #[test]
    fn plan_rejects_parent_traversal_in_project_name() {
        let rejection = rejected_name("../../tmp/evil");
        assert_eq!(rejection.gate, Gate::ProjectName);
        assert_eq!(rejected_name("..").gate, Gate::ProjectName);
        assert_eq!(rejected_name("Proj/sub").gate, Gate::ProjectName);
    }

    #[test]
    fn plan_rejects_shell_metacharacters_in_project_name() {
        let rejection = rejected_name("Proj; touch /tmp/pwned");
        assert_eq!(rejection.gate, Gate::ProjectName);
        for name in ["Proj|cat", "Proj&", "Proj$HOME", "Proj`id`", "Proj'x", "Proj>out", "Proj X"] {
            assert_eq!(rejected_name(name).gate, Gate::ProjectName, "{name}");
        }
    }

    #[test]
    fn plan_rejects_empty_project_name() {
        let rejection = rejected_name("");
        assert_eq!(rejection.gate, Gate::ProjectName);
        assert!(rejection.detail.contains("is empty"));
    }

    #[test]
    fn project_names_with_dots_dashes_and_underscores_pass() {
        for name in ["ProjectX", "Smith_12345", "lab-rna.v2"] {
            assert_eq!(check_project_name(name), Ok(()), "{name}");
        }
        assert!(check_project_name(".hidden").is_err());
    }

    #[test]
    fn plan_rejects_existing_run_path_before_archive() {
        let fixture = Fixture::new();
        let rejection =
            plan_run(&candidate(), &parent("None"), &fixture.policy(), |_| true).expect_err("rejected");
        assert_eq!(rejection.gate, Gate::RunPathExists);
    }

    #[test]
    fn plan_rejects_existing_archive_path() {
        let fixture = Fixture::new();
        let archive = PathBuf::from("/archive/ProjectX/r_001");
        let rejection = plan_run(&candidate(), &parent("None"), &fixture.policy(), |p| {
            p == archive.as_path()
        })
        .expect_err("rejected");
        assert_eq!(rejection.gate, Gate::ArchivePathExists);
        assert!(rejection.subject.contains("/archive/ProjectX/r_001"));
    }
}
