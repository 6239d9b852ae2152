//! Shared deterministic types for the automation core.
//!
//! These types define stable contracts between the gates and the
//! orchestration layer. They do not depend on external state.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Named action a request route may run against a ticket.
///
/// Deserialized straight from the configuration, so a misspelled action name
/// fails at load time instead of at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CheckFastq,
    ImportProject,
    TagProject,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Self::CheckFastq => "check_fastq",
            Self::ImportProject => "import_project",
            Self::TagProject => "tag_project",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a candidate ticket was passed over without alerting anyone.
///
/// These are steady-state outcomes: the ticket is looked at again on the next
/// poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    NotToDo { status: String },
    NotAssigned,
    WrongList,
    NameNotAcceptable,
    NoParent,
    NoAlertField,
    AlreadyAlerted,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotToDo { status } => write!(f, "status is '{status}', not 'to do'"),
            Self::NotAssigned => f.write_str("not assigned to the automation user"),
            Self::WrongList => f.write_str("not in the pipeline's list"),
            Self::NameNotAcceptable => f.write_str("name does not end with an accepted suffix"),
            Self::NoParent => f.write_str("no parent task"),
            Self::NoAlertField => f.write_str("no alert marker field"),
            Self::AlreadyAlerted => f.write_str("operator already alerted"),
        }
    }
}

/// Gate at which a run-start or import was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    ParentFields,
    ManualPipeline,
    ProjectName,
    RunPathExists,
    ArchivePathExists,
    MappingFile,
    CreateNfFiles,
    RequestFile,
    ProjectFolder,
    ImportScript,
}

/// A refusal that must be reported to the operator.
///
/// Every rejection is alerted once and then suppressed by a marker field on
/// the ticket until someone clears it by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub gate: Gate,
    /// Short email subject.
    pub subject: String,
    /// Human-readable explanation for the email body.
    pub detail: String,
}

impl Rejection {
    pub fn new(gate: Gate, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            gate,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.gate, self.subject)
    }
}

/// Run parameters read from the parent ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentFields {
    pub project_folder: PathBuf,
    /// Lower-cased genome build.
    pub build: String,
    /// Lower-cased strandedness with `none` mapped to `unstranded`.
    pub strand: String,
    pub run_number: String,
    pub comments: Option<String>,
}

/// Everything needed to materialize and launch a run once all gates passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub ticket_id: String,
    pub ticket_name: String,
    pub parent_id: String,
    /// Parent ticket name; names the run directory and the archive entry.
    pub project_name: String,
    pub fields: ParentFields,
    /// `<work dir>/<project name>`.
    pub run_path: PathBuf,
    /// `<archive root>/<project name>`, stamped on the tickets.
    pub archive_path: String,
    /// `<archive root>/<project name>/r_00<RunNumber>`, must not exist yet.
    pub archive_run_path: PathBuf,
    /// Sibling subtasks co-started with the ticket.
    pub siblings: Vec<String>,
}
