//! Test-only fakes for the ticket API, the notifier and the process runner.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::Value;

use crate::core::ticket::{CustomField, SubtaskRef, Ticket, TicketStatus};
use crate::io::clickup::{self, ClientError, TaskQuery, TicketApi};
use crate::io::config::{AutomationConfig, parse_config};
use crate::io::notify::Notifier;
use crate::io::process::{CommandRunner, CommandSpec, ProcessError, ProcessOutput};

/// Configuration covering every action and optional field. `{root}` is
/// replaced with a scratch directory.
pub const SAMPLE_CONFIG: &str = r#"
log_level = "debug"
manual_import_script = "/opt/bic/manual_import.sh"

[clickup]
user_id = 42
request_list_id = "list-requests"

[fields]
"Email Alerted" = "uuid-email-alerted"
"Run Path" = "uuid-run-path"
"Archive Path" = "uuid-archive-path"
"Block Auto Import" = "uuid-block-auto-import"
"FASTQ Checked" = "uuid-fastq-checked"
"Pipeline Version" = "uuid-pipeline-version"
"Delivery Path" = "uuid-delivery-path"

[notify]
email = "ops@example.org"

[queue]
path = "{root}/run_queue.txt"
max_retries = 2
retry_delay_secs = 0

[pipelines.RNASEQ]
list_id = "list-rnaseq"
work_dir = "{root}/work"
rsync_dir = "archive01:{root}/archive"
acceptable_tickets = ["- Counts"]
siblings_to_start = ["- DE"]
mapping_glob = "*_sample_mapping.txt"
sample_key_glob = "*_sample_key*.xlsx"
sample_comp_glob = "*_sample_comparisons*.xlsx"
request_file_glob = "*_request.txt"
launch_script = "/opt/bic/launch.sh"
manual_pipeline_comment = "MANUAL PIPELINE"
create_nf_files = "/opt/bic/create_nf_files.sh"
import_script = "/opt/bic/import.sh"
tag = "rnaseq"

[[requests]]
key = "RNASEQ"
pipeline = "RNASEQ"
actions = ["check_fastq", "import_project", "tag_project"]

[fastq]
keywords = ["IGO ID", "IGO Project"]
lims_command = ["lims_lookup", "{{ project_id }}"]
permissions_command = ["check_permissions", "{{ project_id }}"]
timeout_secs = 30
"#;

/// Parse [`SAMPLE_CONFIG`] rooted at `root`.
pub fn sample_config(root: &Path) -> Result<AutomationConfig> {
    let text = SAMPLE_CONFIG.replace("{root}", &root.display().to_string());
    parse_config(&text, root)
}

/// Start a ticket with deterministic defaults: "to do", no list, no fields.
pub fn ticket(id: &str, name: &str) -> TicketBuilder {
    TicketBuilder {
        ticket: Ticket {
            id: id.to_string(),
            name: name.to_string(),
            status: TicketStatus::ToDo,
            list_id: None,
            assignees: Vec::new(),
            parent: None,
            subtasks: Vec::new(),
            custom_fields: Vec::new(),
            tags: Vec::new(),
            description: String::new(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct TicketBuilder {
    ticket: Ticket,
}

impl TicketBuilder {
    pub fn status(mut self, status: TicketStatus) -> Self {
        self.ticket.status = status;
        self
    }

    pub fn list(mut self, list_id: &str) -> Self {
        self.ticket.list_id = Some(list_id.to_string());
        self
    }

    pub fn assignee(mut self, user_id: u64) -> Self {
        self.ticket.assignees.push(user_id);
        self
    }

    pub fn parent(mut self, parent_id: &str) -> Self {
        self.ticket.parent = Some(parent_id.to_string());
        self
    }

    pub fn subtask(mut self, id: &str, name: &str) -> Self {
        self.ticket.subtasks.push(SubtaskRef {
            id: id.to_string(),
            name: name.to_string(),
            status: TicketStatus::ToDo,
        });
        self
    }

    /// Field whose UUID is derived from its name (`uuid-<name>`).
    pub fn field(self, name: &str, value: &str) -> Self {
        let id = field_uuid(name);
        self.field_with_id(&id, name, Some(value))
    }

    /// Field present on the ticket but unset.
    pub fn empty_field(self, name: &str) -> Self {
        let id = field_uuid(name);
        self.field_with_id(&id, name, None)
    }

    pub fn field_with_id(mut self, id: &str, name: &str, value: Option<&str>) -> Self {
        self.ticket.custom_fields.push(CustomField {
            id: id.to_string(),
            name: name.to_string(),
            value: value.map(str::to_string),
        });
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.ticket.tags.push(tag.to_string());
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.ticket.description = text.to_string();
        self
    }

    pub fn build(self) -> Ticket {
        self.ticket
    }
}

/// Deterministic UUID used by [`TicketBuilder::field`] and the sample config.
pub fn field_uuid(name: &str) -> String {
    format!("uuid-{}", name.to_lowercase().replace(' ', "-"))
}

/// Mutating call recorded by [`FakeTickets`].
#[derive(Debug, Clone, PartialEq)]
pub enum TicketCall {
    SetField {
        task: String,
        field: String,
        value: Value,
    },
    Status {
        task: String,
        status: TicketStatus,
    },
    Comment {
        task: String,
        text: String,
    },
    Tag {
        task: String,
        tag: String,
    },
}

/// In-memory ticketing system.
///
/// Writes are applied to the stored tickets and logged in call order.
#[derive(Debug, Default)]
pub struct FakeTickets {
    tickets: RefCell<BTreeMap<String, Ticket>>,
    calls: RefCell<Vec<TicketCall>>,
    failing_comments: Cell<bool>,
}

impl FakeTickets {
    pub fn new(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let fake = Self::default();
        for ticket in tickets {
            fake.insert(ticket);
        }
        fake
    }

    pub fn insert(&self, ticket: Ticket) {
        self.tickets.borrow_mut().insert(ticket.id.clone(), ticket);
    }

    /// Make every later `add_comment` fail with a server error.
    pub fn fail_comments(&self) {
        self.failing_comments.set(true);
    }

    pub fn ticket(&self, id: &str) -> Option<Ticket> {
        self.tickets.borrow().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<TicketCall> {
        self.calls.borrow().clone()
    }

    /// `(field uuid, value)` writes made to `task`, in order.
    pub fn field_writes(&self, task: &str) -> Vec<(String, Value)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                TicketCall::SetField {
                    task: t,
                    field,
                    value,
                } if t == task => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self, task: &str) -> Vec<TicketStatus> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                TicketCall::Status { task: t, status } if t == task => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn comments(&self, task: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                TicketCall::Comment { task: t, text } if t == task => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn with_ticket(&self, task: &str, f: impl FnOnce(&mut Ticket)) -> clickup::Result<()> {
        let mut tickets = self.tickets.borrow_mut();
        let ticket = tickets
            .get_mut(task)
            .ok_or_else(|| ClientError::NotFound(format!("task {task}")))?;
        f(ticket);
        Ok(())
    }
}

impl TicketApi for FakeTickets {
    fn list_tasks(&self, list_id: &str, query: &TaskQuery) -> clickup::Result<Vec<Ticket>> {
        Ok(self
            .tickets
            .borrow()
            .values()
            .filter(|t| t.list_id.as_deref() == Some(list_id))
            .filter(|t| query.include_closed || t.status != TicketStatus::Closed)
            .filter(|t| query.subtasks || t.parent.is_none())
            .filter(|t| {
                query.statuses.is_empty() || query.statuses.iter().any(|s| s == t.status.as_str())
            })
            .filter(|t| {
                query.assignees.is_empty() || query.assignees.iter().any(|a| t.is_assigned_to(*a))
            })
            .cloned()
            .collect())
    }

    fn get_task(&self, task_id: &str) -> clickup::Result<Ticket> {
        self.ticket(task_id)
            .ok_or_else(|| ClientError::NotFound(format!("task {task_id}")))
    }

    fn set_custom_field(&self, task_id: &str, field_id: &str, value: Value) -> clickup::Result<()> {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.with_ticket(task_id, |ticket| {
            if let Some(field) = ticket.custom_fields.iter_mut().find(|f| f.id == field_id) {
                field.value = Some(text);
            }
        })?;
        self.calls.borrow_mut().push(TicketCall::SetField {
            task: task_id.to_string(),
            field: field_id.to_string(),
            value,
        });
        Ok(())
    }

    fn update_status(&self, task_id: &str, status: &TicketStatus) -> clickup::Result<()> {
        self.with_ticket(task_id, |ticket| ticket.status = status.clone())?;
        self.calls.borrow_mut().push(TicketCall::Status {
            task: task_id.to_string(),
            status: status.clone(),
        });
        Ok(())
    }

    fn add_comment(&self, task_id: &str, text: &str) -> clickup::Result<()> {
        if self.failing_comments.get() {
            return Err(ClientError::api_error(500, "comment rejected"));
        }
        self.with_ticket(task_id, |_| {})?;
        self.calls.borrow_mut().push(TicketCall::Comment {
            task: task_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn add_tag(&self, task_id: &str, tag: &str) -> clickup::Result<()> {
        self.with_ticket(task_id, |ticket| ticket.tags.push(tag.to_string()))?;
        self.calls.borrow_mut().push(TicketCall::Tag {
            task: task_id.to_string(),
            tag: tag.to_string(),
        });
        Ok(())
    }
}

/// Notifier that keeps `(subject, body)` pairs instead of sending mail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RefCell<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `notify` call records the message and then fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.borrow().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent.borrow().iter().map(|(s, _)| s.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        self.sent
            .borrow_mut()
            .push((subject.to_string(), body.to_string()));
        if self.fail {
            bail!("mail transport unavailable");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    calls: Vec<CommandSpec>,
    results: VecDeque<Result<ProcessOutput, ProcessError>>,
}

/// Process runner that records invocations and replays queued results.
///
/// Clones share the same log and queue. Once the queue is empty every call
/// succeeds with no output.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful run printing `stdout`.
    pub fn push_output(&self, stdout: &str) -> &Self {
        self.state
            .borrow_mut()
            .results
            .push_back(Ok(process_output(stdout)));
        self
    }

    /// Queue a run exiting with `exit_code` after printing `stdout`.
    pub fn push_failure(&self, exit_code: i32, stdout: &str) -> &Self {
        self.state
            .borrow_mut()
            .results
            .push_back(Err(ProcessError::Failed {
                program: "scripted".to_string(),
                exit_code: Some(exit_code),
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                duration: Duration::ZERO,
            }));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.state.borrow().calls.clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(spec.clone());
        state
            .results
            .pop_front()
            .unwrap_or_else(|| Ok(process_output("")))
    }
}

pub fn process_output(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
        stdout_truncated: 0,
        stderr_truncated: 0,
        duration: Duration::ZERO,
    }
}

/// Scratch directory tree for run-start tests: `work/`, `archive/`, `projects/`.
pub struct Scratch {
    pub dir: tempfile::TempDir,
}

impl Scratch {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        for sub in ["work", "archive", "projects"] {
            std::fs::create_dir_all(dir.path().join(sub))?;
        }
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root().join("work")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root().join("archive")
    }

    /// Create `projects/<name>` holding `files` (name, contents).
    pub fn project(&self, name: &str, files: &[(&str, &str)]) -> std::io::Result<PathBuf> {
        let folder = self.root().join("projects").join(name);
        std::fs::create_dir_all(&folder)?;
        for (file, contents) in files {
            std::fs::write(folder.join(file), contents)?;
        }
        Ok(folder)
    }
}
