//! ClickUp REST client.
//!
//! [`TicketApi`] is the seam the orchestration code depends on; the
//! production implementation talks to the ClickUp v2 API with a blocking
//! `reqwest` client. Wire structs are private to this module and converted
//! into the normalized [`Ticket`] snapshot on the way in.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::ticket::{CustomField, SubtaskRef, Ticket, TicketStatus};

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the ticketing API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl ClientError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }
}

/// Filters for listing the tasks of a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub assignees: Vec<u64>,
    pub statuses: Vec<String>,
    pub include_closed: bool,
    pub subtasks: bool,
}

impl TaskQuery {
    fn params(&self, page: u32) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), page.to_string()),
            ("include_closed".to_string(), self.include_closed.to_string()),
            ("subtasks".to_string(), self.subtasks.to_string()),
        ];
        params.extend(
            self.assignees
                .iter()
                .map(|id| ("assignees[]".to_string(), id.to_string())),
        );
        params.extend(
            self.statuses
                .iter()
                .map(|status| ("statuses[]".to_string(), status.clone())),
        );
        params
    }
}

/// Operations the automation needs from the ticketing system.
pub trait TicketApi {
    /// All tasks of `list_id` matching `query` (every page).
    fn list_tasks(&self, list_id: &str, query: &TaskQuery) -> Result<Vec<Ticket>>;

    /// One task, including its subtasks.
    fn get_task(&self, task_id: &str) -> Result<Ticket>;

    fn set_custom_field(&self, task_id: &str, field_id: &str, value: Value) -> Result<()>;

    fn update_status(&self, task_id: &str, status: &TicketStatus) -> Result<()>;

    fn add_comment(&self, task_id: &str, text: &str) -> Result<()>;

    fn add_tag(&self, task_id: &str, tag: &str) -> Result<()>;
}

/// HTTP client for the ClickUp v2 API.
#[derive(Debug, Clone)]
pub struct ClickupClient {
    base_url: String,
    token: String,
    page_limit: u32,
    client: Client,
}

impl ClickupClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
        page_limit: u32,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, token, page_limit, client))
    }

    /// Use a preconfigured `reqwest` client (proxies, TLS, etc.).
    pub fn with_client(
        base_url: impl Into<String>,
        token: impl Into<String>,
        page_limit: u32,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            page_limit,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", &self.token)
    }

    fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let response = self.check_status(response)?;
        response
            .json()
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {e}")))
    }

    fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let error_text = response
            .text()
            .unwrap_or_else(|_| "Unknown error".to_string());
        if status.as_u16() == 404 {
            return Err(ClientError::NotFound(url));
        }
        Err(ClientError::api_error(status.as_u16(), error_text))
    }
}

impl TicketApi for ClickupClient {
    #[instrument(skip(self, query), fields(list = list_id))]
    fn list_tasks(&self, list_id: &str, query: &TaskQuery) -> Result<Vec<Ticket>> {
        let url = format!("{}/list/{}/task", self.base_url, list_id);
        let mut tickets = Vec::new();
        for page in 0..self.page_limit {
            let response = self
                .authorized(self.client.get(&url))
                .query(&query.params(page))
                .send()?;
            let body: TaskPage = self.handle_response(response)?;
            let count = body.tasks.len();
            tickets.extend(body.tasks.into_iter().map(Ticket::from));
            debug!(page, count, "fetched task page");
            if body.last_page.unwrap_or(true) || count == 0 {
                break;
            }
        }
        Ok(tickets)
    }

    #[instrument(skip(self))]
    fn get_task(&self, task_id: &str) -> Result<Ticket> {
        let url = format!("{}/task/{}", self.base_url, task_id);
        let response = self
            .authorized(self.client.get(&url))
            .query(&[("include_subtasks", "true")])
            .send()?;
        let task: TaskWire = self.handle_response(response)?;
        Ok(task.into())
    }

    #[instrument(skip(self, value))]
    fn set_custom_field(&self, task_id: &str, field_id: &str, value: Value) -> Result<()> {
        let url = format!("{}/task/{}/field/{}", self.base_url, task_id, field_id);
        let response = self
            .authorized(self.client.post(&url))
            .json(&json!({ "value": value }))
            .send()?;
        self.check_status(response).map(drop)
    }

    #[instrument(skip(self))]
    fn update_status(&self, task_id: &str, status: &TicketStatus) -> Result<()> {
        let url = format!("{}/task/{}", self.base_url, task_id);
        let response = self
            .authorized(self.client.put(&url))
            .json(&json!({ "status": status.as_str() }))
            .send()?;
        self.check_status(response).map(drop)
    }

    #[instrument(skip(self, text))]
    fn add_comment(&self, task_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/task/{}/comment", self.base_url, task_id);
        let response = self
            .authorized(self.client.post(&url))
            .json(&json!({ "comment_text": text, "notify_all": false }))
            .send()?;
        self.check_status(response).map(drop)
    }

    #[instrument(skip(self))]
    fn add_tag(&self, task_id: &str, tag: &str) -> Result<()> {
        let url = format!("{}/task/{}/tag/{}", self.base_url, task_id, tag);
        let response = self.authorized(self.client.post(&url)).send()?;
        self.check_status(response).map(drop)
    }
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    tasks: Vec<TaskWire>,
    #[serde(default)]
    last_page: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TaskWire {
    id: String,
    name: String,
    status: StatusWire,
    #[serde(default)]
    list: Option<IdWire>,
    #[serde(default)]
    assignees: Vec<UserWire>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    subtasks: Vec<SubtaskWire>,
    #[serde(default)]
    custom_fields: Vec<FieldWire>,
    #[serde(default)]
    tags: Vec<TagWire>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    text_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusWire {
    status: String,
}

#[derive(Debug, Deserialize)]
struct IdWire {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserWire {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct SubtaskWire {
    id: String,
    name: String,
    #[serde(default)]
    status: Option<StatusWire>,
}

#[derive(Debug, Deserialize)]
struct TagWire {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FieldWire {
    id: String,
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    type_config: Option<TypeConfigWire>,
}

#[derive(Debug, Default, Deserialize)]
struct TypeConfigWire {
    #[serde(default)]
    options: Vec<OptionWire>,
}

#[derive(Debug, Deserialize)]
struct OptionWire {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    orderindex: Option<Value>,
}

impl From<TaskWire> for Ticket {
    fn from(task: TaskWire) -> Self {
        let description = task
            .description
            .filter(|d| !d.is_empty())
            .or(task.text_content)
            .unwrap_or_default();
        Ticket {
            id: task.id,
            name: task.name,
            status: TicketStatus::parse(&task.status.status),
            list_id: task.list.map(|l| l.id),
            assignees: task.assignees.into_iter().map(|u| u.id).collect(),
            parent: task.parent.filter(|p| !p.is_empty()),
            subtasks: task
                .subtasks
                .into_iter()
                .map(|s| SubtaskRef {
                    id: s.id,
                    name: s.name,
                    status: s
                        .status
                        .map(|st| TicketStatus::parse(&st.status))
                        .unwrap_or(TicketStatus::Other(String::new())),
                })
                .collect(),
            custom_fields: task.custom_fields.into_iter().map(CustomField::from).collect(),
            tags: task.tags.into_iter().map(|t| t.name).collect(),
            description,
        }
    }
}

impl From<FieldWire> for CustomField {
    fn from(field: FieldWire) -> Self {
        let value = match (field.kind.as_str(), field.value) {
            (_, None) | (_, Some(Value::Null)) => None,
            ("drop_down", Some(selected)) => {
                let options = field.type_config.unwrap_or_default().options;
                Some(resolve_drop_down(&selected, &options).unwrap_or_else(|| value_text(&selected)))
            }
            (_, Some(other)) => Some(value_text(&other)),
        };
        CustomField {
            id: field.id,
            name: field.name,
            value,
        }
    }
}

/// Drop-down values are an option's `orderindex` (or its id).
fn resolve_drop_down(selected: &Value, options: &[OptionWire]) -> Option<String> {
    let wanted = value_text(selected);
    options
        .iter()
        .find(|option| {
            option.orderindex.as_ref().map(value_text).as_deref() == Some(wanted.as_str())
                || option.id.as_deref() == Some(wanted.as_str())
        })
        .map(|option| option.name.clone())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
