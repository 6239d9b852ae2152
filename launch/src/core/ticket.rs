//! In-memory ticket snapshot as read from the ticketing system.
//!
//! The wire format lives in `io::clickup`; this is the normalized form the
//! gates operate on. Custom-field values are flattened to text (drop-down
//! indices resolved to option names, numbers rendered without a trailing
//! `.0`), which is all the decision logic ever compares against.

use std::fmt;

/// Workflow status of a ticket.
///
/// Statuses are free text on the server side; the ones this system acts on
/// are named, anything else is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketStatus {
    ToDo,
    InProgress,
    ReadyForPipeline,
    SubmittedToPipeline,
    Closed,
    Other(String),
}

impl TicketStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "to do" => Self::ToDo,
            "in progress" => Self::InProgress,
            "ready for pipeline" => Self::ReadyForPipeline,
            "submitted to pipeline" => Self::SubmittedToPipeline,
            "closed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Status label as the ticketing API expects it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ToDo => "to do",
            Self::InProgress => "in progress",
            Self::ReadyForPipeline => "ready for pipeline",
            Self::SubmittedToPipeline => "submitted to pipeline",
            Self::Closed => "closed",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One custom field attached to a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
    /// Field UUID.
    pub id: String,
    pub name: String,
    /// Text form of the value; `None` when the field exists but is unset.
    pub value: Option<String>,
}

impl CustomField {
    /// Checkbox semantics: `true` (any case) is set, everything else is not.
    pub fn is_true(&self) -> bool {
        self.value
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

/// Reference to a subtask as embedded in its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskRef {
    pub id: String,
    pub name: String,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub name: String,
    pub status: TicketStatus,
    /// Id of the list the ticket lives in.
    pub list_id: Option<String>,
    /// User ids the ticket is assigned to.
    pub assignees: Vec<u64>,
    pub parent: Option<String>,
    pub subtasks: Vec<SubtaskRef>,
    pub custom_fields: Vec<CustomField>,
    pub tags: Vec<String>,
    pub description: String,
}

impl Ticket {
    /// Look up a custom field by its display name.
    pub fn field(&self, name: &str) -> Option<&CustomField> {
        self.custom_fields.iter().find(|f| f.name == name)
    }

    /// Non-empty, trimmed value of a named custom field.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(|f| f.value.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn is_assigned_to(&self, user_id: u64) -> bool {
        self.assignees.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value: Option<&str>) -> CustomField {
        CustomField {
            id: format!("{name}-uuid"),
            name: name.to_string(),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(TicketStatus::parse("To Do"), TicketStatus::ToDo);
        assert_eq!(
            TicketStatus::parse("READY FOR PIPELINE"),
            TicketStatus::ReadyForPipeline
        );
        assert_eq!(
            TicketStatus::parse("waiting on data"),
            TicketStatus::Other("waiting on data".to_string())
        );
    }

    #[test]
    fn status_round_trips_through_label() {
        for status in [
            TicketStatus::ToDo,
            TicketStatus::InProgress,
            TicketStatus::ReadyForPipeline,
            TicketStatus::SubmittedToPipeline,
            TicketStatus::Closed,
        ] {
            assert_eq!(TicketStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn checkbox_accepts_text_true_only() {
        assert!(field("Email Alerted", Some("true")).is_true());
        assert!(field("Email Alerted", Some("TRUE")).is_true());
        assert!(!field("Email Alerted", Some("false")).is_true());
        assert!(!field("Email Alerted", None).is_true());
    }

    #[test]
    fn field_value_ignores_blank_values() {
        let ticket = Ticket {
            id: "t1".to_string(),
            name: "ticket".to_string(),
            status: TicketStatus::ToDo,
            list_id: None,
            assignees: Vec::new(),
            parent: None,
            subtasks: Vec::new(),
            custom_fields: vec![field("Build", Some("  ")), field("Strand", Some(" Reverse "))],
            tags: Vec::new(),
            description: String::new(),
        };
        assert_eq!(ticket.field_value("Build"), None);
        assert_eq!(ticket.field_value("Strand"), Some("Reverse"));
        assert_eq!(ticket.field_value("Missing"), None);
    }
}
