//! Maps request-ticket titles onto configured pipeline routes.

use serde::{Deserialize, Serialize};

use crate::core::types::Action;

/// Title prefix marking an actionable request ticket.
pub const REQUEST_PREFIX: &str = "#REQUEST";

/// One `[[requests]]` entry: title key, target pipeline, ordered actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRoute {
    /// Text the title must start with after the request prefix.
    pub key: String,
    /// Name of the `[pipelines.<name>]` table the actions run against.
    pub pipeline: String,
    pub actions: Vec<Action>,
}

/// Find the route for a ticket title.
///
/// - Returns `None` unless the title starts with `#REQUEST`.
/// - The text after the prefix (and an optional `:`) is trimmed and matched
///   with `starts_with` against each route key.
/// - First matching route in configuration order wins.
pub fn classify<'a>(title: &str, routes: &'a [RequestRoute]) -> Option<&'a RequestRoute> {
    let rest = title.strip_prefix(REQUEST_PREFIX)?;
    let rest = rest.strip_prefix(':').unwrap_or(rest).trim();
    routes.iter().find(|route| rest.starts_with(&route.key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(key: &str, actions: Vec<Action>) -> RequestRoute {
        RequestRoute {
            key: key.to_string(),
            pipeline: key.to_string(),
            actions,
        }
    }

    #[test]
    fn classify_requires_request_prefix() {
        let routes = vec![route("RNASEQ", vec![Action::ImportProject])];
        assert!(classify("RNASEQ sample run", &routes).is_none());
        assert!(classify("re: #REQUEST:RNASEQ", &routes).is_none());
    }

    #[test]
    fn classify_matches_key_after_colon() {
        let routes = vec![route("RNASEQ", vec![Action::ImportProject])];
        let found = classify("#REQUEST:RNASEQ sample run", &routes).expect("route");
        assert_eq!(found.key, "RNASEQ");
        assert_eq!(found.actions, vec![Action::ImportProject]);
    }

    #[test]
    fn classify_tolerates_missing_colon_and_whitespace() {
        let routes = vec![route("IMPACT", vec![Action::TagProject])];
        assert!(classify("#REQUEST   IMPACT 505", &routes).is_some());
        assert!(classify("#REQUEST:  IMPACT 505", &routes).is_some());
    }

    #[test]
    fn classify_returns_none_when_no_key_matches() {
        let routes = vec![route("RNASEQ", Vec::new())];
        assert!(classify("#REQUEST:WGS tumor", &routes).is_none());
    }

    #[test]
    fn classify_first_configured_key_wins() {
        let routes = vec![
            route("RNASEQ", vec![Action::CheckFastq]),
            route("RNASEQ_DE", vec![Action::TagProject]),
        ];
        let found = classify("#REQUEST:RNASEQ_DE only", &routes).expect("route");
        assert_eq!(found.actions, vec![Action::CheckFastq]);
    }
}
