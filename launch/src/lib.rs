//! Pipeline-request automation for the sequencing lab.
//!
//! The crate polls the ticketing system for pipeline-request tickets, starts
//! runs once every precondition holds, and runs the per-request actions
//! (FASTQ permission checks, project import, tagging). The architecture keeps
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (request classification,
//!   eligibility gates, path computation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (configuration, ticket API, email,
//!   child processes, job queue, filesystem). Each external seam is a trait so
//!   tests can swap in fakes.
//!
//! Orchestration modules ([`start_runs`], [`request_actions`], [`alert`])
//! coordinate core logic with I/O to implement the CLI commands.

pub mod actions;
pub mod alert;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod request_actions;
pub mod start_runs;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
