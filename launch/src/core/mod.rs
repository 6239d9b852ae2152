//! Deterministic, pure logic shared by the automation commands.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! ticket snapshots and return deterministic outputs suitable for tests.
//! Filesystem state the gates depend on is passed in as a probe closure.

pub mod classifier;
pub mod eligibility;
pub mod fastq;
pub mod paths;
pub mod ticket;
pub mod types;
