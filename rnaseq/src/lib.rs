//! Post-run tooling for the RNA-seq pipeline.
//!
//! - [`summary`]: build `bicdelivery_summary.json` from a finished run.
//! - [`checks`]: verify a run's outputs before delivery.
//! - [`close`]: stamp delivery fields and close the pipeline subtasks.
//!
//! Output-tree locations shared by all three live in [`layout`].

pub mod checks;
pub mod close;
pub mod layout;
pub mod summary;
pub mod table;
