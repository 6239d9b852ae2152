//! I/O adapters for the automation commands.

pub mod clickup;
pub mod config;
pub mod glob;
pub mod notify;
pub mod process;
pub mod queue;
pub mod workdir;
