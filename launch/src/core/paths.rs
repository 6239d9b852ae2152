//! Deterministic path computation for runs and archives.

use std::path::{Path, PathBuf};

/// Working directory for a project: `<work_dir>/<project_name>`.
pub fn run_path(work_dir: &Path, project_name: &str) -> PathBuf {
    work_dir.join(project_name)
}

/// Local part of an rsync destination.
///
/// `host:/archive` yields `/archive`; a plain path is returned unchanged.
pub fn archive_root(rsync_dir: &str) -> &str {
    match rsync_dir.split_once(':') {
        Some((_, path)) => path,
        None => rsync_dir,
    }
}

/// Archive directory stamped on tickets: `<archive root>/<project_name>`.
pub fn project_archive_path(rsync_dir: &str, project_name: &str) -> String {
    format!("{}/{}", archive_root(rsync_dir), project_name)
}

/// Archive directory of one run: `<archive root>/<project_name>/r_00<run_number>`.
pub fn archive_run_path(rsync_dir: &str, project_name: &str, run_number: &str) -> PathBuf {
    PathBuf::from(format!(
        "{}/r_00{}",
        project_archive_path(rsync_dir, project_name),
        run_number
    ))
}
