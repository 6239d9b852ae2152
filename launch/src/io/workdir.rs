//! Materialization of a run's working directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Marker file recording which ticket started the run.
pub const TASK_ID_FILE: &str = "clickup_task_id.txt";

/// Create `run_path`, copy the project's regular files into it, and write the marker.
///
/// The directory must not exist yet; its existence is the uniqueness guard
/// for a project name. Subdirectories of `project_folder` are not copied.
pub fn materialize_run_dir(run_path: &Path, project_folder: &Path, task_id: &str) -> Result<()> {
    if !project_folder.is_dir() {
        return Err(anyhow!(
            "project folder {} is not a directory",
            project_folder.display()
        ));
    }
    if let Some(parent) = run_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::create_dir(run_path).with_context(|| format!("create run dir {}", run_path.display()))?;

    let copied = copy_regular_files(project_folder, run_path)?;
    fs::write(run_path.join(TASK_ID_FILE), format!("{task_id}\n"))
        .with_context(|| format!("write {}", run_path.join(TASK_ID_FILE).display()))?;
    debug!(run_path = %run_path.display(), copied, "run dir created; project files copied");
    Ok(())
}

/// Copy files (not directories) from `src` into `dest`. Returns the number copied.
pub fn copy_regular_files(src: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in fs::read_dir(src).with_context(|| format!("read dir {}", src.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", src.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let target = dest.join(entry.file_name());
        fs::copy(&path, &target)
            .with_context(|| format!("copy {} to {}", path.display(), target.display()))?;
        copied += 1;
    }
    Ok(copied)
}
