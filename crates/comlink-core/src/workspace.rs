//! Workspace root selection and storage directory provisioning.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::WorkspaceError;

/// The root a project is initialized for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    pub path: PathBuf,
    /// Other open roots that were ignored.
    pub ignored: usize,
}

/// Picks the first of `folders`; more than one is allowed but reported.
pub fn select_root(folders: &[PathBuf]) -> Result<WorkspaceRoot, WorkspaceError> {
    let (first, rest) = folders
        .split_first()
        .ok_or(WorkspaceError::WorkspaceUnavailable)?;
    if !rest.is_empty() {
        warn!(
            root = %first.display(),
            ignored = rest.len(),
            "multiple workspace folders open; using the first"
        );
    }
    Ok(WorkspaceRoot {
        path: first.clone(),
        ignored: rest.len(),
    })
}

/// Creates the storage directory `dir`, refusing to reuse anything already there.
pub fn provision_directory(dir: &Path) -> Result<(), WorkspaceError> {
    if dir.symlink_metadata().is_ok() {
        return Err(WorkspaceError::DirectoryConflict(dir.to_path_buf()));
    }
    std::fs::create_dir_all(dir).map_err(|err| WorkspaceError::CreateDirectory {
        path: dir.to_path_buf(),
        message: err.to_string(),
    })?;
    info!(dir = %dir.display(), "storage directory created");
    Ok(())
}
