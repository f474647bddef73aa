//! Script discovery.
//!
//! Scripts are files named `<id>_<anything>` anywhere below a root directory.
//! Discovery is a single pass; records are not cached between runs.
use crate::sequence::ScriptId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("scripts root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A resolved script file for one identifier.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptRecord {
    pub id: ScriptId,
    pub file_name: String,
    pub path: PathBuf,
}

/// More than one file claimed the same identifier.
#[derive(Debug, Clone, Serialize)]
pub struct Collision {
    pub id: ScriptId,
    pub chosen: PathBuf,
    pub ignored: Vec<PathBuf>,
}

impl Collision {
    pub fn describe(&self) -> String {
        let ignored: Vec<String> = self
            .ignored
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        format!(
            "script {} matched {} files; using {} and ignoring {}",
            self.id,
            self.ignored.len() + 1,
            self.chosen.display(),
            ignored.join(", ")
        )
    }
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    pub records: Vec<ScriptRecord>,
    pub missing: Vec<ScriptId>,
    pub collisions: Vec<Collision>,
}

/// Resolve identifiers to script files under `root`, in identifier order.
pub fn find_scripts(root: &Path, ids: &[ScriptId]) -> Result<Discovery, LocateError> {
    if !root.is_dir() {
        return Err(LocateError::RootNotFound(root.to_path_buf()));
    }
    let root = std::path::absolute(root).map_err(|source| LocateError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let files = collect_files_recursive(&root)?;

    // Index by the file-name prefix each requested id would match.
    let mut by_prefix: BTreeMap<String, Vec<PathBuf>> = ids
        .iter()
        .map(|id| (id.file_prefix(), Vec::new()))
        .collect();
    for path in files {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some((head, _)) = file_name.split_once('_') else {
            continue;
        };
        if let Some(matches) = by_prefix.get_mut(&format!("{head}_")) {
            matches.push(path);
        }
    }

    let mut discovery = Discovery::default();
    for id in ids {
        let mut matches = by_prefix.remove(&id.file_prefix()).unwrap_or_default();
        if matches.is_empty() {
            tracing::debug!(id = %id, "no script matched identifier");
            discovery.missing.push(*id);
            continue;
        }
        matches.sort();
        let chosen = matches.remove(0);
        if !matches.is_empty() {
            let collision = Collision {
                id: *id,
                chosen: chosen.clone(),
                ignored: matches,
            };
            tracing::warn!("{}", collision.describe());
            discovery.collisions.push(collision);
        }
        let file_name = chosen
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        discovery.records.push(ScriptRecord {
            id: *id,
            file_name,
            path: chosen,
        });
    }
    Ok(discovery)
}

fn collect_files_recursive(root: &Path) -> Result<Vec<PathBuf>, LocateError> {
    let io_err = |source| LocateError::Io {
        path: root.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(root).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        // Symlinked directories are not descended into; they can loop.
        let file_type = entry.file_type().map_err(io_err)?;
        let path = entry.path();
        if file_type.is_dir() {
            let hidden = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with('.'));
            if !hidden {
                files.extend(collect_files_recursive(&path)?);
            }
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
