//! Named, reusable sequence bundles persisted as JSON documents.
//!
//! Each playbook is stored as `<root>/<name>.json`. Writes never merge: a save
//! either creates a new document or, with `overwrite`, replaces it whole.
use crate::context::Variables;
use crate::sequence::{expand_sequence, expand_terms, ScriptId, SequenceError};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current schema version for playbook documents.
pub const PLAYBOOK_SCHEMA_VERSION: u32 = 1;

const PLAYBOOK_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum PlaybookError {
    #[error("playbook {0:?} not found")]
    NotFound(String),

    #[error("playbook {0:?} already exists (use overwrite to replace it)")]
    AlreadyExists(String),

    #[error("invalid playbook name {0:?}")]
    InvalidName(String),

    #[error("playbook {name:?} has an invalid sequence: {source}")]
    Sequence {
        name: String,
        #[source]
        source: SequenceError,
    },

    #[error("parse playbook {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which scripts a playbook runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceSource {
    /// A sequence specification such as `0400-0402,0404`.
    Spec(String),
    /// Literal terms; each may itself be a number or a range.
    List(Vec<String>),
}

impl SequenceSource {
    pub fn expand(&self) -> Result<Vec<ScriptId>, SequenceError> {
        match self {
            Self::Spec(spec) => expand_sequence(spec),
            Self::List(terms) => expand_terms(terms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sequence: SequenceSource,
    #[serde(default)]
    pub variables: Variables,
}

impl Playbook {
    pub fn new(name: impl Into<String>, sequence: SequenceSource, variables: Variables) -> Self {
        Self {
            schema_version: PLAYBOOK_SCHEMA_VERSION,
            name: name.into(),
            description: String::new(),
            sequence,
            variables,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

fn default_schema_version() -> u32 {
    PLAYBOOK_SCHEMA_VERSION
}

/// Directory-backed playbook storage.
#[derive(Debug, Clone)]
pub struct PlaybookStore {
    root: PathBuf,
}

impl PlaybookStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, name: &str) -> Result<Playbook, PlaybookError> {
        let path = self.document_path(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(PlaybookError::NotFound(name.to_string()));
            }
            Err(source) => {
                return Err(PlaybookError::Io {
                    action: "read",
                    path,
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| PlaybookError::Parse { path, source })
    }

    /// Persist `playbook` under `name`, refusing to replace an existing
    /// document unless `overwrite` is set.
    pub fn save(
        &self,
        name: &str,
        playbook: &Playbook,
        overwrite: bool,
    ) -> Result<PathBuf, PlaybookError> {
        let path = self.document_path(name)?;
        playbook
            .sequence
            .expand()
            .map_err(|source| PlaybookError::Sequence {
                name: name.to_string(),
                source,
            })?;

        let mut document = playbook.clone();
        document.name = name.to_string();
        document.schema_version = PLAYBOOK_SCHEMA_VERSION;
        let mut bytes = serde_json::to_vec_pretty(&document).map_err(|source| {
            PlaybookError::Parse {
                path: path.clone(),
                source,
            }
        })?;
        bytes.push(b'\n');

        fs::create_dir_all(&self.root).map_err(|source| PlaybookError::Io {
            action: "create",
            path: self.root.clone(),
            source,
        })?;

        if overwrite {
            replace_file(&path, &bytes)?;
        } else {
            create_new_file(&path, &bytes)
                .map_err(|err| already_exists_or(err, name))?;
        }
        tracing::info!(playbook = name, path = %path.display(), overwrite, "playbook saved");
        Ok(path)
    }

    /// Names of stored playbooks, sorted. Documents are not parsed.
    pub fn list(&self) -> Result<Vec<String>, PlaybookError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PlaybookError::Io {
                    action: "read",
                    path: self.root.clone(),
                    source,
                })
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| PlaybookError::Io {
                    action: "read",
                    path: self.root.clone(),
                    source,
                })?
                .path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(PLAYBOOK_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if is_valid_name(stem) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn remove(&self, name: &str) -> Result<(), PlaybookError> {
        let path = self.document_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(playbook = name, "playbook removed");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(PlaybookError::NotFound(name.to_string()))
            }
            Err(source) => Err(PlaybookError::Io {
                action: "remove",
                path,
                source,
            }),
        }
    }

    fn document_path(&self, name: &str) -> Result<PathBuf, PlaybookError> {
        if !is_valid_name(name) {
            return Err(PlaybookError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.{PLAYBOOK_EXTENSION}")))
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

fn create_new_file(path: &Path, bytes: &[u8]) -> Result<(), PlaybookError> {
    let io_err = |action: &'static str, source: io::Error| PlaybookError::Io {
        action,
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| io_err("create", source))?;
    file.write_all(bytes).map_err(|source| io_err("write", source))?;
    file.sync_all().map_err(|source| io_err("sync", source))?;
    Ok(())
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), PlaybookError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("playbook");
    let tmp_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, bytes).map_err(|source| PlaybookError::Io {
        action: "write",
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        PlaybookError::Io {
            action: "replace",
            path: path.to_path_buf(),
            source,
        }
    })
}

fn already_exists_or(err: PlaybookError, name: &str) -> PlaybookError {
    match err {
        PlaybookError::Io { ref source, .. } if source.kind() == io::ErrorKind::AlreadyExists => {
            PlaybookError::AlreadyExists(name.to_string())
        }
        other => other,
    }
}
