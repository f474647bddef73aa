//! Root directory resolution.
//!
//! Each root resolves as: explicit flag, then environment variable, then a
//! default location.
use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const SCRIPTS_ROOT_ENV: &str = "SEQRUN_SCRIPTS_ROOT";
pub const PLAYBOOKS_ROOT_ENV: &str = "SEQRUN_PLAYBOOKS_ROOT";
pub const LOG_ENV: &str = "SEQRUN_LOG";

/// Resolved filesystem roots for one invocation.
#[derive(Debug, Clone)]
pub struct Roots {
    pub scripts: PathBuf,
    pub playbooks: PathBuf,
}

impl Roots {
    pub fn resolve(scripts: Option<&Path>, playbooks: Option<&Path>) -> Result<Self> {
        Ok(Self {
            scripts: resolve_scripts_root(scripts)?,
            playbooks: resolve_playbooks_root(playbooks)?,
        })
    }
}

/// The result is always absolute.
pub fn resolve_scripts_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let root = match explicit {
        Some(path) => path.to_path_buf(),
        None => match env_path(SCRIPTS_ROOT_ENV) {
            Some(path) => path,
            None => {
                return env::current_dir().context("resolve current directory for scripts root")
            }
        },
    };
    std::path::absolute(&root)
        .with_context(|| format!("resolve scripts root {}", root.display()))
}

pub fn resolve_playbooks_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env_path(PLAYBOOKS_ROOT_ENV) {
        return Ok(path);
    }

    // Default to ~/.local/share/seqrun/playbooks
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(data_dir.join("seqrun").join("playbooks"))
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
