//! Runtime settings

use std::path::Path;

use serde::Deserialize;

use crate::constants::{ALL_PROJECTS, DEFAULT_MESSAGE, DEFAULT_REVIEW_MESSAGE, MAX_INHERITANCE_DEPTH};
use crate::error::{AclError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Name of the inheritance root
    pub all_projects: String,
    /// Commit message used when the caller supplies none
    pub default_message: String,
    /// Commit message used for review proposals when the caller supplies none
    pub review_message: String,
    pub max_inheritance_depth: usize,
    /// LMDB map size in bytes
    pub map_size: usize,
    /// Add the project owner groups as reviewers of access proposals
    pub add_owners_as_reviewers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            all_projects: ALL_PROJECTS.to_string(),
            default_message: DEFAULT_MESSAGE.to_string(),
            review_message: DEFAULT_REVIEW_MESSAGE.to_string(),
            max_inheritance_depth: MAX_INHERITANCE_DEPTH,
            map_size: 1 << 30,
            add_owners_as_reviewers: true,
        }
    }
}

impl Settings {
    pub fn from_toml(src: &str) -> Result<Self> {
        let s: Settings = toml::from_str(src).map_err(|e| AclError::Settings(e.to_string()))?;
        if s.all_projects.trim().is_empty() {
            return Err(AclError::Settings("all_projects must not be empty".into()));
        }
        if s.max_inheritance_depth == 0 {
            return Err(AclError::Settings("max_inheritance_depth must be positive".into()));
        }
        Ok(s)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let src = std::fs::read_to_string(path.as_ref()).map_err(|e| AclError::Settings(e.to_string()))?;
        Self::from_toml(&src)
    }

    /// Caller message if non-empty, else `fallback`; always newline-terminated
    pub fn commit_message(message: Option<&str>, fallback: &str) -> String {
        let msg = message.map(str::trim_end).filter(|m| !m.trim().is_empty()).unwrap_or(fallback);
        format!("{}\n", msg)
    }
}
