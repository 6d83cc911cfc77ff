//! Ref patterns: exact refs and `prefix/*` wildcards
//!
//! Every pattern stored in a section is normalized first, so authorization
//! checks never see the raw caller-supplied string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{REFS, REFS_HEADS};
use crate::error::{AclError, Result};

/// A validated, normalized ref pattern
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RefPattern {
    /// A single ref, e.g. `refs/tags/v1`
    Exact(String),
    /// Every ref under a prefix; holds the prefix without the trailing `/*`
    Wildcard(String),
}

impl RefPattern {
    /// Normalize then classify a caller-supplied pattern
    pub fn parse(raw: &str) -> Result<Self> {
        classify(&normalize(raw))
    }

    /// Authorization scope: the prefix for wildcards, the ref itself otherwise
    pub fn ownership_scope(&self) -> &str {
        match self {
            RefPattern::Exact(r) | RefPattern::Wildcard(r) => r,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, RefPattern::Wildcard(_))
    }

    /// Does this pattern match a concrete ref name?
    pub fn matches(&self, ref_name: &str) -> bool {
        match self {
            RefPattern::Exact(r) => r == ref_name,
            RefPattern::Wildcard(p) => under_prefix(ref_name, p),
        }
    }

    /// Does this pattern cover every ref the other pattern denotes?
    pub fn covers(&self, other: &RefPattern) -> bool {
        match (self, other) {
            (RefPattern::Exact(a), RefPattern::Exact(b)) => a == b,
            (RefPattern::Exact(_), RefPattern::Wildcard(_)) => false,
            (RefPattern::Wildcard(p), RefPattern::Exact(r)) => under_prefix(r, p),
            (RefPattern::Wildcard(p), RefPattern::Wildcard(q)) => p == q || under_prefix(q, p),
        }
    }
}

#[inline]
fn under_prefix(name: &str, prefix: &str) -> bool {
    name.len() > prefix.len() && name.starts_with(prefix) && name.as_bytes()[prefix.len()] == b'/'
}

impl fmt::Display for RefPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefPattern::Exact(r) => f.write_str(r),
            RefPattern::Wildcard(p) => write!(f, "{}/*", p),
        }
    }
}

impl TryFrom<String> for RefPattern {
    type Error = AclError;

    fn try_from(s: String) -> Result<Self> {
        RefPattern::parse(&s)
    }
}

impl From<RefPattern> for String {
    fn from(p: RefPattern) -> Self {
        p.to_string()
    }
}

/// Strip leading slashes and default to the branch namespace
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('/');
    if trimmed.starts_with(REFS) {
        trimmed.to_string()
    } else {
        format!("{}{}", REFS_HEADS, trimmed)
    }
}

/// Classify an already normalized pattern
pub fn classify(pattern: &str) -> Result<RefPattern> {
    if pattern.is_empty() {
        return Err(AclError::pattern(pattern, "empty pattern"));
    }
    let (name, wildcard) = match pattern.strip_suffix("/*") {
        Some(prefix) => (prefix, true),
        None => (pattern, false),
    };
    if name.contains('*') {
        return Err(AclError::pattern(pattern, "'*' is only allowed as a final '/*'"));
    }
    check_ref_name(pattern, name)?;
    Ok(if wildcard {
        RefPattern::Wildcard(name.to_string())
    } else {
        RefPattern::Exact(name.to_string())
    })
}

/// git check-ref-format rules, minus the '*' handling done by the caller
fn check_ref_name(pattern: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AclError::pattern(pattern, "empty ref name"));
    }
    if let Some(c) = name.chars().find(|c| c.is_control() || " ~^:?[\\".contains(*c)) {
        return Err(AclError::pattern(pattern, format!("illegal character {:?}", c)));
    }
    if name.contains("..") || name.contains("@{") || name.contains("//") {
        return Err(AclError::pattern(pattern, "illegal sequence"));
    }
    if name.ends_with('/') || name.ends_with('.') {
        return Err(AclError::pattern(pattern, "illegal trailing character"));
    }
    for component in name.split('/') {
        if component.starts_with('.') || component.ends_with(".lock") {
            return Err(AclError::pattern(pattern, format!("illegal component {:?}", component)));
        }
    }
    Ok(())
}
