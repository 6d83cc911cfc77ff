//! Length-prefixed key encoding for LMDB storage.
//!
//! All keys are encoded as: [len1][bytes1][len2][bytes2]...
//! - Lengths are big-endian u16; a longer part is rejected, never cut
//! - No delimiters, no escaping: project names and refs may contain '/'
//! - A key built from the first N parts is a scan prefix for longer keys

use crate::error::{AclError, Result};

/// Build a length-prefixed key from parts
///
/// # Example
/// ```
/// use refacl::keys::{build_key, parse_key};
/// let key = build_key(&["platform/core", "refs/meta/config"]).unwrap();
/// assert_eq!(parse_key(&key), vec!["platform/core", "refs/meta/config"]);
/// ```
#[inline]
pub fn build_key(parts: &[&str]) -> Result<Vec<u8>> {
    let total_len: usize = parts.iter().map(|p| 2 + p.len()).sum();
    let mut key = Vec::with_capacity(total_len);
    for part in parts {
        let len = u16::try_from(part.len())
            .map_err(|_| AclError::Storage(format!("key part of {} bytes exceeds {}", part.len(), u16::MAX)))?;
        key.extend_from_slice(&len.to_be_bytes());
        key.extend_from_slice(part.as_bytes());
    }
    Ok(key)
}

/// Build a prefix for scanning (same as build_key, just clearer intent)
#[inline]
pub fn build_prefix(parts: &[&str]) -> Result<Vec<u8>> {
    build_key(parts)
}

/// Parse a length-prefixed key into parts; stops at the first malformed part
pub fn parse_key(bytes: &[u8]) -> Vec<&str> {
    let mut parts = Vec::with_capacity(2);
    let mut i = 0;
    while let Some((part, next)) = next_part(bytes, i) {
        parts.push(part);
        i = next;
    }
    parts
}

/// Get the Nth part from a key without allocating
#[inline]
pub fn get_part(bytes: &[u8], n: usize) -> Option<&str> {
    let mut i = 0;
    for _ in 0..n {
        i = next_part(bytes, i)?.1;
    }
    next_part(bytes, i).map(|(p, _)| p)
}

fn next_part(bytes: &[u8], i: usize) -> Option<(&str, usize)> {
    let len = u16::from_be_bytes([*bytes.get(i)?, *bytes.get(i + 1)?]) as usize;
    let start = i + 2;
    let part = std::str::from_utf8(bytes.get(start..start + len)?).ok()?;
    Some((part, start + len))
}

// ============================================================================
// Ref keys (2-part: project, ref)
// ============================================================================

/// Build ref key: [project][ref]
#[inline]
pub fn ref_key(project: &str, ref_name: &str) -> Result<Vec<u8>> {
    build_key(&[project, ref_name])
}

/// Parse ref key into (project, ref)
#[inline]
pub fn parse_ref(bytes: &[u8]) -> Option<(&str, &str)> {
    Some((get_part(bytes, 0)?, get_part(bytes, 1)?))
}

// ============================================================================
// Tests
// ============================================================================
