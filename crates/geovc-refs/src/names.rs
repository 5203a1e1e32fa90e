//! Ref name validation.
//!
//! Branch and tag names follow git-style rules: non-empty, no whitespace or
//! `~ ^ : ? * [ \`, no `..` or `@{`, no leading/trailing `.` or `/`, no
//! `.lock` suffix, and no empty or dot-prefixed path components. Names are
//! also used as relative file paths by the file-backed store, which these
//! rules keep inside the refs directory.

use crate::error::{RefError, Result};
use crate::types::{HEADS_PREFIX, TAGS_PREFIX};

const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn reject(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Returns why `name` is not a valid short ref name, if it is not.
fn problem(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("must not be empty".into());
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control()) {
        return Some(format!("contains forbidden character: {ch:?}"));
    }
    for pattern in ["..", "@{", "//"] {
        if name.contains(pattern) {
            return Some(format!("must not contain {pattern:?}"));
        }
    }
    if name.ends_with('.') || name.ends_with('/') || name.starts_with('/') {
        return Some("must not start with '/' or end with '.' or '/'".into());
    }
    if name.ends_with(".lock") {
        return Some("must not end with '.lock'".into());
    }
    name.split('/')
        .find(|c| c.starts_with('.'))
        .map(|c| format!("component must not start with '.': {c:?}"))
}

/// Validate a short branch name such as `main` or `import/roads`.
///
/// ```
/// use geovc_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("import/roads").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    match problem(name) {
        Some(reason) => Err(reject(name, reason)),
        None => Ok(()),
    }
}

/// Validate a tag name. Same rules as branch names.
pub fn validate_tag_name(name: &str) -> Result<()> {
    match problem(name) {
        Some(reason) => Err(reject(name, format!("invalid tag name: {reason}"))),
        None => Ok(()),
    }
}

/// Validate a canonical ref name (`refs/heads/<branch>` or `refs/tags/<tag>`).
pub fn validate_ref_name(name: &str) -> Result<()> {
    if let Some(branch) = name.strip_prefix(HEADS_PREFIX) {
        validate_branch_name(branch)
    } else if let Some(tag) = name.strip_prefix(TAGS_PREFIX) {
        validate_tag_name(tag)
    } else {
        Err(reject(name, "must start with refs/heads/ or refs/tags/"))
    }
}
