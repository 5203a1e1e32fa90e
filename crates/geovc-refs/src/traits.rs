//! The [`RefStore`] trait defining the reference storage interface.

use geovc_types::ObjectId;

use crate::error::{RefError, Result};
use crate::names::validate_branch_name;
use crate::types::{Ref, HEADS_PREFIX, TAGS_PREFIX};

/// Storage backend for named references.
///
/// Refs live under canonical names: `refs/heads/*` for branches and
/// `refs/tags/*` for tags. [`compare_and_swap`](RefStore::compare_and_swap)
/// is the only way concurrent writers should advance a branch; it fails fast
/// with [`RefError::StaleRef`] instead of waiting.
pub trait RefStore: Send + Sync {
    /// Read a ref by its canonical name (e.g. "refs/heads/main").
    ///
    /// Returns `Ok(None)` if the ref does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<Ref>>;

    /// Atomically replace the ref at `name` if it currently points at
    /// `expected` (`None` meaning the ref must not exist yet).
    fn compare_and_swap(&self, name: &str, expected: Option<ObjectId>, new: &Ref) -> Result<()>;

    /// Advance `branch` from `expected` to `commit_id`.
    fn update_branch(&self, branch: &str, expected: Option<ObjectId>, commit_id: ObjectId) -> Result<()> {
        validate_branch_name(branch)?;
        self.compare_and_swap(
            &format!("{HEADS_PREFIX}{branch}"),
            expected,
            &Ref::branch(branch, commit_id),
        )
    }

    /// Commit id at the tip of `branch`, if the branch exists.
    fn branch_head(&self, branch: &str) -> Result<Option<ObjectId>> {
        Ok(self
            .read_ref(&format!("{HEADS_PREFIX}{branch}"))?
            .map(|r| r.commit_id()))
    }

    /// Resolve a ref spec to a commit id.
    ///
    /// Accepts a canonical name, a short branch name or a short tag name,
    /// tried in that order.
    fn resolve(&self, spec: &str) -> Result<ObjectId> {
        let candidates = [
            spec.to_string(),
            format!("{HEADS_PREFIX}{spec}"),
            format!("{TAGS_PREFIX}{spec}"),
        ];
        for name in candidates {
            if !name.starts_with("refs/") {
                continue;
            }
            if let Some(r) = self.read_ref(&name)? {
                return Ok(r.commit_id());
            }
        }
        Err(RefError::NotFound {
            name: spec.to_string(),
        })
    }
}

/// Checks shared by every backend before `reference` replaces `existing`.
pub(crate) fn check_write(name: &str, reference: &Ref, existing: Option<&Ref>) -> Result<()> {
    crate::names::validate_ref_name(name)?;
    if reference.canonical_name() != name {
        return Err(RefError::InvalidBranchName {
            name: name.to_string(),
            reason: format!("ref is named {}", reference.canonical_name()),
        });
    }
    if existing.is_some_and(Ref::is_tag) {
        return Err(RefError::TagImmutable {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Fails with [`RefError::StaleRef`] unless `existing` points at `expected`.
pub(crate) fn check_expected(name: &str, expected: Option<ObjectId>, existing: Option<&Ref>) -> Result<()> {
    let actual = existing.map(Ref::commit_id);
    if actual != expected {
        return Err(RefError::StaleRef {
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
