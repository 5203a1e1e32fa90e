use std::fmt;

use geovc_types::ObjectId;

/// Per-item result of a bulk store operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BulkOutcome {
    /// `put_all`: the object was newly stored.
    Inserted,
    /// `put_all`: the object was already present.
    AlreadyExisted,
    /// `get_all`: the object was read.
    Found,
    /// `delete_all`: the object was removed.
    Deleted,
    /// `get_all`/`delete_all`: no object with this id.
    NotFound,
    /// The item failed; the rest of the batch still ran.
    Failed(String),
}

impl fmt::Display for BulkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::AlreadyExisted => write!(f, "already existed"),
            Self::Found => write!(f, "found"),
            Self::Deleted => write!(f, "deleted"),
            Self::NotFound => write!(f, "not found"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Receives one callback per item of a bulk operation.
pub trait BulkOpListener {
    fn on_item(&mut self, id: &ObjectId, outcome: BulkOutcome);
}

impl<F> BulkOpListener for F
where
    F: FnMut(&ObjectId, BulkOutcome),
{
    fn on_item(&mut self, id: &ObjectId, outcome: BulkOutcome) {
        self(id, outcome)
    }
}

/// Listener that ignores every outcome.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl BulkOpListener for NoopListener {
    fn on_item(&mut self, _id: &ObjectId, _outcome: BulkOutcome) {}
}

/// Listener that tallies outcomes and keeps the failures.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountingListener {
    pub inserted: usize,
    pub already_existed: usize,
    pub found: usize,
    pub deleted: usize,
    pub not_found: usize,
    pub failed: Vec<(ObjectId, String)>,
}

impl CountingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items reported in total.
    pub fn total(&self) -> usize {
        self.inserted
            + self.already_existed
            + self.found
            + self.deleted
            + self.not_found
            + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl BulkOpListener for CountingListener {
    fn on_item(&mut self, id: &ObjectId, outcome: BulkOutcome) {
        match outcome {
            BulkOutcome::Inserted => self.inserted += 1,
            BulkOutcome::AlreadyExisted => self.already_existed += 1,
            BulkOutcome::Found => self.found += 1,
            BulkOutcome::Deleted => self.deleted += 1,
            BulkOutcome::NotFound => self.not_found += 1,
            BulkOutcome::Failed(reason) => self.failed.push((*id, reason)),
        }
    }
}
