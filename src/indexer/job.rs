//! Mutation jobs.

use crate::content::{DocumentId, FieldSet};

/// A queued change to the index. Jobs are applied in submission order.
#[derive(Debug)]
pub enum MutationJob {
    /// Replace whatever is indexed under `id` by `fields`.
    Upsert {
        id: DocumentId,
        fields: Box<dyn FieldSet>,
    },
    /// Remove whatever is indexed under `id`.
    Delete { id: DocumentId },
}

impl MutationJob {
    pub fn id(&self) -> &DocumentId {
        match self {
            MutationJob::Upsert { id, .. } | MutationJob::Delete { id } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MutationJob::Upsert { .. } => "upsert",
            MutationJob::Delete { .. } => "delete",
        }
    }
}
