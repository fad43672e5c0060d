//! Enrollment persistence contract.
//!
//! The core never touches storage mid-session — it consumes a loaded
//! snapshot at matcher build time and hands modified record sets back.
//! Semantics are last-write-wins per label: re-enrolling a label fully
//! replaces its descriptors, never merges.

use crate::descriptor::Descriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(String),
    #[error("corrupt record for '{label}': {reason}")]
    Corrupt { label: String, reason: String },
    #[error("label must not be empty")]
    EmptyLabel,
}

/// One person's enrolled reference descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    /// Unique key across the store.
    pub label: String,
    pub descriptors: Vec<Descriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrollmentRecord {
    /// Build a fresh record, stamping both timestamps now.
    pub fn new(label: impl Into<String>, descriptors: Vec<Descriptor>) -> Result<Self, StoreError> {
        let label = label.into();
        if label.is_empty() {
            return Err(StoreError::EmptyLabel);
        }
        let now = Utc::now();
        Ok(Self {
            label,
            descriptors,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Abstract store for the full enrollment collection.
///
/// `save_all` replaces the stored collection wholesale; callers wanting
/// per-label updates compose load → modify → save_all.
pub trait EnrollmentStore {
    /// All stored records; empty when nothing has been enrolled.
    fn load(&self) -> Result<Vec<EnrollmentRecord>, StoreError>;

    /// Replace the stored collection (full replace, not merge).
    fn save_all(&self, records: &[EnrollmentRecord]) -> Result<(), StoreError>;

    /// Remove one label. Returns whether a record existed.
    fn delete_one(&self, label: &str) -> Result<bool, StoreError>;

    /// Remove everything.
    fn clear_all(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DESCRIPTOR_DIM;

    #[test]
    fn test_empty_label_rejected() {
        let err = EnrollmentRecord::new("", vec![]).unwrap_err();
        assert!(matches!(err, StoreError::EmptyLabel));
    }

    #[test]
    fn test_new_record_stamps_timestamps() {
        let d = Descriptor::new(vec![0.0; DESCRIPTOR_DIM]).unwrap();
        let record = EnrollmentRecord::new("Alice", vec![d]).unwrap();
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.descriptors.len(), 1);
    }

    #[test]
    fn test_record_serde_round_trip() {
        let d = Descriptor::new(vec![0.25; DESCRIPTOR_DIM]).unwrap();
        let record = EnrollmentRecord::new("Alice", vec![d]).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: EnrollmentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
