//! Nearest-neighbor identity matcher.
//!
//! Maps a query descriptor to an enrolled label or unknown. A label's
//! representative distance is the minimum over all of its enrolled
//! descriptors — a person matches if any of their reference captures is
//! close enough. The matcher is an immutable snapshot of the enrollment
//! set; callers rebuild it when enrollments change.

use crate::descriptor::Descriptor;
use crate::store::EnrollmentRecord;
use serde::Serialize;

/// Default acceptance threshold on Euclidean distance.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Calibration constant for the advisory confidence value
/// (empirical for 128-d embeddings under Euclidean distance).
const CONFIDENCE_NORM: f32 = 1.2;

/// Result of matching one query against the enrollment snapshot.
///
/// `distance` and `confidence` always describe the numerically best
/// candidate, even when the match was rejected by the threshold and
/// `label` is `None` — callers and tests can inspect near-misses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Matched label, or `None` for unknown.
    pub label: Option<String>,
    /// Euclidean distance of the best candidate (infinite when the
    /// enrollment set is empty).
    pub distance: f32,
    /// Advisory confidence in [0, 1]; never used for accept/reject.
    pub confidence: f32,
}

impl MatchResult {
    fn unknown() -> Self {
        Self {
            label: None,
            distance: f32::INFINITY,
            confidence: 0.0,
        }
    }

    pub fn is_known(&self) -> bool {
        self.label.is_some()
    }
}

struct LabeledDescriptors {
    label: String,
    descriptors: Vec<Descriptor>,
}

/// Immutable enrollment snapshot with nearest-neighbor lookup.
pub struct IdentityMatcher {
    gallery: Vec<LabeledDescriptors>,
    threshold: f32,
}

impl IdentityMatcher {
    /// Build a matcher from enrollment records.
    ///
    /// Records without descriptors are skipped with a diagnostic. An
    /// empty (or fully skipped) enrollment set yields a valid matcher
    /// that answers unknown to every query.
    pub fn build(records: &[EnrollmentRecord], threshold: f32) -> Self {
        let mut gallery = Vec::with_capacity(records.len());
        for record in records {
            if record.descriptors.is_empty() {
                tracing::warn!(label = %record.label, "skipping enrollment with no descriptors");
                continue;
            }
            gallery.push(LabeledDescriptors {
                label: record.label.clone(),
                descriptors: record.descriptors.clone(),
            });
        }

        if gallery.is_empty() {
            tracing::warn!("no usable enrollments; every face will be reported unknown");
        }

        Self { gallery, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Number of labels in the snapshot.
    pub fn label_count(&self) -> usize {
        self.gallery.len()
    }

    /// Find the best-matching label for a query descriptor.
    ///
    /// Pure function of the snapshot and the query: identical inputs
    /// always produce identical results. Ties on the representative
    /// distance go to the earlier-enrolled label.
    pub fn find_best_match(&self, query: &Descriptor) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        for entry in &self.gallery {
            let representative = entry
                .descriptors
                .iter()
                .map(|d| query.distance(d))
                .fold(f32::INFINITY, f32::min);

            // Strict `<` keeps the first-enrolled label on exact ties.
            if representative < best_distance {
                best_distance = representative;
                best_label = Some(&entry.label);
            }
        }

        let Some(label) = best_label else {
            return MatchResult::unknown();
        };

        MatchResult {
            label: (best_distance < self.threshold).then(|| label.to_string()),
            distance: best_distance,
            confidence: (1.0 - best_distance / CONFIDENCE_NORM).max(0.0),
        }
    }

    /// Match a raw float vector, tolerating malformed input.
    ///
    /// A wrong-dimension query answers unknown with a diagnostic rather
    /// than an error, so a single bad detection can never interrupt the
    /// caller's frame loop.
    pub fn find_best_match_raw(&self, values: &[f32]) -> MatchResult {
        match Descriptor::new(values.to_vec()) {
            Ok(query) => self.find_best_match(&query),
            Err(err) => {
                tracing::warn!(%err, "malformed query descriptor; treating as unknown");
                MatchResult::unknown()
            }
        }
    }
}
