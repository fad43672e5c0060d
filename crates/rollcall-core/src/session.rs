//! Per-frame orchestration: match each detection, accumulate the roster.
//!
//! Known presence is sticky for the session — once a label is matched it
//! is never removed, even if the person leaves the frame. Unknown
//! presence is not: it follows the tracker's live entry count. The
//! asymmetry is intentional; identity, once confirmed, needs no
//! re-confirmation.

use crate::descriptor::Descriptor;
use crate::matcher::{IdentityMatcher, MatchResult};
use crate::tracker::{Point, TrackerConfig, UnknownFaceTracker};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One detected face, as delivered by the external detection pipeline.
///
/// `descriptor` is `None` when the extractor found no usable face in
/// the region or timed out; such detections are skipped, not errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub position: Point,
    pub descriptor: Option<Descriptor>,
}

/// Running attendance state, derived from matcher and tracker state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRoster {
    /// Matched labels in first-seen order, duplicate-free.
    pub known_labels: Vec<String>,
    /// Distinct unrecognized faces currently live in the tracker.
    pub unknown_count: usize,
}

/// Accounting for one processed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameSummary {
    pub detections: usize,
    pub matched: usize,
    pub unknown_novel: usize,
    pub unknown_correlated: usize,
    pub no_descriptor: usize,
}

/// Owns the matcher snapshot, the unknown-face tracker, and the roster
/// for one attendance session.
pub struct SessionPipeline {
    matcher: IdentityMatcher,
    tracker: UnknownFaceTracker,
    known: Vec<String>,
}

impl SessionPipeline {
    pub fn new(matcher: IdentityMatcher, tracker_config: TrackerConfig) -> Self {
        Self {
            matcher,
            tracker: UnknownFaceTracker::new(tracker_config),
            known: Vec::new(),
        }
    }

    /// Process one frame's detections.
    ///
    /// Frames are strictly sequential; the caller serializes access
    /// (see [`crate::gate::ExtractGate`]). Stale unknown entries are
    /// evicted at the end of every frame, including empty ones.
    pub fn process_frame(&mut self, detections: &[Detection], now: Instant) -> FrameSummary {
        let mut summary = FrameSummary {
            detections: detections.len(),
            ..FrameSummary::default()
        };

        for detection in detections {
            let Some(descriptor) = &detection.descriptor else {
                summary.no_descriptor += 1;
                continue;
            };

            let result = self.matcher.find_best_match(descriptor);
            match &result.label {
                Some(label) => {
                    summary.matched += 1;
                    self.mark_present(label, &result);
                }
                None => {
                    let outcome = self.tracker.reconcile(detection.position, now);
                    if outcome.novel {
                        summary.unknown_novel += 1;
                    } else {
                        summary.unknown_correlated += 1;
                    }
                }
            }
        }

        self.tracker.evict_stale(now);
        summary
    }

    /// Idempotent roster insertion, first-seen order.
    fn mark_present(&mut self, label: &str, result: &MatchResult) {
        if !self.known.iter().any(|l| l.as_str() == label) {
            tracing::info!(
                label,
                distance = result.distance,
                confidence = result.confidence,
                "marked present"
            );
            self.known.push(label.to_string());
        }
    }

    pub fn roster(&self) -> SessionRoster {
        SessionRoster {
            known_labels: self.known.clone(),
            unknown_count: self.tracker.count(),
        }
    }

    pub fn matcher(&self) -> &IdentityMatcher {
        &self.matcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DESCRIPTOR_DIM;
    use crate::store::EnrollmentRecord;
    use crate::tracker::DEFAULT_TTL;
    use chrono::Utc;
    use std::time::Duration;

    fn desc_at(x: f32) -> Descriptor {
        let mut values = vec![0.0f32; DESCRIPTOR_DIM];
        values[0] = x;
        Descriptor::new(values).unwrap()
    }

    fn record(label: &str, at: f32) -> EnrollmentRecord {
        let now = Utc::now();
        EnrollmentRecord {
            label: label.to_string(),
            descriptors: vec![desc_at(at)],
            created_at: now,
            updated_at: now,
        }
    }

    fn pipeline() -> SessionPipeline {
        // Alice at 0.0 and Bob at 10.0; queries near 5.0 match nobody.
        let records = vec![record("Alice", 0.0), record("Bob", 10.0)];
        SessionPipeline::new(
            IdentityMatcher::build(&records, 0.6),
            TrackerConfig::default(),
        )
    }

    fn detection(x: f32, y: f32, descriptor: Option<Descriptor>) -> Detection {
        Detection {
            position: Point { x, y },
            descriptor,
        }
    }

    #[test]
    fn test_known_match_joins_roster() {
        let mut p = pipeline();
        let summary = p.process_frame(
            &[detection(10.0, 10.0, Some(desc_at(0.1)))],
            Instant::now(),
        );
        assert_eq!(summary.matched, 1);
        assert_eq!(p.roster().known_labels, vec!["Alice".to_string()]);
    }

    #[test]
    fn test_known_presence_is_sticky() {
        let mut p = pipeline();
        let start = Instant::now();
        p.process_frame(&[detection(10.0, 10.0, Some(desc_at(0.0)))], start);

        // Alice leaves; many empty frames later she is still present.
        for i in 1..10 {
            p.process_frame(&[], start + Duration::from_secs(i));
        }
        assert_eq!(p.roster().known_labels, vec!["Alice".to_string()]);
    }

    #[test]
    fn test_roster_insertion_is_idempotent() {
        let mut p = pipeline();
        let now = Instant::now();
        let frame = [
            detection(10.0, 10.0, Some(desc_at(0.0))),
            detection(300.0, 10.0, Some(desc_at(0.05))),
        ];
        p.process_frame(&frame, now);
        p.process_frame(&frame, now + Duration::from_millis(40));
        assert_eq!(p.roster().known_labels, vec!["Alice".to_string()]);
    }

    #[test]
    fn test_roster_preserves_first_seen_order() {
        let mut p = pipeline();
        let now = Instant::now();
        p.process_frame(&[detection(10.0, 10.0, Some(desc_at(10.0)))], now);
        p.process_frame(
            &[detection(10.0, 10.0, Some(desc_at(0.0)))],
            now + Duration::from_millis(40),
        );
        assert_eq!(
            p.roster().known_labels,
            vec!["Bob".to_string(), "Alice".to_string()]
        );
    }

    #[test]
    fn test_unknown_goes_through_tracker() {
        let mut p = pipeline();
        let now = Instant::now();
        // 5.0 is 5 units from both labels — far beyond the threshold.
        let summary = p.process_frame(&[detection(100.0, 100.0, Some(desc_at(5.0)))], now);
        assert_eq!(summary.matched, 0);
        assert_eq!(summary.unknown_novel, 1);
        assert_eq!(p.roster().unknown_count, 1);
    }

    #[test]
    fn test_unknown_count_can_fall_while_known_set_cannot() {
        let mut p = pipeline();
        let start = Instant::now();
        p.process_frame(
            &[
                detection(10.0, 10.0, Some(desc_at(0.0))),
                detection(400.0, 400.0, Some(desc_at(5.0))),
            ],
            start,
        );
        assert_eq!(p.roster().unknown_count, 1);
        assert_eq!(p.roster().known_labels.len(), 1);

        // An empty frame after the TTL still evicts the unknown.
        p.process_frame(&[], start + DEFAULT_TTL + Duration::from_millis(1));
        let roster = p.roster();
        assert_eq!(roster.unknown_count, 0);
        assert_eq!(roster.known_labels.len(), 1);
    }

    #[test]
    fn test_descriptorless_detection_is_skipped() {
        let mut p = pipeline();
        let summary = p.process_frame(&[detection(10.0, 10.0, None)], Instant::now());
        assert_eq!(summary.no_descriptor, 1);
        assert_eq!(summary.matched, 0);
        let roster = p.roster();
        assert!(roster.known_labels.is_empty());
        assert_eq!(roster.unknown_count, 0);
    }

    #[test]
    fn test_mixed_frame_summary() {
        let mut p = pipeline();
        let now = Instant::now();
        p.process_frame(&[detection(100.0, 100.0, Some(desc_at(5.0)))], now);
        let summary = p.process_frame(
            &[
                detection(10.0, 10.0, Some(desc_at(0.0))),
                detection(102.0, 101.0, Some(desc_at(5.0))),
                detection(400.0, 100.0, None),
            ],
            now + Duration::from_millis(40),
        );
        assert_eq!(
            summary,
            FrameSummary {
                detections: 3,
                matched: 1,
                unknown_novel: 0,
                unknown_correlated: 1,
                no_descriptor: 1,
            }
        );
    }
}
