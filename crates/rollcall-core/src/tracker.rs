//! Session-scoped deduplication of unrecognized faces.
//!
//! Unknown faces carry no usable embedding signature, so the tracker
//! correlates repeated detections purely by screen position and recency:
//! an unmatched detection near a live entry refreshes that entry, one
//! far from every entry opens a new one, and entries unseen for longer
//! than the TTL are evicted. Entries live only for the session and are
//! never persisted.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Reference resolution for the default correlation radius.
const REFERENCE_WIDTH: f32 = 640.0;
const REFERENCE_HEIGHT: f32 = 480.0;

/// Correlation radius at the reference resolution.
pub const DEFAULT_RADIUS_PX: f32 = 80.0;

/// How long an entry survives without being seen again.
pub const DEFAULT_TTL: Duration = Duration::from_millis(5000);

/// 2D point in frame-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Tracker tuning, defaulting to 80 px / 5 s at 640×480.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub radius_px: f32,
    pub ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            radius_px: DEFAULT_RADIUS_PX,
            ttl: DEFAULT_TTL,
        }
    }
}

impl TrackerConfig {
    /// Scale the correlation radius to a session resolution,
    /// proportionally to the frame diagonal against the 640×480
    /// reference.
    pub fn scaled_to(self, width: u32, height: u32) -> Self {
        let reference = (REFERENCE_WIDTH.powi(2) + REFERENCE_HEIGHT.powi(2)).sqrt();
        let actual = ((width as f32).powi(2) + (height as f32).powi(2)).sqrt();
        Self {
            radius_px: self.radius_px * actual / reference,
            ..self
        }
    }
}

/// One live unrecognized face.
#[derive(Debug, Clone)]
pub struct UnknownFaceEntry {
    pub id: Uuid,
    pub position: Point,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

/// Outcome of correlating one unmatched detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// True when the detection opened a new entry.
    pub novel: bool,
    pub id: Uuid,
}

/// Registry of spatially distinct unrecognized faces.
pub struct UnknownFaceTracker {
    entries: Vec<UnknownFaceEntry>,
    radius_px: f32,
    ttl: Duration,
}

impl UnknownFaceTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            entries: Vec::new(),
            radius_px: config.radius_px,
            ttl: config.ttl,
        }
    }

    /// Correlate an unmatched detection with the live entries.
    ///
    /// The nearest entry within the correlation radius is treated as
    /// the same person: its `last_seen` is refreshed and its position
    /// follows the detection (slow drift). Equidistant candidates
    /// tie-break to the most recently seen entry. With no entry in
    /// range, a new one is opened.
    pub fn reconcile(&mut self, position: Point, now: Instant) -> Reconciliation {
        let mut best: Option<(usize, f32)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let d = position.distance(&entry.position);
            let closer = match best {
                None => true,
                Some((j, best_d)) => {
                    d < best_d || (d == best_d && entry.last_seen > self.entries[j].last_seen)
                }
            };
            if closer {
                best = Some((i, d));
            }
        }

        match best {
            Some((i, d)) if d < self.radius_px => {
                let entry = &mut self.entries[i];
                entry.last_seen = now;
                entry.position = position;
                Reconciliation {
                    novel: false,
                    id: entry.id,
                }
            }
            _ => {
                let id = Uuid::new_v4();
                tracing::debug!(%id, x = position.x, y = position.y, "tracking new unknown face");
                self.entries.push(UnknownFaceEntry {
                    id,
                    position,
                    first_seen: now,
                    last_seen: now,
                });
                Reconciliation { novel: true, id }
            }
        }
    }

    /// Drop entries unseen for longer than the TTL.
    ///
    /// Must run once per frame, detections or not, so a person who
    /// walks out of frame is forgotten after the TTL.
    pub fn evict_stale(&mut self, now: Instant) {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|e| now.saturating_duration_since(e.last_seen) <= ttl);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.entries.len(), "evicted stale unknown faces");
        }
    }

    /// Live entries after the most recent eviction.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[UnknownFaceEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> UnknownFaceTracker {
        UnknownFaceTracker::new(TrackerConfig::default())
    }

    fn p(x: f32, y: f32) -> Point {
        Point { x, y }
    }

    #[test]
    fn test_repeat_detection_is_one_entry() {
        let mut t = tracker();
        let now = Instant::now();
        let first = t.reconcile(p(100.0, 100.0), now);
        let second = t.reconcile(p(100.0, 100.0), now + Duration::from_millis(40));
        assert!(first.novel);
        assert!(!second.novel);
        assert_eq!(first.id, second.id);
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn test_distinct_positions_open_distinct_entries() {
        // (100,100) and (105,102) correlate; (400,400) does not.
        let mut t = tracker();
        let now = Instant::now();
        assert!(t.reconcile(p(100.0, 100.0), now).novel);
        assert!(!t.reconcile(p(105.0, 102.0), now).novel);
        assert!(t.reconcile(p(400.0, 400.0), now).novel);
        assert_eq!(t.count(), 2);
    }

    #[test]
    fn test_eviction_after_ttl() {
        let mut t = tracker();
        let start = Instant::now();
        t.reconcile(p(50.0, 50.0), start);

        // Exactly at the TTL the entry survives (strictly-greater rule).
        t.evict_stale(start + DEFAULT_TTL);
        assert_eq!(t.count(), 1);

        t.evict_stale(start + DEFAULT_TTL + Duration::from_millis(1));
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn test_refresh_defers_eviction() {
        let mut t = tracker();
        let start = Instant::now();
        t.reconcile(p(50.0, 50.0), start);

        let mid = start + Duration::from_millis(4000);
        t.reconcile(p(52.0, 50.0), mid);

        // 6 s after the first sighting but only 2 s after the refresh.
        t.evict_stale(start + Duration::from_millis(6000));
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn test_equidistant_tie_breaks_to_most_recent() {
        let mut t = tracker();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(100);

        let older = t.reconcile(p(0.0, 0.0), t0);
        let newer = t.reconcile(p(100.0, 0.0), t1);
        assert!(older.novel && newer.novel);

        // (50,0) is exactly 50 px from both entries.
        let hit = t.reconcile(p(50.0, 0.0), t1 + Duration::from_millis(100));
        assert!(!hit.novel);
        assert_eq!(hit.id, newer.id);
    }

    #[test]
    fn test_position_drifts_with_detections() {
        let mut t = tracker();
        let now = Instant::now();
        t.reconcile(p(0.0, 0.0), now);
        t.reconcile(p(50.0, 0.0), now + Duration::from_millis(30));
        // 100 px from the origin but 50 px from the drifted position.
        let r = t.reconcile(p(100.0, 0.0), now + Duration::from_millis(60));
        assert!(!r.novel);
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn test_radius_scales_with_resolution() {
        let config = TrackerConfig::default().scaled_to(1280, 960);
        assert!((config.radius_px - 160.0).abs() < 1e-3);

        let same = TrackerConfig::default().scaled_to(640, 480);
        assert!((same.radius_px - DEFAULT_RADIUS_PX).abs() < 1e-3);
    }

    #[test]
    fn test_boundary_distance_is_novel() {
        // Exactly the radius away is outside (strictly-below rule).
        let mut t = tracker();
        let now = Instant::now();
        t.reconcile(p(0.0, 0.0), now);
        let r = t.reconcile(p(DEFAULT_RADIUS_PX, 0.0), now);
        assert!(r.novel);
        assert_eq!(t.count(), 2);
    }
}
