//! Serialization gate for the external extraction pipeline.
//!
//! The embedding extractor must never see concurrent invocations: at
//! most one frame may be in flight at any time. A frame arriving while
//! one is processing is dropped, not queued — queued frames would grow
//! memory and latency without bound under load, and the next frame is a
//! natural retry anyway.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Mutual-exclusion gate with a drop-not-queue contention policy.
///
/// Take a permit with [`try_enter`](Self::try_enter) before handing a
/// frame to the extractor; the permit releases the gate when dropped.
#[derive(Debug, Default)]
pub struct ExtractGate {
    busy: AtomicBool,
    dropped: AtomicU64,
}

/// Exclusive right to run one extraction; releases the gate on drop.
#[must_use = "dropping the permit immediately reopens the gate"]
pub struct ExtractPermit<'a> {
    gate: &'a ExtractGate,
}

impl ExtractGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the gate. Returns `None` — and counts the drop —
    /// when an extraction is already in flight.
    pub fn try_enter(&self) -> Option<ExtractPermit<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(ExtractPermit { gate: self })
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("frame dropped: extraction already in flight");
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    /// Frames dropped due to contention since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for ExtractPermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_permit_at_a_time() {
        let gate = ExtractGate::new();
        let permit = gate.try_enter();
        assert!(permit.is_some());
        assert!(gate.is_busy());

        // Second frame arrives mid-flight: dropped, not queued.
        assert!(gate.try_enter().is_none());
        assert_eq!(gate.dropped(), 1);
    }

    #[test]
    fn test_permit_release_reopens_gate() {
        let gate = ExtractGate::new();
        {
            let _permit = gate.try_enter().unwrap();
            assert!(gate.is_busy());
        }
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
        assert_eq!(gate.dropped(), 0);
    }

    #[test]
    fn test_drop_counter_accumulates() {
        let gate = ExtractGate::new();
        let _permit = gate.try_enter().unwrap();
        for _ in 0..3 {
            assert!(gate.try_enter().is_none());
        }
        assert_eq!(gate.dropped(), 3);
    }
}
