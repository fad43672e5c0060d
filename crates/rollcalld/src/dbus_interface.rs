use rollcall_core::{Descriptor, Detection, ExtractGate, Point};
use serde::Deserialize;
use zbus::interface;

use crate::engine::{EngineError, EngineHandle};

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Rollcall1
/// Object path: /org/rollcall/Rollcall1
///
/// Structured results are JSON strings. The external detection pipeline
/// pushes frames through `SubmitFrame`; the gate enforces the
/// one-frame-in-flight contract by dropping (not queueing) contended
/// submissions.
pub struct RollcallService {
    engine: EngineHandle,
    gate: ExtractGate,
}

impl RollcallService {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            gate: ExtractGate::new(),
        }
    }
}

/// Wire form of one detection.
///
/// `descriptor` is absent when the extractor found no face or timed
/// out; a present but malformed descriptor degrades to absent with a
/// diagnostic rather than failing the frame.
#[derive(Debug, Deserialize)]
struct WireDetection {
    x: f32,
    y: f32,
    #[serde(default)]
    descriptor: Option<Vec<f32>>,
}

fn parse_detections(json: &str) -> Result<Vec<Detection>, serde_json::Error> {
    let wire: Vec<WireDetection> = serde_json::from_str(json)?;
    Ok(wire
        .into_iter()
        .map(|d| {
            let descriptor = d.descriptor.and_then(|values| match Descriptor::new(values) {
                Ok(desc) => Some(desc),
                Err(err) => {
                    tracing::warn!(%err, "ignoring malformed descriptor in frame");
                    None
                }
            });
            Detection {
                position: Point { x: d.x, y: d.y },
                descriptor,
            }
        })
        .collect())
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Begin a session from a fresh enrollment snapshot.
    async fn start_session(&self) -> zbus::fdo::Result<String> {
        let info = self.engine.start_session().await.map_err(to_fdo)?;
        to_json(&info)
    }

    /// Process one frame of detections: `[{x, y, descriptor|null}, ...]`.
    ///
    /// Returns the frame summary and current roster, or
    /// `{"dropped": true}` when a frame was already in flight.
    async fn submit_frame(&self, detections_json: &str) -> zbus::fdo::Result<String> {
        let Some(_permit) = self.gate.try_enter() else {
            return Ok(serde_json::json!({
                "dropped": true,
                "dropped_total": self.gate.dropped(),
            })
            .to_string());
        };

        let detections = parse_detections(detections_json)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("bad detections payload: {e}")))?;

        let report = self.engine.process_frame(detections).await.map_err(to_fdo)?;
        let mut value = serde_json::to_value(&report)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        value["dropped"] = serde_json::Value::Bool(false);
        Ok(value.to_string())
    }

    /// End the session and return the final roster.
    async fn end_session(&self) -> zbus::fdo::Result<String> {
        let roster = self.engine.end_session().await.map_err(to_fdo)?;
        to_json(&roster)
    }

    /// Current roster of the active session.
    async fn roster(&self) -> zbus::fdo::Result<String> {
        let roster = self.engine.roster().await.map_err(to_fdo)?;
        to_json(&roster)
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "session_active": status.session_active,
            "enrolled_labels": status.enrolled_labels,
            "roster": status.roster,
            "dropped_frames": self.gate.dropped(),
        })
        .to_string())
    }

    /// Enroll (or fully re-enroll) a label from a JSON array of
    /// 128-float descriptors. Enrollment input is strict: any
    /// wrong-dimension descriptor rejects the call.
    async fn enroll(&self, label: &str, descriptors_json: &str) -> zbus::fdo::Result<String> {
        let raw: Vec<Vec<f32>> = serde_json::from_str(descriptors_json)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("bad descriptors payload: {e}")))?;

        let mut descriptors = Vec::with_capacity(raw.len());
        for values in raw {
            descriptors.push(
                Descriptor::new(values)
                    .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?,
            );
        }

        let summary = self
            .engine
            .enroll(label.to_string(), descriptors)
            .await
            .map_err(to_fdo)?;
        to_json(&summary)
    }

    /// List enrolled labels with their descriptor counts.
    async fn list_enrollments(&self) -> zbus::fdo::Result<String> {
        let listing = self.engine.list_enrollments().await.map_err(to_fdo)?;
        to_json(&listing)
    }

    /// Remove one enrollment. Returns whether it existed.
    async fn remove_enrollment(&self, label: &str) -> zbus::fdo::Result<bool> {
        self.engine
            .remove_enrollment(label.to_string())
            .await
            .map_err(to_fdo)
    }

    /// Remove all enrollments. Returns how many were removed.
    async fn purge_enrollments(&self) -> zbus::fdo::Result<u32> {
        self.engine.purge_enrollments().await.map_err(to_fdo)
    }

    /// Render the current roster as CSV.
    async fn export_csv(&self) -> zbus::fdo::Result<String> {
        self.engine.export_csv().await.map_err(to_fdo)
    }
}
