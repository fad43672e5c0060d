use chrono::Utc;
use rollcall_core::{
    report, Descriptor, Detection, EnrollmentRecord, EnrollmentStore, FrameSummary,
    IdentityMatcher, SessionPipeline, SessionRoster, StoreError, TrackerConfig,
};
use rollcall_store::SqliteEnrollmentStore;
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no active session")]
    NoActiveSession,
    #[error("no descriptors supplied for '{0}'")]
    EmptyEnrollment(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of starting a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub enrolled_labels: usize,
    pub threshold: f32,
    /// True when a previous active session was replaced.
    pub replaced_active: bool,
}

/// Result of processing one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub summary: FrameSummary,
    pub roster: SessionRoster,
}

/// Result of an enrollment operation.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollSummary {
    pub label: String,
    pub descriptor_count: usize,
    /// True when an existing record for this label was replaced.
    pub replaced: bool,
}

/// One row of the enrollment listing.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentInfo {
    pub label: String,
    pub descriptor_count: usize,
    pub created_at: String,
    pub updated_at: String,
}

/// Daemon status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub session_active: bool,
    pub enrolled_labels: usize,
    pub roster: Option<SessionRoster>,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    StartSession {
        reply: oneshot::Sender<Result<SessionInfo, EngineError>>,
    },
    ProcessFrame {
        detections: Vec<Detection>,
        reply: oneshot::Sender<Result<FrameReport, EngineError>>,
    },
    EndSession {
        reply: oneshot::Sender<Result<SessionRoster, EngineError>>,
    },
    Roster {
        reply: oneshot::Sender<Result<SessionRoster, EngineError>>,
    },
    Enroll {
        label: String,
        descriptors: Vec<Descriptor>,
        reply: oneshot::Sender<Result<EnrollSummary, EngineError>>,
    },
    ListEnrollments {
        reply: oneshot::Sender<Result<Vec<EnrollmentInfo>, EngineError>>,
    },
    RemoveEnrollment {
        label: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    PurgeEnrollments {
        reply: oneshot::Sender<Result<u32, EngineError>>,
    },
    ExportCsv {
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<Result<EngineStatus, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn send<T>(
        &self,
        req: EngineRequest,
        reply_rx: oneshot::Receiver<Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        self.tx
            .send(req)
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Build a fresh matcher snapshot from the store and begin a session.
    pub async fn start_session(&self) -> Result<SessionInfo, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::StartSession { reply }, rx).await
    }

    /// Run one frame's detections through the pipeline.
    pub async fn process_frame(
        &self,
        detections: Vec<Detection>,
    ) -> Result<FrameReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::ProcessFrame { detections, reply }, rx)
            .await
    }

    /// Tear down the session and return the final roster.
    pub async fn end_session(&self) -> Result<SessionRoster, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::EndSession { reply }, rx).await
    }

    pub async fn roster(&self) -> Result<SessionRoster, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Roster { reply }, rx).await
    }

    /// Full-replace enrollment for one label.
    pub async fn enroll(
        &self,
        label: String,
        descriptors: Vec<Descriptor>,
    ) -> Result<EnrollSummary, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineRequest::Enroll {
                label,
                descriptors,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn list_enrollments(&self) -> Result<Vec<EnrollmentInfo>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::ListEnrollments { reply }, rx).await
    }

    pub async fn remove_enrollment(&self, label: String) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::RemoveEnrollment { label, reply }, rx)
            .await
    }

    pub async fn purge_enrollments(&self) -> Result<u32, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::PurgeEnrollments { reply }, rx).await
    }

    pub async fn export_csv(&self) -> Result<String, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::ExportCsv { reply }, rx).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Status { reply }, rx).await
    }
}

/// Engine state, owned by the dedicated thread.
struct Engine {
    store: SqliteEnrollmentStore,
    match_threshold: f32,
    tracker_config: TrackerConfig,
    session: Option<SessionPipeline>,
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the store connection and all session state; D-Bus
/// handlers reach it only through the returned handle, which keeps
/// frame processing strictly sequential.
pub fn spawn_engine(
    store: SqliteEnrollmentStore,
    match_threshold: f32,
    tracker_config: TrackerConfig,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut engine = Engine {
                store,
                match_threshold,
                tracker_config,
                session: None,
            };

            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::StartSession { reply } => {
                        let _ = reply.send(engine.start_session());
                    }
                    EngineRequest::ProcessFrame { detections, reply } => {
                        let _ = reply.send(engine.process_frame(detections));
                    }
                    EngineRequest::EndSession { reply } => {
                        let _ = reply.send(engine.end_session());
                    }
                    EngineRequest::Roster { reply } => {
                        let _ = reply.send(engine.roster());
                    }
                    EngineRequest::Enroll {
                        label,
                        descriptors,
                        reply,
                    } => {
                        let _ = reply.send(engine.enroll(label, descriptors));
                    }
                    EngineRequest::ListEnrollments { reply } => {
                        let _ = reply.send(engine.list_enrollments());
                    }
                    EngineRequest::RemoveEnrollment { label, reply } => {
                        let _ = reply.send(engine.remove_enrollment(&label));
                    }
                    EngineRequest::PurgeEnrollments { reply } => {
                        let _ = reply.send(engine.purge_enrollments());
                    }
                    EngineRequest::ExportCsv { reply } => {
                        let _ = reply.send(engine.export_csv());
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(engine.status());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

impl Engine {
    fn start_session(&mut self) -> Result<SessionInfo, EngineError> {
        let records = self.store.load()?;
        let matcher = IdentityMatcher::build(&records, self.match_threshold);

        let replaced_active = self.session.is_some();
        if replaced_active {
            tracing::info!("replacing active session");
        }
        tracing::info!(
            enrolled = matcher.label_count(),
            threshold = self.match_threshold,
            "session started"
        );

        let info = SessionInfo {
            enrolled_labels: matcher.label_count(),
            threshold: self.match_threshold,
            replaced_active,
        };
        self.session = Some(SessionPipeline::new(matcher, self.tracker_config));
        Ok(info)
    }

    fn process_frame(&mut self, detections: Vec<Detection>) -> Result<FrameReport, EngineError> {
        let session = self.session.as_mut().ok_or(EngineError::NoActiveSession)?;
        let summary = session.process_frame(&detections, Instant::now());
        Ok(FrameReport {
            summary,
            roster: session.roster(),
        })
    }

    fn end_session(&mut self) -> Result<SessionRoster, EngineError> {
        let session = self.session.take().ok_or(EngineError::NoActiveSession)?;
        let roster = session.roster();
        tracing::info!(
            known = roster.known_labels.len(),
            unknown = roster.unknown_count,
            "session ended"
        );
        Ok(roster)
    }

    fn roster(&self) -> Result<SessionRoster, EngineError> {
        self.session
            .as_ref()
            .map(|s| s.roster())
            .ok_or(EngineError::NoActiveSession)
    }

    /// Replace the stored record for `label` (load → filter → push →
    /// save_all). A running session keeps its matcher snapshot; the
    /// change takes effect at the next session start.
    fn enroll(
        &mut self,
        label: String,
        descriptors: Vec<Descriptor>,
    ) -> Result<EnrollSummary, EngineError> {
        if descriptors.is_empty() {
            return Err(EngineError::EmptyEnrollment(label));
        }

        let descriptor_count = descriptors.len();
        let mut record = EnrollmentRecord::new(label.clone(), descriptors).map_err(EngineError::Store)?;

        let mut records = self.store.load()?;
        let previous = records.iter().position(|r| r.label == label);
        let replaced = if let Some(i) = previous {
            // Re-enrollment replaces descriptors but keeps the
            // first-enrollment timestamp.
            record.created_at = records[i].created_at;
            records.remove(i);
            true
        } else {
            false
        };
        records.push(record);
        self.store.save_all(&records)?;

        tracing::info!(label = %label, descriptor_count, replaced, "enrollment saved");
        if self.session.is_some() {
            tracing::info!("active session keeps its snapshot; restart the session to pick this up");
        }

        Ok(EnrollSummary {
            label,
            descriptor_count,
            replaced,
        })
    }

    fn list_enrollments(&self) -> Result<Vec<EnrollmentInfo>, EngineError> {
        let records = self.store.load()?;
        Ok(records
            .iter()
            .map(|r| EnrollmentInfo {
                label: r.label.clone(),
                descriptor_count: r.descriptors.len(),
                created_at: r.created_at.to_rfc3339(),
                updated_at: r.updated_at.to_rfc3339(),
            })
            .collect())
    }

    fn remove_enrollment(&mut self, label: &str) -> Result<bool, EngineError> {
        let removed = self.store.delete_one(label)?;
        tracing::info!(label, removed, "remove enrollment");
        Ok(removed)
    }

    fn purge_enrollments(&mut self) -> Result<u32, EngineError> {
        let count = self.store.load()?.len() as u32;
        self.store.clear_all()?;
        tracing::info!(count, "purged all enrollments");
        Ok(count)
    }

    fn export_csv(&self) -> Result<String, EngineError> {
        let roster = self.roster()?;
        Ok(report::roster_csv(&roster, Utc::now()))
    }

    fn status(&self) -> Result<EngineStatus, EngineError> {
        Ok(EngineStatus {
            session_active: self.session.is_some(),
            enrolled_labels: self.store.load()?.len(),
            roster: self.session.as_ref().map(|s| s.roster()),
        })
    }
}
