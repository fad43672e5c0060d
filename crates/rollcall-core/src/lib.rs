//! rollcall-core — Identity resolution engine for attendance tracking.
//!
//! A multi-sample nearest-neighbor matcher maps 128-dimensional face
//! descriptors to enrolled labels, and a spatial TTL tracker
//! deduplicates the faces nobody recognized. Frame capture, face
//! detection, and descriptor extraction are external collaborators.

pub mod descriptor;
pub mod gate;
pub mod matcher;
pub mod report;
pub mod session;
pub mod store;
pub mod tracker;

pub use descriptor::{Descriptor, DescriptorError, DESCRIPTOR_DIM};
pub use gate::{ExtractGate, ExtractPermit};
pub use matcher::{IdentityMatcher, MatchResult, DEFAULT_MATCH_THRESHOLD};
pub use session::{Detection, FrameSummary, SessionPipeline, SessionRoster};
pub use store::{EnrollmentRecord, EnrollmentStore, StoreError};
pub use tracker::{Point, TrackerConfig, UnknownFaceTracker, DEFAULT_RADIUS_PX, DEFAULT_TTL};
