//! Core data model for the persistence layer.
//!
//! Identifiers are opaque 64-bit integers assigned by the remote service.
//! They carry no arithmetic of their own, so plain aliases keep call sites
//! light while the names document intent.

use serde::{Deserialize, Serialize};

/// Opaque user identifier assigned by the remote service.
pub type UserId = i64;

/// Opaque channel identifier assigned by the remote service.
pub type ChannelId = i64;

/// Opaque agent identifier owning a persisted session document.
pub type AgentId = i64;

/// Global synchronization checkpoint for one user.
///
/// Each field is an opaque marker advanced by the remote service as change
/// batches are delivered. Markers are monotonically advancing but not
/// required to be gap-free. A checkpoint "exists" once at least one field
/// has ever been written for the user; fields that were never written read
/// back as zero, and only the aggregate existence (the `Option` wrapping on
/// reads) is meaningful for bootstrap decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Primary event marker.
    pub pts: i32,
    /// Secondary (encrypted/queued) event marker.
    pub qts: i32,
    /// Server date of the last processed batch.
    pub date: i32,
    /// Sequence marker, reported jointly with `date` by the remote.
    pub seq: i32,
}

/// Opaque per-user login credentials.
///
/// Stored as a pass-through for the client's authentication flow; this
/// layer attaches no meaning to either field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub secret: String,
}
