use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::LifecycleState;

/// Snapshot of a transcription session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Verified user the session belongs to
    pub user_id: String,

    pub state: LifecycleState,

    /// When the session was created (after auth)
    pub started_at: DateTime<Utc>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Audio chunks accepted from the client
    pub chunks_pushed: usize,

    /// Chunks evicted by the drop-oldest overflow policy
    pub chunks_dropped: usize,

    /// Audio requests handed to the recognizer
    pub requests_forwarded: usize,

    /// Transcript events delivered to the client
    pub transcripts_sent: usize,
}
