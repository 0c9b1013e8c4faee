use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::QueueConfig;
use crate::recognition::RecognitionConfig;

/// When the recognition worker is spawned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Right after the client authenticates
    #[default]
    OnAuth,
    /// On the first binary audio frame
    OnFirstAudio,
}

/// Configuration for a transcription session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Settings handed to the recognizer
    pub recognition: RecognitionConfig,

    /// Watchdog deadline for the running phase
    /// Default: 270 seconds (stays under the 5 minute streaming limit)
    pub max_duration: Duration,

    /// How long stop/cancel waits for the worker before aborting it
    pub stop_grace: Duration,

    /// Chunk queue bound and overflow policy
    pub queue: QueueConfig,

    pub start_policy: StartPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recognition: RecognitionConfig::default(),
            max_duration: Duration::from_secs(270), // 4.5 minutes
            stop_grace: Duration::from_secs(5),
            queue: QueueConfig::default(), // Unbounded
            start_policy: StartPolicy::OnAuth,
        }
    }
}
