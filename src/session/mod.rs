//! Transcription session management
//!
//! This module provides the `TranscriptionSession` abstraction that manages:
//! - The lifecycle state machine (Idle → Running → Stopping → Stopped)
//! - The recognition worker (blocking recognizer + async dispatcher)
//! - The session deadline (watchdog)
//! - Session statistics

mod config;
mod session;
mod state;
mod stats;

pub use config::{SessionConfig, StartPolicy};
pub use session::TranscriptionSession;
pub use state::{Lifecycle, LifecycleState};
pub use stats::SessionStats;
