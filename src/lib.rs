pub mod audio;
pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod nats;
pub mod protocol;
pub mod recognition;
pub mod session;

pub use audio::{AudioChunk, ChunkQueue, OverflowPolicy, PushOutcome, QueueConfig, QueueItem};
pub use auth::{authenticate, StaticTokenVerifier, TokenVerifier, VerifiedUser};
pub use config::Config;
pub use errors::{translate, AuthFailure, ErrorCode, Failure, SessionError};
pub use http::{create_router, run_connection, AppState};
pub use nats::{AudioFrameMessage, NatsClient, NatsRecognizerFactory, TranscriptMessage};
pub use protocol::{ChannelSink, ClientMessage, EventSink, InboundFrame, ServerMessage};
pub use recognition::{
    RecognitionConfig, RecognitionResponse, RecognizerFactory, SpeechRecognizer, TranscriptEvent,
};
pub use session::{
    LifecycleState, SessionConfig, SessionStats, StartPolicy, TranscriptionSession,
};
