pub mod client;
pub mod messages;
pub mod recognizer;

pub use client::NatsClient;
pub use messages::{AudioFrameMessage, TranscriptMessage};
pub use recognizer::{NatsRecognizer, NatsRecognizerFactory, POLL_INTERVAL};
