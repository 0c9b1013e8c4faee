//! Speech recognition plumbing
//!
//! - `recognizer`: the blocking backend contract and its data types
//! - `adapter`: chunk queue → request stream
//! - `dispatcher`: response stream → transcript events

pub mod adapter;
pub mod dispatcher;
pub mod recognizer;

pub use adapter::QueueRequests;
pub use dispatcher::{dispatch, events_from, TranscriptEvent};
pub use recognizer::{
    Alternative, AudioEncoding, AudioRequest, RecognitionConfig, RecognitionResponse,
    RecognitionResult, RecognizerFactory, RequestStream, ResponseStream, SpeechRecognizer,
};
