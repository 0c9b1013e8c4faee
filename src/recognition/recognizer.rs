use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::AudioChunk;

/// Audio encoding announced to the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    Linear16,
    Flac,
    OggOpus,
    /// MediaRecorder output from browsers
    WebmOpus,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Linear16 => "linear16",
            AudioEncoding::Flac => "flac",
            AudioEncoding::OggOpus => "ogg_opus",
            AudioEncoding::WebmOpus => "webm_opus",
        }
    }
}

/// Recognition settings, built once per session and never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub sample_rate_hertz: u32,
    /// BCP-47 language tag
    pub language_code: String,
    pub encoding: AudioEncoding,
    pub enable_automatic_punctuation: bool,
    /// Model selector (e.g. "latest_long" for longer utterances)
    pub model: String,
    /// Emit non-final hypotheses while the user is speaking
    pub interim_results: bool,
    pub single_utterance: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hertz: 16000,
            language_code: "ja-JP".to_string(),
            encoding: AudioEncoding::WebmOpus,
            enable_automatic_punctuation: true,
            model: "latest_long".to_string(),
            interim_results: true,
            single_utterance: false,
        }
    }
}

/// One audio request on the outbound stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRequest {
    pub audio_content: Vec<u8>,
}

impl From<AudioChunk> for AudioRequest {
    fn from(chunk: AudioChunk) -> Self {
        Self {
            audio_content: chunk.into_bytes(),
        }
    }
}

/// A single hypothesis for a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    /// 0.0 to 1.0; recognizers usually only fill this in for final results
    pub confidence: f32,
}

/// One recognition result, best alternative first
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
}

/// One message on the inbound response stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub results: Vec<RecognitionResult>,
}

impl RecognitionResponse {
    /// Response carrying a single result with a single alternative
    pub fn single(transcript: impl Into<String>, confidence: f32, is_final: bool) -> Self {
        Self {
            results: vec![RecognitionResult {
                alternatives: vec![Alternative {
                    transcript: transcript.into(),
                    confidence,
                }],
                is_final,
            }],
        }
    }
}

/// Outbound requests; exhaustion closes the stream
pub type RequestStream = Box<dyn Iterator<Item = AudioRequest> + Send>;

/// Inbound responses, in emission order
pub type ResponseStream = Box<dyn Iterator<Item = Result<RecognitionResponse>> + Send>;

/// Streaming speech recognizer with a synchronous pull protocol
///
/// Implementations may block freely: the session only ever calls them from a
/// dedicated blocking thread.
pub trait SpeechRecognizer: Send {
    /// Open a recognition stream.
    ///
    /// The recognizer pulls `requests` until it is exhausted and yields
    /// responses until it has nothing more to say.
    fn streaming_recognize(
        &mut self,
        config: &RecognitionConfig,
        requests: RequestStream,
    ) -> Result<ResponseStream>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Builds one recognizer per session
///
/// `create` runs on the blocking worker thread, so it may connect eagerly.
pub trait RecognizerFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SpeechRecognizer>>;
}
