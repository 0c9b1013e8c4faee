// Speech recognizer backed by an STT service on NATS
//
// Audio requests are published as base64 frames on `audio.frame.speech-<id>`;
// the STT service answers on the transcript subject tree. The async client is
// driven from the blocking recognizer thread through a runtime `Handle`.

use anyhow::{anyhow, Context, Result};
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use super::messages::TranscriptMessage;
use crate::config::NatsConfig;
use crate::recognition::{
    RecognitionConfig, RecognitionResponse, RecognizerFactory, RequestStream, ResponseStream,
    SpeechRecognizer,
};

/// How often the transcript stream wakes up to check for end of audio
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opens one NATS connection per session
pub struct NatsRecognizerFactory {
    config: NatsConfig,
    handle: Handle,
}

impl NatsRecognizerFactory {
    pub fn new(config: NatsConfig, handle: Handle) -> Self {
        Self { config, handle }
    }
}

impl RecognizerFactory for NatsRecognizerFactory {
    fn create(&self) -> Result<Box<dyn SpeechRecognizer>> {
        let stream_id = uuid::Uuid::new_v4().to_string();
        let client = self
            .handle
            .block_on(NatsClient::connect(&self.config.url, stream_id))?;

        Ok(Box::new(NatsRecognizer {
            client,
            handle: self.handle.clone(),
            transcript_subject: self.config.transcript_subject.clone(),
            drain_timeout: Duration::from_millis(self.config.drain_timeout_ms),
        }))
    }
}

pub struct NatsRecognizer {
    client: NatsClient,
    handle: Handle,
    transcript_subject: String,
    drain_timeout: Duration,
}

impl SpeechRecognizer for NatsRecognizer {
    fn streaming_recognize(
        &mut self,
        config: &RecognitionConfig,
        requests: RequestStream,
    ) -> Result<ResponseStream> {
        // Subscribe before the first frame goes out so no transcript is missed.
        let subscriber = self
            .handle
            .block_on(self.client.subscribe_transcripts(&self.transcript_subject))?;

        let audio_done = Arc::new(AtomicBool::new(false));
        let (error_tx, error_rx) = mpsc::channel();

        let publisher = {
            let frames = NatsFramePublisher {
                client: self.client.clone(),
                handle: self.handle.clone(),
                config: config.clone(),
            };
            let audio_done = Arc::clone(&audio_done);
            std::thread::Builder::new()
                .name(format!("nats-audio-{}", self.client.stream_id()))
                .spawn(move || {
                    if let Err(e) = publish_requests(&frames, requests) {
                        let _ = error_tx.send(e);
                    }
                    audio_done.store(true, Ordering::SeqCst);
                })
                .context("Failed to spawn audio publisher thread")?
        };

        info!(
            "Streaming audio for {} over NATS",
            self.client.audio_subject()
        );

        let source = SubscriberSource {
            subscriber,
            handle: self.handle.clone(),
        };
        let mut stream = TranscriptStream::new(
            source,
            self.client.stream_id().to_string(),
            audio_done,
            error_rx,
            self.drain_timeout,
        );
        stream.publisher = Some(publisher);

        Ok(Box::new(stream))
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// Outbound half of a NATS recognition stream
trait FramePublisher {
    fn publish(&self, audio: &[u8], sequence: u32, is_final: bool) -> Result<()>;
}

struct NatsFramePublisher {
    client: NatsClient,
    handle: Handle,
    config: RecognitionConfig,
}

impl FramePublisher for NatsFramePublisher {
    fn publish(&self, audio: &[u8], sequence: u32, is_final: bool) -> Result<()> {
        self.handle.block_on(
            self.client
                .publish_audio_frame(audio, &self.config, sequence, is_final),
        )
    }
}

/// Pull every request and publish it, then mark the end of the stream
fn publish_requests(frames: &dyn FramePublisher, requests: RequestStream) -> Result<()> {
    let mut sequence: u32 = 0;

    for request in requests {
        frames.publish(&request.audio_content, sequence, false)?;
        sequence = sequence.wrapping_add(1);
    }

    // Final frame
    frames.publish(&[], sequence, true)?;
    debug!("Published final frame after {} audio frames", sequence);

    Ok(())
}

/// Result of one bounded wait on the transcript subscription
#[derive(Debug)]
enum Polled {
    Payload(Vec<u8>),
    /// Nothing arrived within the wait
    Idle,
    Closed,
}

/// Inbound half of a NATS recognition stream
trait TranscriptSource: Send {
    fn poll(&mut self, wait: Duration) -> Polled;
}

struct SubscriberSource {
    subscriber: async_nats::Subscriber,
    handle: Handle,
}

impl TranscriptSource for SubscriberSource {
    fn poll(&mut self, wait: Duration) -> Polled {
        match self
            .handle
            .block_on(tokio::time::timeout(wait, self.subscriber.next()))
        {
            Ok(Some(message)) => Polled::Payload(message.payload.to_vec()),
            Ok(None) => Polled::Closed,
            Err(_) => Polled::Idle,
        }
    }
}

/// Transcripts for one stream, ending once the audio is done and the STT
/// service has had its say
struct TranscriptStream<S> {
    source: S,
    stream_id: String,
    audio_done: Arc<AtomicBool>,
    errors: mpsc::Receiver<anyhow::Error>,
    drain_timeout: Duration,
    drain_started: Option<Instant>,
    publisher: Option<JoinHandle<()>>,
    finished: bool,
}

impl<S: TranscriptSource> TranscriptStream<S> {
    fn new(
        source: S,
        stream_id: String,
        audio_done: Arc<AtomicBool>,
        errors: mpsc::Receiver<anyhow::Error>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            source,
            stream_id,
            audio_done,
            errors,
            drain_timeout,
            drain_started: None,
            publisher: None,
            finished: false,
        }
    }
}

impl<S: TranscriptSource> Iterator for TranscriptStream<S> {
    type Item = Result<RecognitionResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if let Ok(e) = self.errors.try_recv() {
                self.finished = true;
                return Some(Err(e));
            }

            match self.source.poll(POLL_INTERVAL) {
                Polled::Payload(payload) => {
                    let transcript: TranscriptMessage = match serde_json::from_slice(&payload) {
                        Ok(transcript) => transcript,
                        Err(e) => {
                            warn!("Failed to parse transcript message: {}", e);
                            continue;
                        }
                    };

                    if transcript.session_id != self.stream_id {
                        continue;
                    }

                    let is_final = !transcript.partial;
                    if is_final && self.audio_done.load(Ordering::SeqCst) {
                        self.finished = true;
                    }

                    return Some(Ok(RecognitionResponse::single(
                        transcript.text,
                        transcript.confidence.unwrap_or(0.0),
                        is_final,
                    )));
                }
                Polled::Closed => {
                    self.finished = true;
                    return Some(Err(anyhow!("transcript subscription closed")));
                }
                Polled::Idle => {
                    if !self.audio_done.load(Ordering::SeqCst) {
                        continue;
                    }
                    let started = *self.drain_started.get_or_insert_with(Instant::now);
                    if started.elapsed() >= self.drain_timeout {
                        debug!(
                            "No transcripts for {:?} after end of audio; closing stream {}",
                            self.drain_timeout, self.stream_id
                        );
                        self.finished = true;
                    }
                }
            }
        }
    }
}

impl<S> Drop for TranscriptStream<S> {
    fn drop(&mut self) {
        // The publisher ends as soon as the request stream is closed, which
        // the session guarantees on every exit path.
        if let Some(publisher) = self.publisher.take() {
            if publisher.join().is_err() {
                warn!("Audio publisher for stream {} panicked", self.stream_id);
            }
        }
    }
}
