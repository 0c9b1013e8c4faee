//! Test doubles shared by the integration tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use knowva_speech::protocol::{EventSink, ServerMessage};
use knowva_speech::recognition::{
    RecognitionConfig, RecognitionResponse, RecognizerFactory, RequestStream, ResponseStream,
    SpeechRecognizer,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the scripted recognizer behaves
#[derive(Debug, Clone, Copy)]
pub struct Script {
    /// Emit an interim result for every request
    pub interim: bool,
    /// Fail with a backend error on request N+1
    pub fail_after: Option<usize>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            interim: true,
            fail_after: None,
        }
    }
}

/// What the recognizer saw
#[derive(Debug, Default)]
pub struct RecognizerLog {
    pub requests: Vec<Vec<u8>>,
    /// Times the request stream reported its end
    pub ends: usize,
}

/// Factory for recognizers that echo UTF-8 audio back as transcripts
#[derive(Default)]
pub struct ScriptedFactory {
    pub script: Script,
    pub created: AtomicUsize,
    pub log: Arc<Mutex<RecognizerLog>>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            ..Default::default()
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.log.lock().unwrap().requests.clone()
    }

    pub fn ends(&self) -> usize {
        self.log.lock().unwrap().ends
    }
}

impl RecognizerFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn SpeechRecognizer>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedRecognizer {
            script: self.script,
            log: Arc::clone(&self.log),
        }))
    }
}

/// Factory whose backend is unreachable
pub struct UnavailableFactory;

impl RecognizerFactory for UnavailableFactory {
    fn create(&self) -> Result<Box<dyn SpeechRecognizer>> {
        Err(anyhow!("backend unreachable"))
    }
}

/// Factory whose recognizer answers only after the audio is over, and
/// slowly: it drains every request, waits `delay`, then yields one final
pub struct SlowFinalFactory {
    pub delay: Duration,
}

impl RecognizerFactory for SlowFinalFactory {
    fn create(&self) -> Result<Box<dyn SpeechRecognizer>> {
        Ok(Box::new(SlowFinalRecognizer { delay: self.delay }))
    }
}

struct SlowFinalRecognizer {
    delay: Duration,
}

impl SpeechRecognizer for SlowFinalRecognizer {
    fn streaming_recognize(
        &mut self,
        _config: &RecognitionConfig,
        requests: RequestStream,
    ) -> Result<ResponseStream> {
        let delay = self.delay;
        let mut requests = Some(requests);
        Ok(Box::new(std::iter::from_fn(
            move || -> Option<Result<RecognitionResponse>> {
                let requests = requests.take()?;
                let heard: Vec<String> = requests
                    .map(|r| String::from_utf8_lossy(&r.audio_content).into_owned())
                    .collect();
                std::thread::sleep(delay);
                Some(Ok(RecognitionResponse::single(heard.join(" "), 0.9, true)))
            },
        )))
    }

    fn name(&self) -> &str {
        "slow-final"
    }
}

/// Factory whose recognizer reads nothing until `release` is set, so a
/// bounded queue fills up behind it
pub struct StalledFactory {
    pub release: Arc<AtomicBool>,
}

impl StalledFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            release: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn release(&self) {
        self.release.store(true, Ordering::SeqCst);
    }
}

impl RecognizerFactory for StalledFactory {
    fn create(&self) -> Result<Box<dyn SpeechRecognizer>> {
        Ok(Box::new(StalledRecognizer {
            release: Arc::clone(&self.release),
        }))
    }
}

struct StalledRecognizer {
    release: Arc<AtomicBool>,
}

impl SpeechRecognizer for StalledRecognizer {
    fn streaming_recognize(
        &mut self,
        _config: &RecognitionConfig,
        requests: RequestStream,
    ) -> Result<ResponseStream> {
        let release = Arc::clone(&self.release);
        let mut requests = Some(requests);
        Ok(Box::new(std::iter::from_fn(
            move || -> Option<Result<RecognitionResponse>> {
                while !release.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(10));
                }
                requests.take()?.for_each(drop);
                None
            },
        )))
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// Factory whose recognizer panics on the first request
pub struct PanickingFactory;

impl RecognizerFactory for PanickingFactory {
    fn create(&self) -> Result<Box<dyn SpeechRecognizer>> {
        Ok(Box::new(PanickingRecognizer))
    }
}

struct PanickingRecognizer;

impl SpeechRecognizer for PanickingRecognizer {
    fn streaming_recognize(
        &mut self,
        _config: &RecognitionConfig,
        mut requests: RequestStream,
    ) -> Result<ResponseStream> {
        Ok(Box::new(std::iter::from_fn(
            move || -> Option<Result<RecognitionResponse>> {
                requests.next()?;
                panic!("decoder blew up");
            },
        )))
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

struct ScriptedRecognizer {
    script: Script,
    log: Arc<Mutex<RecognizerLog>>,
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn streaming_recognize(
        &mut self,
        _config: &RecognitionConfig,
        requests: RequestStream,
    ) -> Result<ResponseStream> {
        Ok(Box::new(ScriptedResponses {
            requests,
            script: self.script,
            log: Arc::clone(&self.log),
            heard: Vec::new(),
            done: false,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedResponses {
    requests: RequestStream,
    script: Script,
    log: Arc<Mutex<RecognizerLog>>,
    heard: Vec<String>,
    done: bool,
}

impl Iterator for ScriptedResponses {
    type Item = Result<RecognitionResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            match self.requests.next() {
                Some(request) => {
                    self.log
                        .lock()
                        .unwrap()
                        .requests
                        .push(request.audio_content.clone());
                    let text = String::from_utf8_lossy(&request.audio_content).into_owned();
                    self.heard.push(text.clone());

                    if let Some(limit) = self.script.fail_after {
                        if self.heard.len() > limit {
                            self.done = true;
                            return Some(Err(anyhow!("backend exploded")));
                        }
                    }

                    if self.script.interim {
                        return Some(Ok(RecognitionResponse::single(text, 0.5, false)));
                    }
                }
                None => {
                    self.log.lock().unwrap().ends += 1;
                    self.done = true;
                    if self.heard.is_empty() {
                        return None;
                    }
                    return Some(Ok(RecognitionResponse::single(
                        self.heard.join(" "),
                        0.9,
                        true,
                    )));
                }
            }
        }
    }
}

/// Sink that records everything sent to the client
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<ServerMessage>>,
    closed: AtomicBool,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sink for a client that is already gone
    pub fn closed() -> Arc<Self> {
        let sink = Self::default();
        sink.closed.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn messages(&self) -> Vec<ServerMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ServerMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.error_code().is_some())
            .collect()
    }

    pub fn transcripts(&self) -> Vec<(String, bool, Option<f32>)> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Transcript {
                    transcript,
                    is_final,
                    confidence,
                } => Some((transcript, is_final, confidence)),
                _ => None,
            })
            .collect()
    }

    /// Poll until `predicate` holds or the deadline passes
    pub async fn wait_for<F>(&self, deadline: Duration, predicate: F) -> bool
    where
        F: Fn(&[ServerMessage]) -> bool,
    {
        let started = std::time::Instant::now();
        loop {
            if predicate(&self.messages()) {
                return true;
            }
            if started.elapsed() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait::async_trait]
impl EventSink for CollectingSink {
    async fn send(&self, message: ServerMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(anyhow!("connection closed"));
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// Sink that panics when handed a transcript and records everything else
#[derive(Default)]
pub struct TranscriptPanicSink {
    pub inner: CollectingSink,
}

impl TranscriptPanicSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl EventSink for TranscriptPanicSink {
    async fn send(&self, message: ServerMessage) -> Result<()> {
        if matches!(message, ServerMessage::Transcript { .. }) {
            panic!("transcript rendering blew up");
        }
        self.inner.send(message).await
    }
}
