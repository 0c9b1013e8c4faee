use super::config::{SessionConfig, StartPolicy};
use super::state::{Lifecycle, LifecycleState};
use super::stats::SessionStats;
use crate::audio::{AudioChunk, ChunkQueue, PushOutcome};
use crate::errors::{translate, Failure};
use crate::protocol::{notify, EventSink, ServerMessage};
use crate::recognition::{
    dispatch, QueueRequests, RecognitionConfig, RecognitionResponse, RecognizerFactory,
};
use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One connection's transcription lifecycle
///
/// Audio pushed by the connection loop flows through the chunk queue into a
/// recognizer running on a blocking thread; recognizer responses come back
/// through a channel and are forwarded to the client by an async worker task
/// that also enforces the session deadline.
pub struct TranscriptionSession {
    id: String,

    user_id: String,

    config: SessionConfig,

    /// Builds this session's private recognizer
    recognizers: Arc<dyn RecognizerFactory>,

    /// Outbound half of the connection
    sink: Arc<dyn EventSink>,

    queue: Arc<ChunkQueue>,

    lifecycle: Arc<Lifecycle>,

    /// Fired on disconnect so the worker exits without talking to the client
    cancel: CancellationToken,

    /// Handle for the worker task (dispatch + watchdog)
    worker: Mutex<Option<JoinHandle<()>>>,

    started_at: chrono::DateTime<Utc>,

    chunks_pushed: AtomicUsize,

    requests_forwarded: Arc<AtomicUsize>,

    transcripts_sent: Arc<AtomicUsize>,
}

impl TranscriptionSession {
    pub fn new(
        user_id: impl Into<String>,
        config: SessionConfig,
        recognizers: Arc<dyn RecognizerFactory>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let user_id = user_id.into();
        info!("Creating transcription session {} for user {}", id, user_id);

        Self {
            id,
            user_id,
            queue: Arc::new(ChunkQueue::new(config.queue)),
            config,
            recognizers,
            sink,
            lifecycle: Arc::new(Lifecycle::new()),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
            started_at: Utc::now(),
            chunks_pushed: AtomicUsize::new(0),
            requests_forwarded: Arc::new(AtomicUsize::new(0)),
            transcripts_sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.current()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn the recognition worker.
    ///
    /// Returns false without doing anything unless the session is Idle, so
    /// concurrent callers can never produce a second worker.
    pub async fn start(&self) -> bool {
        // Hold the slot across the transition so stop() cannot observe
        // Running without also finding the handle.
        let mut slot = self.worker.lock().await;

        if !self.lifecycle.try_start() {
            debug!(
                "Session {} not idle ({:?}); ignoring start",
                self.id,
                self.lifecycle.current()
            );
            return false;
        }

        info!("Starting recognition for session {}", self.id);

        let worker = Worker {
            session_id: self.id.clone(),
            config: self.config.clone(),
            recognizers: Arc::clone(&self.recognizers),
            sink: Arc::clone(&self.sink),
            queue: Arc::clone(&self.queue),
            lifecycle: Arc::clone(&self.lifecycle),
            cancel: self.cancel.clone(),
            requests_forwarded: Arc::clone(&self.requests_forwarded),
            transcripts_sent: Arc::clone(&self.transcripts_sent),
        };
        *slot = Some(tokio::spawn(worker.supervised()));

        true
    }

    /// Queue one chunk of audio from the client
    pub async fn push_audio(&self, data: Vec<u8>) -> PushOutcome {
        if matches!(
            self.lifecycle.current(),
            LifecycleState::Stopping | LifecycleState::Stopped
        ) {
            debug!("Session {} is stopping; dropping {} bytes", self.id, data.len());
            return PushOutcome::Rejected;
        }

        let outcome = self.queue.push(AudioChunk::new(data)).await;
        match outcome {
            PushOutcome::Accepted => {
                self.chunks_pushed.fetch_add(1, Ordering::SeqCst);
            }
            PushOutcome::DroppedOldest => {
                self.chunks_pushed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    "Session {} audio queue full; dropped oldest chunk ({} total)",
                    self.id,
                    self.queue.dropped()
                );
            }
            PushOutcome::Rejected => return outcome,
        }

        if self.config.start_policy == StartPolicy::OnFirstAudio
            && self.lifecycle.current() == LifecycleState::Idle
        {
            self.start().await;
        }

        outcome
    }

    /// Stop recognition and wait for the worker to drain.
    ///
    /// Idempotent: only the first call (or the first of stop/cancel) does any
    /// work and returns true.
    pub async fn stop(&self) -> bool {
        self.shutdown(false).await
    }

    /// Stop after the client went away: the worker exits without sending
    /// anything.
    pub async fn cancel(&self) -> bool {
        self.cancel.cancel();
        self.shutdown(true).await
    }

    async fn shutdown(&self, cancelled: bool) -> bool {
        let previous = self.lifecycle.begin_stop();

        // Every exit path delivers the sentinel; close() ignores repeats.
        self.queue.close();

        match previous {
            LifecycleState::Idle => {
                info!(
                    "Session {} stopped before recognition started; no recognizer opened",
                    self.id
                );
                true
            }
            LifecycleState::Running => {
                info!(
                    "{} session {}",
                    if cancelled { "Cancelling" } else { "Stopping" },
                    self.id
                );
                self.join_worker().await;
                self.lifecycle.finish();
                info!("Session {} stopped", self.id);
                true
            }
            LifecycleState::Stopping | LifecycleState::Stopped => {
                // A finished worker's handle may still be parked here.
                self.join_worker().await;
                debug!("Session {} already {:?}", self.id, previous);
                false
            }
        }
    }

    async fn join_worker(&self) {
        let Some(mut handle) = self.worker.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(self.config.stop_grace, &mut handle).await {
            Ok(Ok(())) => {}
            // Panics are reported by the supervisor inside the task.
            Ok(Err(e)) => debug!("Worker for session {} ended abnormally: {}", self.id, e),
            Err(_) => {
                warn!(
                    "Worker for session {} did not finish within {:?}; aborting",
                    self.id, self.config.stop_grace
                );
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.id.clone(),
            user_id: self.user_id.clone(),
            state: self.lifecycle.current(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_pushed: self.chunks_pushed.load(Ordering::SeqCst),
            chunks_dropped: self.queue.dropped(),
            requests_forwarded: self.requests_forwarded.load(Ordering::SeqCst),
            transcripts_sent: self.transcripts_sent.load(Ordering::SeqCst),
        }
    }
}

/// Everything the worker task needs, detached from the session borrow
struct Worker {
    session_id: String,
    config: SessionConfig,
    recognizers: Arc<dyn RecognizerFactory>,
    sink: Arc<dyn EventSink>,
    queue: Arc<ChunkQueue>,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
    requests_forwarded: Arc<AtomicUsize>,
    transcripts_sent: Arc<AtomicUsize>,
}

impl Worker {
    /// Run the worker and report a panic in it as soon as it happens,
    /// instead of whenever the session is next stopped.
    async fn supervised(self) {
        let session_id = self.session_id.clone();
        let sink = Arc::clone(&self.sink);
        let queue = Arc::clone(&self.queue);
        let lifecycle = Arc::clone(&self.lifecycle);
        let cancel = self.cancel.clone();

        let Err(payload) = AssertUnwindSafe(self.run()).catch_unwind().await else {
            return;
        };

        let reason = panic_message(payload.as_ref());
        error!("Worker for session {} panicked: {}", session_id, reason);

        queue.close();
        if !cancel.is_cancelled() {
            if let Some(err) = translate(&Failure::Pipeline(reason)) {
                notify(sink.as_ref(), err.into()).await;
            }
        }
        lifecycle.finish();
    }

    async fn run(self) {
        let (tx, rx) = mpsc::unbounded_channel();

        let recognizer_thread = {
            let recognizers = Arc::clone(&self.recognizers);
            let config = self.config.recognition.clone();
            let queue = Arc::clone(&self.queue);
            let forwarded = Arc::clone(&self.requests_forwarded);
            let session_id = self.session_id.clone();
            tokio::task::spawn_blocking(move || {
                recognize_blocking(&session_id, recognizers, config, queue, forwarded, tx)
            })
        };

        let deadline = self.config.max_duration;
        let mut outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Failure::Cancelled),
            result = tokio::time::timeout(
                deadline,
                dispatch(rx, self.sink.as_ref(), &self.transcripts_sent),
            ) => match result {
                Ok(result) => result,
                Err(_) => Err(Failure::Timeout(deadline)),
            },
        };

        // The recognizer must see end-of-stream whatever happened above.
        self.queue.close();

        // A clean end of the response stream means the recognizer thread is
        // done; make sure it did not get there by panicking.
        let recognizer_thread = if outcome.is_ok() {
            match recognizer_thread.await {
                Ok(()) => None,
                Err(e) => {
                    outcome = Err(Failure::Pipeline(e.to_string()));
                    None
                }
            }
        } else {
            Some(recognizer_thread)
        };

        self.report(outcome).await;
        self.lifecycle.finish();

        if let Some(thread) = recognizer_thread {
            if tokio::time::timeout(self.config.stop_grace, thread)
                .await
                .is_err()
            {
                // spawn_blocking cannot be aborted; the thread ends as soon as
                // the recognizer returns from its current call.
                warn!(
                    "Recognizer for session {} still busy after {:?}",
                    self.session_id, self.config.stop_grace
                );
            }
        }

        debug!("Worker for session {} exited", self.session_id);
    }

    async fn report(&self, outcome: Result<(), Failure>) {
        let failure = match outcome {
            Ok(()) => {
                info!("Recognition finished for session {}", self.session_id);
                return;
            }
            Err(failure) => failure,
        };

        match &failure {
            Failure::Cancelled | Failure::TransportClosed => {
                info!("Session {}: {}", self.session_id, failure);
                return;
            }
            Failure::Timeout(_) if !self.lifecycle.is_running() => {
                debug!(
                    "Session {} hit its deadline while already stopping",
                    self.session_id
                );
                return;
            }
            Failure::Timeout(_) => info!("Session {}: {}", self.session_id, failure),
            _ => error!("Session {}: {}", self.session_id, failure),
        }

        if let Some(err) = translate(&failure) {
            let message = ServerMessage::from(err);
            if !notify(self.sink.as_ref(), message).await {
                debug!(
                    "Session {}: client gone before error could be delivered",
                    self.session_id
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Body of the blocking recognizer thread
fn recognize_blocking(
    session_id: &str,
    recognizers: Arc<dyn RecognizerFactory>,
    config: RecognitionConfig,
    queue: Arc<ChunkQueue>,
    forwarded: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<Result<RecognitionResponse>>,
) {
    let mut recognizer = match recognizers.create() {
        Ok(recognizer) => recognizer,
        Err(e) => {
            let _ = tx.send(Err(e.context("failed to create recognizer")));
            return;
        }
    };

    info!(
        "Opening {} recognition stream for session {} ({}, {} Hz)",
        recognizer.name(),
        session_id,
        config.language_code,
        config.sample_rate_hertz
    );

    let requests = Box::new(QueueRequests::with_counter(queue, forwarded));
    let responses = match recognizer.streaming_recognize(&config, requests) {
        Ok(responses) => responses,
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    };

    for response in responses {
        let failed = response.is_err();
        if tx.send(response).is_err() {
            debug!("Dispatcher for session {} is gone; dropping responses", session_id);
            break;
        }
        if failed {
            break;
        }
    }

    debug!("Recognition stream for session {} closed", session_id);
}
