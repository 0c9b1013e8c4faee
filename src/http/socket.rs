//! Speech WebSocket endpoint
//!
//! One connection drives one [`TranscriptionSession`]: auth frame first, then
//! binary audio frames and JSON control frames until the client goes away.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, Stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::state::AppState;
use crate::audio::PushOutcome;
use crate::auth::authenticate;
use crate::errors::{translate, Failure};
use crate::protocol::{notify, ChannelSink, ClientMessage, EventSink, InboundFrame, ServerMessage};
use crate::session::{SessionStats, StartPolicy, TranscriptionSession};

/// Outbound messages buffered per connection before senders wait
const OUTBOUND_BUFFER: usize = 64;

/// GET /ws/speech
pub async fn ws_speech(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, ws_receiver) = socket.split();
    let (sink, mut outbound) = ChannelSink::new(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let inbound = ws_receiver.filter_map(|message| async move {
        match message {
            Ok(Message::Text(text)) => Some(InboundFrame::Text(text)),
            Ok(Message::Binary(data)) => Some(InboundFrame::Binary(data)),
            Ok(Message::Close(_)) => Some(InboundFrame::Close),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(e) => {
                debug!("WebSocket read failed: {}", e);
                Some(InboundFrame::Close)
            }
        }
    });

    run_connection(Box::pin(inbound), Arc::new(sink), state).await;

    // The writer finishes once every handle on the sink is gone.
    if let Err(e) = writer.await {
        warn!("WebSocket writer task failed: {}", e);
    }
}

/// Serve one client connection over any frame transport.
///
/// Returns the final stats of the session, or `None` when the client never
/// got past auth.
pub async fn run_connection<S>(
    mut inbound: S,
    sink: Arc<dyn EventSink>,
    state: AppState,
) -> Option<SessionStats>
where
    S: Stream<Item = InboundFrame> + Unpin,
{
    let user = match authenticate(
        &mut inbound,
        state.verifier.as_ref(),
        state.config.session.auth_timeout(),
    )
    .await
    {
        Ok(user) => user,
        Err(failure) => {
            warn!("Speech connection rejected: {}", failure);
            if let Some(err) = translate(&Failure::Auth(failure)) {
                notify(sink.as_ref(), err.into()).await;
            }
            return None;
        }
    };

    let session = Arc::new(TranscriptionSession::new(
        user.uid.clone(),
        state.config.session_config(),
        Arc::clone(&state.recognizers),
        Arc::clone(&sink),
    ));
    state.register(Arc::clone(&session)).await;

    notify(
        sink.as_ref(),
        ServerMessage::AuthSuccess {
            user_id: user.uid.clone(),
        },
    )
    .await;

    if session.config().start_policy == StartPolicy::OnAuth {
        session.start().await;
    }

    let backlog_limit = session.config().queue.capacity.unwrap_or(1).max(1);
    let mut connection = Connection {
        inbound,
        session: session.as_ref(),
        sink: sink.as_ref(),
        backlog: VecDeque::new(),
        backlog_limit,
        stop_deadline: None,
        stops_pending: 0,
    };
    connection.run().await;

    info!("Client for session {} disconnected", session.id());
    session.cancel().await;
    state.unregister(session.id()).await;

    Some(session.stats())
}

enum Flow {
    Continue,
    Hangup,
}

/// What woke a connection whose audio push is parked on a full queue
enum Parked {
    Pushed(PushOutcome),
    Frame(Option<InboundFrame>),
    StopDue,
}

/// Frame loop of an authenticated connection.
///
/// A push parked on a full queue does not stall the loop: frames keep being
/// read, so `Close` and `stop` are seen while the recognizer is behind.
/// Audio read meanwhile waits in a backlog no larger than the queue; beyond
/// that it is dropped. A `stop` read while parked lets the parked audio
/// drain for up to `stop_grace` before stopping anyway.
struct Connection<'a, S> {
    inbound: S,
    session: &'a TranscriptionSession,
    sink: &'a dyn EventSink,
    backlog: VecDeque<Vec<u8>>,
    backlog_limit: usize,
    stop_deadline: Option<Instant>,
    stops_pending: usize,
}

impl<'a, S> Connection<'a, S>
where
    S: Stream<Item = InboundFrame> + Unpin,
{
    async fn run(&mut self) {
        loop {
            if self.backlog.is_empty() && self.stop_deadline.is_some() {
                self.stop().await;
            }

            let frame = match self.backlog.pop_front() {
                Some(data) => InboundFrame::Binary(data),
                None => match self.inbound.next().await {
                    Some(frame) => frame,
                    None => return,
                },
            };

            let flow = match frame {
                InboundFrame::Close => Flow::Hangup,
                InboundFrame::Binary(data) => self.feed(data).await,
                InboundFrame::Text(text) => {
                    self.control(&text, false).await;
                    Flow::Continue
                }
            };

            if let Flow::Hangup = flow {
                return;
            }
        }
    }

    /// Push one chunk, still serving inbound frames while the push is parked
    async fn feed(&mut self, data: Vec<u8>) -> Flow {
        let session = self.session;
        let push = session.push_audio(data);
        tokio::pin!(push);

        loop {
            let stop_deadline = self.stop_deadline;
            let event = tokio::select! {
                biased;
                outcome = &mut push => Parked::Pushed(outcome),
                frame = self.inbound.next() => Parked::Frame(frame),
                _ = until(stop_deadline) => Parked::StopDue,
            };

            match event {
                Parked::Pushed(outcome) => {
                    if outcome == PushOutcome::Rejected {
                        debug!("Session {} no longer accepts audio", session.id());
                    }
                    return Flow::Continue;
                }
                Parked::Frame(None) | Parked::Frame(Some(InboundFrame::Close)) => {
                    return Flow::Hangup;
                }
                Parked::Frame(Some(InboundFrame::Binary(more))) => {
                    if self.stop_deadline.is_some() {
                        debug!("Session {} is stopping; dropping {} bytes", session.id(), more.len());
                    } else if self.backlog.len() < self.backlog_limit {
                        self.backlog.push_back(more);
                    } else {
                        warn!(
                            "Session {} recognizer is behind; dropping {} bytes of audio",
                            session.id(),
                            more.len()
                        );
                    }
                }
                Parked::Frame(Some(InboundFrame::Text(text))) => self.control(&text, true).await,
                Parked::StopDue => {
                    warn!(
                        "Session {} audio still parked after {:?}; stopping without it",
                        session.id(),
                        session.config().stop_grace
                    );
                    self.backlog.clear();
                    return Flow::Continue;
                }
            }
        }
    }

    async fn control(&mut self, text: &str, parked: bool) {
        match ClientMessage::parse(text) {
            Ok(ClientMessage::Stop) if parked => {
                self.stops_pending += 1;
                self.stop_deadline
                    .get_or_insert_with(|| Instant::now() + self.session.config().stop_grace);
            }
            Ok(ClientMessage::Stop) => {
                self.stops_pending += 1;
                self.stop().await;
            }
            Ok(ClientMessage::Auth { .. }) => {
                debug!("Ignoring repeated auth on session {}", self.session.id());
            }
            Err(e) => {
                warn!("Invalid message on session {}: {}", self.session.id(), e);
                if let Some(err) = translate(&Failure::MalformedFrame(e.to_string())) {
                    notify(self.sink, err.into()).await;
                }
            }
        }
    }

    /// Stop the session and answer every stop frame received so far
    async fn stop(&mut self) {
        self.stop_deadline = None;
        self.session.stop().await;
        for _ in 0..std::mem::take(&mut self.stops_pending) {
            notify(self.sink, ServerMessage::Stopped).await;
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
