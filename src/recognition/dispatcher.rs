// Response dispatcher: recognizer output → transcript events on the connection

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::recognizer::{RecognitionResponse, RecognitionResult};
use crate::errors::Failure;
use crate::protocol::{EventSink, ServerMessage};

/// One piece of recognized text as sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    /// Populated only for final results
    pub confidence: Option<f32>,
}

impl TranscriptEvent {
    /// Build an event from the top alternative; `None` if there is none
    pub fn from_result(result: &RecognitionResult) -> Option<Self> {
        let top = result.alternatives.first()?;
        Some(Self {
            text: top.transcript.clone(),
            is_final: result.is_final,
            confidence: result.is_final.then_some(top.confidence),
        })
    }
}

/// Events carried by one response, in result order
pub fn events_from(response: &RecognitionResponse) -> Vec<TranscriptEvent> {
    response
        .results
        .iter()
        .filter_map(TranscriptEvent::from_result)
        .collect()
}

/// Forward responses to the client until the recognizer closes its stream.
///
/// Each event is sent as soon as its response arrives. A recognizer error
/// ends dispatch with `Failure::Backend`; a vanished transport ends it with
/// `Failure::TransportClosed`.
pub async fn dispatch(
    mut responses: mpsc::UnboundedReceiver<Result<RecognitionResponse>>,
    sink: &dyn EventSink,
    sent: &AtomicUsize,
) -> Result<(), Failure> {
    while let Some(response) = responses.recv().await {
        let response = response.map_err(Failure::Backend)?;

        for event in events_from(&response) {
            if event.is_final {
                info!("Final transcript: {}", event.text);
            } else {
                debug!("Interim transcript: {}", event.text);
            }

            sink.send(ServerMessage::from(event))
                .await
                .map_err(|_| Failure::TransportClosed)?;
            sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    debug!("Recognizer closed its response stream");
    Ok(())
}
