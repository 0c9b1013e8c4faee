use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use tracing::{debug, info};

use super::messages::AudioFrameMessage;
use crate::recognition::RecognitionConfig;

/// NATS connection scoped to one recognition stream
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    stream_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, stream_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, stream_id })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Subject audio for this stream is published on
    pub fn audio_subject(&self) -> String {
        format!("audio.frame.speech-{}", self.stream_id)
    }

    /// Publish audio frame to NATS
    pub async fn publish_audio_frame(
        &self,
        audio: &[u8],
        config: &RecognitionConfig,
        sequence: u32,
        is_final: bool,
    ) -> Result<()> {
        let subject = self.audio_subject();

        let message = AudioFrameMessage {
            session_id: self.stream_id.clone(),
            sequence,
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            encoding: config.encoding.as_str().to_string(),
            sample_rate: config.sample_rate_hertz,
            language_code: config.language_code.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (seq={}, bytes={}, final={})",
            subject,
            sequence,
            audio.len(),
            is_final
        );

        Ok(())
    }

    /// Subscribe to transcript messages
    pub async fn subscribe_transcripts(&self, subject: &str) -> Result<async_nats::Subscriber> {
        // The STT service publishes partial and final results for every
        // stream on one subject tree; we filter by session_id in the payload.
        info!("Subscribing to transcripts on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .context("Failed to subscribe to transcripts")?;

        Ok(subscriber)
    }
}
