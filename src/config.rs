use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::audio::{OverflowPolicy, QueueConfig};
use crate::nats::POLL_INTERVAL;
use crate::recognition::RecognitionConfig;
use crate::session::{SessionConfig, StartPolicy};

/// Prefix for environment overrides, e.g. `KNOWVA__SERVICE__HTTP__PORT=9000`
pub const ENV_PREFIX: &str = "KNOWVA";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub speech: RecognitionConfig,
    pub session: SessionSettings,
    pub nats: NatsConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "knowva-speech".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Watchdog deadline (seconds)
    pub max_duration_secs: u64,
    /// Window for the first (auth) frame (seconds)
    pub auth_timeout_secs: u64,
    /// Grace period for the worker on stop/disconnect (milliseconds)
    pub stop_grace_ms: u64,
    pub start_policy: StartPolicy,
    /// Pending chunk limit; unset = unbounded
    pub queue_capacity: Option<usize>,
    pub overflow_policy: OverflowPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_duration_secs: 270,
            auth_timeout_secs: 10,
            stop_grace_ms: 5000,
            start_policy: StartPolicy::OnAuth,
            queue_capacity: None,
            overflow_policy: OverflowPolicy::Block,
        }
    }
}

impl SessionSettings {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    /// Subject the STT service publishes transcripts on
    pub transcript_subject: String,
    /// How long to wait for trailing transcripts after the last audio frame
    pub drain_timeout_ms: u64,
}

impl NatsConfig {
    /// Longest a recognition stream may stay open after the last audio
    /// frame: the drain window plus the poll already in flight and one more
    /// to hand the trailing final over.
    pub fn close_budget(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms) + POLL_INTERVAL * 2
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            transcript_subject: "stt.text.>".to_string(),
            drain_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted tokens. Kept as a list because config keys are case-folded.
    pub users: Vec<AuthUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub token: String,
    pub uid: String,
}

impl AuthConfig {
    /// Token → user id table
    pub fn token_table(&self) -> HashMap<String, String> {
        self.users
            .iter()
            .map(|user| (user.token.clone(), user.uid.clone()))
            .collect()
    }
}

impl Config {
    /// Load from a config file (extension optional) layered with
    /// `KNOWVA__`-prefixed environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Parse TOML text, without environment overrides
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Per-session settings derived from the service configuration
    ///
    /// The stop grace never undercuts the backend's close budget, otherwise
    /// `stop()` would abort the worker before trailing finals arrive.
    pub fn session_config(&self) -> SessionConfig {
        let configured = Duration::from_millis(self.session.stop_grace_ms);
        let budget = self.nats.close_budget();
        if configured < budget {
            warn!(
                "stop_grace_ms ({:?}) is shorter than the NATS close budget ({:?}); using the budget",
                configured, budget
            );
        }

        SessionConfig {
            recognition: self.speech.clone(),
            max_duration: Duration::from_secs(self.session.max_duration_secs),
            stop_grace: configured.max(budget),
            queue: QueueConfig {
                capacity: self.session.queue_capacity,
                overflow: self.session.overflow_policy,
            },
            start_policy: self.session.start_policy,
        }
    }
}
