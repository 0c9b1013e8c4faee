use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::recognition::RecognizerFactory;
use crate::session::TranscriptionSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Validates the token in each connection's auth frame
    pub verifier: Arc<dyn TokenVerifier>,

    /// Builds one recognizer per session
    pub recognizers: Arc<dyn RecognizerFactory>,

    /// Live transcription sessions (session_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<TranscriptionSession>>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        verifier: Arc<dyn TokenVerifier>,
        recognizers: Arc<dyn RecognizerFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            verifier,
            recognizers,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, session: Arc<TranscriptionSession>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id().to_string(), session);
    }

    pub async fn unregister(&self, session_id: &str) -> Option<Arc<TranscriptionSession>> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
