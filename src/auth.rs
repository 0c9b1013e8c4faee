//! Auth gate for the speech WebSocket
//!
//! The first frame on a new connection must be `{"type":"auth","token":...}`.
//! The token is checked against a [`TokenVerifier`]; anything else ends the
//! connection before a session exists.

use anyhow::Result;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::AuthFailure;
use crate::protocol::{ClientMessage, InboundFrame};

/// Identity established by a successful auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub uid: String,
}

/// External identity provider
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `Ok(None)` for a token that is invalid or expired; `Err` only when
    /// the verifier itself could not answer.
    async fn verify(&self, token: &str) -> Result<Option<VerifiedUser>>;
}

/// Verifier backed by a fixed token → user id table from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        if tokens.is_empty() {
            warn!("No auth tokens configured; every connection will be rejected");
        }
        Self { tokens }
    }
}

#[async_trait::async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Option<VerifiedUser>> {
        Ok(self.tokens.get(token).map(|uid| VerifiedUser { uid: uid.clone() }))
    }
}

/// Wait for the auth frame and verify it. One attempt per connection.
pub async fn authenticate<S>(
    inbound: &mut S,
    verifier: &dyn TokenVerifier,
    window: Duration,
) -> Result<VerifiedUser, AuthFailure>
where
    S: Stream<Item = InboundFrame> + Unpin,
{
    let frame = match tokio::time::timeout(window, inbound.next()).await {
        Err(_) => return Err(AuthFailure::Timeout(window)),
        Ok(None) | Ok(Some(InboundFrame::Close)) => return Err(AuthFailure::Disconnected),
        Ok(Some(frame)) => frame,
    };

    let text = match frame {
        InboundFrame::Text(text) => text,
        _ => return Err(AuthFailure::Required),
    };

    let token = match ClientMessage::parse(&text) {
        Ok(ClientMessage::Auth { token: Some(token) }) if !token.is_empty() => token,
        _ => return Err(AuthFailure::Required),
    };

    match verifier.verify(&token).await {
        Ok(Some(user)) => {
            info!("Speech connection authenticated for user {}", user.uid);
            Ok(user)
        }
        Ok(None) => Err(AuthFailure::InvalidToken),
        Err(e) => Err(AuthFailure::Verifier(e)),
    }
}
