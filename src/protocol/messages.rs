use serde::{Deserialize, Serialize};

use crate::errors::{ErrorCode, SessionError};
use crate::recognition::TranscriptEvent;

/// Frame read from the client connection, independent of the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// JSON control frames sent by the client
///
/// Audio travels separately as binary frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        #[serde(default)]
        token: Option<String>,
    },
    Stop,
}

impl ClientMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// JSON frames sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthSuccess {
        user_id: String,
    },
    Transcript {
        transcript: String,
        is_final: bool,
        /// Only present on final results
        confidence: Option<f32>,
    },
    Stopped,
    Error {
        code: ErrorCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ServerMessage::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<TranscriptEvent> for ServerMessage {
    fn from(event: TranscriptEvent) -> Self {
        ServerMessage::Transcript {
            transcript: event.text,
            is_final: event.is_final,
            confidence: event.confidence,
        }
    }
}

impl From<SessionError> for ServerMessage {
    fn from(err: SessionError) -> Self {
        ServerMessage::Error {
            code: err.code,
            message: err.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_frame() {
        let msg = ClientMessage::parse(r#"{"type":"auth","token":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Auth {
                token: Some("abc".to_string())
            }
        );
    }

    #[test]
    fn test_parse_auth_frame_without_token() {
        let msg = ClientMessage::parse(r#"{"type":"auth"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Auth { token: None });
    }

    #[test]
    fn test_parse_stop_frame() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"stop"}"#).unwrap(),
            ClientMessage::Stop
        );
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(ClientMessage::parse(r#"{"type":"pause"}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn test_interim_transcript_serializes_null_confidence() {
        let msg = ServerMessage::from(TranscriptEvent {
            text: "こんにちは".to_string(),
            is_final: false,
            confidence: None,
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "transcript");
        assert_eq!(value["transcript"], "こんにちは");
        assert_eq!(value["is_final"], false);
        assert!(value["confidence"].is_null());
    }

    #[test]
    fn test_auth_error_has_no_message_field() {
        let msg = ServerMessage::from(SessionError::bare(ErrorCode::AuthTimeout));
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"error","code":"auth_timeout"}"#
        );
    }

    #[test]
    fn test_auth_success_and_stopped_shapes() {
        let ok = ServerMessage::AuthSuccess {
            user_id: "uid-1".to_string(),
        };
        assert_eq!(
            ok.to_json().unwrap(),
            r#"{"type":"auth_success","user_id":"uid-1"}"#
        );
        assert_eq!(
            ServerMessage::Stopped.to_json().unwrap(),
            r#"{"type":"stopped"}"#
        );
    }
}
