//! HTTP and WebSocket surface
//!
//! - GET /ws/speech - Real-time transcription over WebSocket
//! - GET /sessions - List live sessions
//! - GET /sessions/:id/status - Query session status
//! - GET /health - Health check

mod handlers;
mod routes;
pub mod socket;
mod state;

pub use handlers::{ErrorResponse, SessionListResponse};
pub use routes::create_router;
pub use socket::run_connection;
pub use state::AppState;
