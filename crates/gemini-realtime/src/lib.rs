//! Client-side building blocks for the Gemini Live API: the JSON message
//! envelope in both directions and the socket connector.

pub mod client;
pub mod types;

pub use client::{DEFAULT_ENDPOINT, GeminiStream, connect, endpoint_url};
pub use types::{ClientMessage, INPUT_AUDIO_MIME, ServerEvent, parse_server_message};
