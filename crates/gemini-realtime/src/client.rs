//! Outbound socket to the Gemini Live service.

use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

/// Public Gemini Live endpoint. The API key is appended as the `key` query parameter.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub type GeminiStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the connection target for `api_key` on top of `endpoint`.
pub fn endpoint_url(endpoint: &str, api_key: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}key={api_key}")
}

/// Opens the AI socket. Resolves once the WebSocket handshake has completed.
pub async fn connect(endpoint: &str, api_key: &str) -> Result<GeminiStream> {
    debug!(endpoint, "Connecting to Gemini Live");
    let (ws_stream, response) = connect_async(endpoint_url(endpoint, api_key))
        .await
        .context("Failed to connect to Gemini Live")?;
    info!(status = %response.status(), "Connected to Gemini Live WebSocket.");
    Ok(ws_stream)
}
