//! Axum Handlers for the HTTP surface
//!
//! The voice webhook answers an incoming call with TwiML that connects the
//! call's audio to this relay's media-stream endpoint.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{state::AppState, ws::session::StreamParams};

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

pub async fn health() -> &'static str {
    "ok"
}

/// Voice webhook for an incoming call.
///
/// Responds with TwiML that streams the call to `/stream` for the same tenant.
pub async fn voice_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let tenant_key = params
        .client
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| state.config.default_tenant.clone());

    let tenant = state.registry.resolve(&tenant_key).map_err(|e| {
        warn!(tenant = %tenant_key, error = %e, "Voice webhook for unavailable tenant");
        ApiError::NotFound(e.to_string())
    })?;

    let base = match &state.config.public_stream_url {
        Some(url) => url.clone(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| ApiError::BadRequest("Missing Host header".to_string()))?;
            format!("wss://{host}/stream")
        }
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    let stream_url = format!("{base}{separator}client={}", tenant.key);
    info!(tenant = %tenant.key, %stream_url, "Answering call with media stream");

    let twiml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}"/></Connect></Response>"#,
        xml_escape(&stream_url)
    );
    Ok(([(header::CONTENT_TYPE, "text/xml")], twiml).into_response())
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
