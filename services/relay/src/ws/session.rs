//! Accepts telephony media-stream connections and drives one call per socket.

use super::{
    lifecycle::{Action, CallSession, Side},
    protocol::{self, TelephonyMessage},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures_util::{
    FutureExt, SinkExt, Stream, StreamExt,
    future::BoxFuture,
    stream::{SplitSink, SplitStream},
};
use gemini_realtime::{ClientMessage, GeminiStream};
use relay_core::tenant::{TenantError, TenantProfile};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::{collections::VecDeque, sync::Arc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{Instrument, debug, error, info, warn};

type PhoneSink = SplitSink<WebSocket, Message>;
type AiSink = SplitSink<GeminiStream, WsMessage>;
type AiSource = SplitStream<GeminiStream>;

/// Query parameters on the telephony stream URL.
#[derive(Deserialize, Debug, Default)]
pub struct StreamParams {
    /// Tenant key. Falls back to the configured default tenant when absent.
    pub client: Option<String>,
}

/// Axum handler upgrading the telephony request to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<StreamParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let tenant_key = match params.client {
        Some(key) if !key.is_empty() => key,
        _ => {
            info!(
                default_tenant = %state.config.default_tenant,
                "No client parameter on stream URL; using default tenant"
            );
            state.config.default_tenant.clone()
        }
    };
    let resolved = state.registry.resolve(&tenant_key);

    ws.on_upgrade(move |socket| async move {
        match resolved {
            Ok(tenant) => handle_socket(socket, state, tenant).await,
            Err(e) => reject_socket(socket, &tenant_key, e).await,
        }
    })
}

/// Closes a connection whose tenant could not be resolved. No session is created.
async fn reject_socket(mut socket: WebSocket, tenant_key: &str, err: TenantError) {
    error!(tenant = %tenant_key, error = %err, "Rejecting telephony connection");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "unknown tenant".into(),
        })))
        .await;
}

/// Runs a single call from accept until both sockets are closed.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, tenant: Arc<TenantProfile>) {
    let conn_id: u32 = rand::random();
    let span = tracing::info_span!(
        "call",
        tenant = %tenant.key,
        conn_id,
        stream_sid = tracing::field::Empty
    );
    async move {
        info!(tenant_name = %tenant.name, "New telephony connection.");
        if let Err(e) = run_call_session(socket, state, tenant).await {
            error!(error = ?e, "Call session terminated with error.");
        }
        info!("Call session finished.");
    }
    .instrument(span)
    .await
}

/// The event loop for one call.
///
/// Telephony messages, AI messages and the pending AI connect are awaited in
/// one `select!`. Every input is fed to the `CallSession`, and the actions it
/// returns are executed before the next input is read.
async fn run_call_session(
    socket: WebSocket,
    state: Arc<AppState>,
    tenant: Arc<TenantProfile>,
) -> Result<()> {
    let (mut phone_tx, mut phone_rx) = socket.split();
    let mut session = CallSession::new(tenant.clone(), state.config.gemini_model.clone());

    let endpoint = state.config.gemini_ws_url.clone();
    let api_key = tenant.api_key.expose_secret().to_string();
    let mut ai_connect: Option<BoxFuture<'static, Result<GeminiStream>>> =
        Some(async move { gemini_realtime::connect(&endpoint, &api_key).await }.boxed());
    let mut ai_tx: Option<AiSink> = None;
    let mut ai_rx: Option<AiSource> = None;
    let mut phone_open = true;

    while !session.is_closed() {
        let actions = tokio::select! {
            connected = poll_connect(&mut ai_connect) => {
                ai_connect = None;
                match connected {
                    Ok(stream) => {
                        let (tx, rx) = stream.split();
                        ai_tx = Some(tx);
                        ai_rx = Some(rx);
                        session.on_ai_open()
                    }
                    Err(e) => {
                        error!(error = ?e, "Gemini connection failed.");
                        session.on_transport_error(Side::Ai)
                    }
                }
            },
            msg = phone_rx.next(), if phone_open => match msg {
                Some(Ok(Message::Text(text))) => match protocol::parse_event(text.as_str()) {
                    Ok(event) => {
                        let actions = session.on_telephony_event(event);
                        if let Some(sid) = session.stream_sid() {
                            tracing::Span::current().record("stream_sid", sid);
                        }
                        actions
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed telephony message.");
                        Vec::new()
                    }
                },
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "Ignoring binary telephony frame.");
                    Vec::new()
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => Vec::new(),
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Telephony side sent close frame.");
                    // Flushes the queued close reply.
                    let _ = phone_tx.close().await;
                    phone_open = false;
                    session.on_closed(Side::Telephony)
                }
                Some(Err(e)) => {
                    error!(error = %e, "Error receiving from telephony WebSocket.");
                    phone_open = false;
                    session.on_transport_error(Side::Telephony)
                }
                None => {
                    info!("Telephony socket ended.");
                    phone_open = false;
                    session.on_closed(Side::Telephony)
                }
            },
            msg = next_from(&mut ai_rx) => match msg {
                Some(Ok(WsMessage::Text(text))) => ai_event(&mut session, text.as_str().as_bytes()),
                Some(Ok(WsMessage::Binary(data))) => ai_event(&mut session, &data),
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "Gemini WebSocket connection closed by server.");
                    ai_rx = None;
                    ai_tx = None;
                    session.on_closed(Side::Ai)
                }
                Some(Ok(_)) => Vec::new(),
                Some(Err(e)) => {
                    error!(error = %e, "Error reading from Gemini WebSocket.");
                    ai_rx = None;
                    ai_tx = None;
                    session.on_transport_error(Side::Ai)
                }
                None => {
                    info!("Gemini socket ended.");
                    ai_rx = None;
                    ai_tx = None;
                    session.on_closed(Side::Ai)
                }
            },
        };

        let mut pending: VecDeque<Action> = actions.into();
        while let Some(action) = pending.pop_front() {
            match action {
                Action::SendToAi(msg) => {
                    let Some(tx) = ai_tx.as_mut() else {
                        debug!("Dropping directive; Gemini socket is gone.");
                        continue;
                    };
                    if let Err(e) = send_ai(tx, &msg).await {
                        error!(error = ?e, "Failed to send to Gemini.");
                        ai_tx = None;
                        ai_rx = None;
                        pending.extend(session.on_transport_error(Side::Ai));
                    }
                }
                Action::SendToTelephony(msg) => {
                    if !phone_open {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut phone_tx, &msg).await {
                        error!(error = ?e, "Failed to send to telephony.");
                        phone_open = false;
                        pending.extend(session.on_transport_error(Side::Telephony));
                    }
                }
                Action::Close(Side::Ai) => {
                    // Dropping a pending connect abandons it.
                    ai_connect = None;
                    ai_rx = None;
                    if let Some(mut tx) = ai_tx.take() {
                        let _ = tx.close().await;
                    }
                    pending.extend(session.on_closed(Side::Ai));
                }
                Action::Close(Side::Telephony) => {
                    let _ = phone_tx.close().await;
                    phone_open = false;
                    pending.extend(session.on_closed(Side::Telephony));
                }
            }
        }
    }

    info!("Telephony and Gemini sockets closed.");
    Ok(())
}

fn ai_event(session: &mut CallSession, bytes: &[u8]) -> Vec<Action> {
    match gemini_realtime::parse_server_message(bytes) {
        Ok(event) => session.on_ai_event(event),
        Err(e) => {
            warn!(error = %e, "Dropping malformed Gemini message.");
            Vec::new()
        }
    }
}

/// Resolves with the connect result, or never if no connect is pending.
async fn poll_connect(
    connect: &mut Option<BoxFuture<'static, Result<GeminiStream>>>,
) -> Result<GeminiStream> {
    match connect.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// Next item from an optional stream; never resolves while the stream is absent.
async fn next_from<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    match stream.as_mut() {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

/// Serializes and sends a `TelephonyMessage` to the telephony socket.
pub(crate) async fn send_msg(socket_tx: &mut PhoneSink, msg: &TelephonyMessage) -> Result<()> {
    let serialized = serde_json::to_string(msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

/// Serializes and sends a `ClientMessage` to the Gemini socket.
async fn send_ai(ai_tx: &mut AiSink, msg: &ClientMessage) -> Result<()> {
    let serialized = serde_json::to_string(msg)?;
    ai_tx.send(WsMessage::Text(serialized.into())).await?;
    Ok(())
}
