//! Per-call lifecycle state machine.
//!
//! `CallSession` owns no sockets. Each input (a telephony event, an AI event,
//! the AI socket opening, either socket closing) returns the list of
//! [`Action`]s the driver in `session.rs` must perform, in order.

use super::{protocol::TelephonyEvent, protocol::TelephonyMessage, translator};
use gemini_realtime::{ClientMessage, ServerEvent};
use relay_core::tenant::TenantProfile;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Telephony socket accepted; waiting for the stream `start`.
    Init,
    /// Stream started; waiting for the AI to acknowledge setup.
    Handshaking,
    /// Setup acknowledged; audio flows both ways.
    Active,
    /// Shutdown in progress; no more audio is forwarded.
    Closing,
    /// Both sockets are closed.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Telephony,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Stop,
    TelephonyClosed,
    AiClosed,
    TransportError(Side),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendToAi(ClientMessage),
    SendToTelephony(TelephonyMessage),
    /// Close this side's socket, or abandon it if it is still connecting.
    Close(Side),
}

#[derive(Debug, Default, Clone, Copy)]
struct SideState {
    /// Socket finished connecting (always true for telephony).
    open: bool,
    /// Socket is gone, either closed by the peer or by us.
    closed: bool,
    /// A `Close` action has been emitted for this side.
    close_issued: bool,
}

pub struct CallSession {
    tenant: Arc<TenantProfile>,
    model: String,
    state: CallState,
    stream_sid: Option<String>,
    setup_sent: bool,
    telephony: SideState,
    ai: SideState,
}

impl CallSession {
    /// A session for a freshly accepted telephony socket whose AI socket is still connecting.
    pub fn new(tenant: Arc<TenantProfile>, model: impl Into<String>) -> Self {
        Self {
            tenant,
            model: model.into(),
            state: CallState::Init,
            stream_sid: None,
            setup_sent: false,
            telephony: SideState {
                open: true,
                ..SideState::default()
            },
            ai: SideState::default(),
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.state == CallState::Closed
    }

    fn is_shutting_down(&self) -> bool {
        matches!(self.state, CallState::Closing | CallState::Closed)
    }

    /// The AI socket completed its handshake.
    pub fn on_ai_open(&mut self) -> Vec<Action> {
        self.ai.open = true;
        if self.is_shutting_down() {
            return self.close_side(Side::Ai).into_iter().collect();
        }
        self.maybe_send_setup().into_iter().collect()
    }

    pub fn on_telephony_event(&mut self, event: TelephonyEvent) -> Vec<Action> {
        if self.is_shutting_down() {
            debug!(state = ?self.state, "Ignoring telephony event while closing");
            return Vec::new();
        }

        match event {
            TelephonyEvent::Connected { protocol } => {
                debug!(?protocol, "Telephony stream connected");
                Vec::new()
            }
            TelephonyEvent::Start { start } => {
                if self.state != CallState::Init {
                    warn!(stream_sid = %start.stream_sid, "Ignoring duplicate start event");
                    return Vec::new();
                }
                info!(
                    stream_sid = %start.stream_sid,
                    call_sid = ?start.call_sid,
                    custom_parameters = ?start.custom_parameters,
                    "Telephony stream started"
                );
                self.stream_sid = Some(start.stream_sid);
                self.state = CallState::Handshaking;
                self.maybe_send_setup().into_iter().collect()
            }
            TelephonyEvent::Media { media } => {
                if self.stream_sid.is_none() {
                    debug!("Dropping caller audio received before stream start");
                    return Vec::new();
                }
                if !self.ai.open {
                    debug!("Dropping caller audio; AI socket not open yet");
                    return Vec::new();
                }
                match translator::caller_audio(&media.payload) {
                    Ok(msg) => vec![Action::SendToAi(msg)],
                    Err(e) => {
                        warn!(error = %e, "Dropping caller audio frame");
                        Vec::new()
                    }
                }
            }
            TelephonyEvent::Stop { .. } => self.begin_close(CloseReason::Stop),
            TelephonyEvent::Mark { mark } => {
                debug!(?mark, "Playback mark reached");
                Vec::new()
            }
            TelephonyEvent::Dtmf { dtmf } => {
                debug!(?dtmf, "Ignoring DTMF");
                Vec::new()
            }
            TelephonyEvent::Unknown => Vec::new(),
        }
    }

    pub fn on_ai_event(&mut self, event: ServerEvent) -> Vec<Action> {
        if self.is_shutting_down() {
            return Vec::new();
        }

        match event {
            ServerEvent::SetupComplete => {
                if self.state != CallState::Handshaking {
                    warn!(state = ?self.state, "Unexpected setup acknowledgment");
                    return Vec::new();
                }
                info!("Gemini session setup is complete. Ready for bidirectional streaming.");
                self.state = CallState::Active;
                match &self.tenant.greeting {
                    Some(greeting) => vec![Action::SendToAi(translator::greeting_directive(
                        greeting,
                    ))],
                    None => Vec::new(),
                }
            }
            ServerEvent::Content {
                audio,
                interrupted,
                turn_complete,
            } => {
                let Some(stream_sid) = self.stream_sid.as_deref() else {
                    debug!("Dropping model output received before stream start");
                    return Vec::new();
                };
                let mut actions = Vec::with_capacity(audio.len() + 1);
                if interrupted {
                    debug!("Model output interrupted; clearing telephony playback");
                    actions.push(Action::SendToTelephony(TelephonyMessage::clear(stream_sid)));
                }
                for part in &audio {
                    match translator::model_audio(stream_sid, part) {
                        Ok(msg) => actions.push(Action::SendToTelephony(msg)),
                        Err(e) => warn!(error = %e, "Dropping model audio part"),
                    }
                }
                if turn_complete {
                    debug!("Model turn complete");
                }
                actions
            }
            ServerEvent::GoAway { time_left } => {
                warn!(?time_left, "Gemini announced it will disconnect");
                Vec::new()
            }
            ServerEvent::Other => Vec::new(),
        }
    }

    /// A socket closed, either remotely or after one of our `Close` actions.
    pub fn on_closed(&mut self, side: Side) -> Vec<Action> {
        let reason = match side {
            Side::Telephony => CloseReason::TelephonyClosed,
            Side::Ai => CloseReason::AiClosed,
        };
        self.mark_closed(side, reason)
    }

    /// A socket failed. It is treated as closed.
    pub fn on_transport_error(&mut self, side: Side) -> Vec<Action> {
        self.mark_closed(side, CloseReason::TransportError(side))
    }

    fn mark_closed(&mut self, side: Side, reason: CloseReason) -> Vec<Action> {
        self.side_mut(side).closed = true;
        let actions = self.begin_close(reason);
        if self.telephony.closed && self.ai.closed && self.state != CallState::Closed {
            info!("Call session closed");
            self.state = CallState::Closed;
        }
        actions
    }

    /// Moves to `Closing` and closes every side not already gone. Idempotent.
    fn begin_close(&mut self, reason: CloseReason) -> Vec<Action> {
        if !self.is_shutting_down() {
            info!(?reason, "Closing call session");
            self.state = CallState::Closing;
        }
        [Side::Ai, Side::Telephony]
            .into_iter()
            .filter_map(|side| self.close_side(side))
            .collect()
    }

    fn close_side(&mut self, side: Side) -> Option<Action> {
        let side_state = self.side_mut(side);
        if side_state.closed || side_state.close_issued {
            return None;
        }
        side_state.close_issued = true;
        Some(Action::Close(side))
    }

    fn maybe_send_setup(&mut self) -> Option<Action> {
        if self.setup_sent || self.state != CallState::Handshaking || !self.ai.open {
            return None;
        }
        self.setup_sent = true;
        info!(model = %self.model, voice = %self.tenant.voice, "Sending setup to Gemini");
        Some(Action::SendToAi(translator::setup_directive(
            &self.model,
            &self.tenant,
        )))
    }

    fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::Telephony => &mut self.telephony,
            Side::Ai => &mut self.ai,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio_utils,
        ws::protocol::{MediaPayload, StreamStart},
    };
    use base64::Engine;
    use std::collections::HashMap;

    fn session(greeting: Option<&str>) -> CallSession {
        CallSession::new(translator::tests::tenant(greeting), "models/test")
    }

    fn start(stream_sid: &str) -> TelephonyEvent {
        TelephonyEvent::Start {
            start: StreamStart {
                stream_sid: stream_sid.to_string(),
                call_sid: Some("CA1".to_string()),
                custom_parameters: HashMap::new(),
            },
        }
    }

    fn media(bytes: &[u8]) -> TelephonyEvent {
        TelephonyEvent::Media {
            media: MediaPayload {
                payload: base64::engine::general_purpose::STANDARD.encode(bytes),
                track: Some("inbound".to_string()),
            },
        }
    }

    fn is_setup(action: &Action) -> bool {
        matches!(action, Action::SendToAi(ClientMessage::Setup(_)))
    }

    fn is_audio_to_ai(action: &Action) -> bool {
        matches!(action, Action::SendToAi(ClientMessage::RealtimeInput(_)))
    }

    #[test]
    fn test_setup_deferred_until_ai_open() {
        let mut session = session(None);
        assert!(session.on_telephony_event(start("abc123")).is_empty());
        assert_eq!(session.state(), CallState::Handshaking);
        assert_eq!(session.stream_sid(), Some("abc123"));

        let actions = session.on_ai_open();
        assert_eq!(actions.len(), 1);
        assert!(is_setup(&actions[0]));
    }

    #[test]
    fn test_setup_sent_on_start_when_ai_already_open() {
        let mut session = session(None);
        assert!(session.on_ai_open().is_empty());
        assert_eq!(session.state(), CallState::Init);

        let actions = session.on_telephony_event(start("abc123"));
        assert_eq!(actions.len(), 1);
        assert!(is_setup(&actions[0]));
    }

    #[test]
    fn test_setup_never_duplicated() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        assert_eq!(session.on_ai_open().len(), 1);
        assert!(session.on_ai_open().is_empty());
        assert!(session.on_telephony_event(start("other")).is_empty());
        assert_eq!(session.stream_sid(), Some("abc123"));
    }

    #[test]
    fn test_media_before_start_is_dropped() {
        let mut session = session(None);
        session.on_ai_open();
        assert!(session.on_telephony_event(media(&[0xFF; 160])).is_empty());
        assert_eq!(session.state(), CallState::Init);
    }

    #[test]
    fn test_media_before_ai_open_is_dropped() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        assert!(session.on_telephony_event(media(&[0xFF; 160])).is_empty());
    }

    #[test]
    fn test_media_forwarded_while_handshaking_and_active() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        session.on_ai_open();

        let actions = session.on_telephony_event(media(&[0x10; 160]));
        assert_eq!(actions.len(), 1);
        assert!(is_audio_to_ai(&actions[0]));

        session.on_ai_event(ServerEvent::SetupComplete);
        assert_eq!(session.state(), CallState::Active);
        let actions = session.on_telephony_event(media(&[0x20; 160]));
        assert_eq!(actions.len(), 1);
        assert!(is_audio_to_ai(&actions[0]));
    }

    #[test]
    fn test_bad_media_payload_dropped_without_closing() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        session.on_ai_open();
        assert!(
            session
                .on_telephony_event(TelephonyEvent::Media {
                    media: MediaPayload {
                        payload: "%%%".to_string(),
                        track: None,
                    },
                })
                .is_empty()
        );
        assert_eq!(session.state(), CallState::Handshaking);
        assert_eq!(session.on_telephony_event(media(&[1, 2, 3])).len(), 1);
    }

    #[test]
    fn test_greeting_policy() {
        let mut quiet = session(None);
        quiet.on_telephony_event(start("abc123"));
        quiet.on_ai_open();
        assert!(quiet.on_ai_event(ServerEvent::SetupComplete).is_empty());

        let mut greeter = session(Some("Greet the caller."));
        greeter.on_telephony_event(start("abc123"));
        greeter.on_ai_open();
        let actions = greeter.on_ai_event(ServerEvent::SetupComplete);
        assert_eq!(
            actions,
            vec![Action::SendToAi(ClientMessage::user_text("Greet the caller."))]
        );
        // A repeated acknowledgment does not greet twice.
        assert!(greeter.on_ai_event(ServerEvent::SetupComplete).is_empty());
    }

    #[test]
    fn test_model_audio_forwarded_in_order() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        session.on_ai_open();
        session.on_ai_event(ServerEvent::SetupComplete);

        let first = audio_utils::encode_i16(&[100; 240]);
        let second = audio_utils::encode_i16(&[-100; 240]);
        let actions = session.on_ai_event(ServerEvent::Content {
            audio: vec![first.clone(), second.clone()],
            interrupted: false,
            turn_complete: true,
        });
        assert_eq!(
            actions,
            vec![
                Action::SendToTelephony(translator::model_audio("abc123", &first).unwrap()),
                Action::SendToTelephony(translator::model_audio("abc123", &second).unwrap()),
            ]
        );
    }

    #[test]
    fn test_interruption_clears_playback_first() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        session.on_ai_open();
        let actions = session.on_ai_event(ServerEvent::Content {
            audio: vec![audio_utils::encode_i16(&[0; 30])],
            interrupted: true,
            turn_complete: false,
        });
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            Action::SendToTelephony(TelephonyMessage::clear("abc123"))
        );
    }

    #[test]
    fn test_stop_closes_both_sides_once() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        session.on_ai_open();

        let actions = session.on_telephony_event(TelephonyEvent::Stop { stop: None });
        assert_eq!(
            actions,
            vec![Action::Close(Side::Ai), Action::Close(Side::Telephony)]
        );
        assert_eq!(session.state(), CallState::Closing);

        assert!(session.on_closed(Side::Ai).is_empty());
        assert!(!session.is_closed());
        assert!(session.on_closed(Side::Telephony).is_empty());
        assert!(session.is_closed());
    }

    #[test]
    fn test_telephony_close_closes_ai_exactly_once() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        session.on_ai_open();

        let actions = session.on_closed(Side::Telephony);
        assert_eq!(actions, vec![Action::Close(Side::Ai)]);

        // The AI socket closes on its own at the same time.
        assert!(session.on_closed(Side::Ai).is_empty());
        assert!(session.is_closed());

        // Late notifications are no-ops.
        assert!(session.on_closed(Side::Ai).is_empty());
        assert!(session.on_transport_error(Side::Telephony).is_empty());
        assert!(session.is_closed());
    }

    #[test]
    fn test_ai_close_closes_telephony() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        session.on_ai_open();
        session.on_ai_event(ServerEvent::SetupComplete);

        assert_eq!(
            session.on_transport_error(Side::Ai),
            vec![Action::Close(Side::Telephony)]
        );
        assert_eq!(session.state(), CallState::Closing);
        assert!(session.on_closed(Side::Telephony).is_empty());
        assert!(session.is_closed());
    }

    #[test]
    fn test_close_while_ai_connecting_abandons_connect() {
        let mut session = session(None);
        assert_eq!(
            session.on_closed(Side::Telephony),
            vec![Action::Close(Side::Ai)]
        );
        // A connect that completes anyway does not get a second close.
        assert!(session.on_ai_open().is_empty());
        assert!(session.on_closed(Side::Ai).is_empty());
        assert!(session.is_closed());
    }

    #[test]
    fn test_nothing_forwarded_while_closing() {
        let mut session = session(None);
        session.on_telephony_event(start("abc123"));
        session.on_ai_open();
        session.on_telephony_event(TelephonyEvent::Stop { stop: None });

        assert!(session.on_telephony_event(media(&[0xFF; 160])).is_empty());
        assert!(
            session
                .on_ai_event(ServerEvent::Content {
                    audio: vec![audio_utils::encode_i16(&[0; 240])],
                    interrupted: false,
                    turn_complete: false,
                })
                .is_empty()
        );
    }
}
