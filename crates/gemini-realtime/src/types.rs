//! Wire types for the Gemini Live `BidiGenerateContent` socket.
//!
//! Outbound messages are always written in camelCase. Inbound messages are
//! accepted in either camelCase or snake_case and normalized into a
//! [`ServerEvent`] right after parsing.

use serde::{Deserialize, Serialize};

/// MIME type of the PCM16 audio the service accepts as realtime input.
pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Messages sent from the relay to the AI service.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(BidiGenerateContentSetup),
    RealtimeInput(BidiGenerateContentRealtimeInput),
    ClientContent(BidiGenerateContentClientContent),
}

impl ClientMessage {
    /// The session setup directive: model, audio output with the given voice,
    /// and the system instruction text verbatim.
    pub fn setup(model: &str, voice: &str, system_instruction: &str) -> Self {
        ClientMessage::Setup(BidiGenerateContentSetup {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                }),
            },
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            }),
        })
    }

    /// A single realtime audio chunk.
    pub fn audio(mime_type: &str, data: String) -> Self {
        ClientMessage::RealtimeInput(BidiGenerateContentRealtimeInput {
            media_chunks: vec![Blob {
                mime_type: mime_type.to_string(),
                data,
            }],
        })
    }

    /// A completed user turn carrying plain text.
    pub fn user_text(text: &str) -> Self {
        ClientMessage::ClientContent(BidiGenerateContentClientContent {
            turns: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: text.to_string(),
                }],
            }],
            turn_complete: true,
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Audio,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentRealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

// --- Inbound ---

/// Raw server message. Every field tolerates both casing conventions.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, alias = "setup_complete")]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default, alias = "server_content")]
    pub server_content: Option<LiveServerContent>,
    #[serde(default, alias = "go_away")]
    pub go_away: Option<GoAway>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerContent {
    #[serde(default, alias = "model_turn")]
    pub model_turn: Option<ServerContentTurn>,
    #[serde(default, alias = "turn_complete")]
    pub turn_complete: Option<bool>,
    #[serde(default)]
    pub interrupted: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerContentTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    #[serde(default, alias = "inline_data")]
    pub inline_data: Option<ServerBlob>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlob {
    #[serde(default, alias = "mime_type")]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default, alias = "time_left")]
    pub time_left: Option<String>,
}

/// Canonical view of an inbound server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The service acknowledged the setup directive.
    SetupComplete,
    /// Model output. `audio` holds the base64 PCM16 parts in arrival order.
    Content {
        audio: Vec<String>,
        interrupted: bool,
        turn_complete: bool,
    },
    /// The service announced it will disconnect soon.
    GoAway { time_left: Option<String> },
    /// Any other message shape.
    Other,
}

impl From<ServerMessage> for ServerEvent {
    fn from(msg: ServerMessage) -> Self {
        if msg.setup_complete.is_some() {
            return ServerEvent::SetupComplete;
        }
        if let Some(content) = msg.server_content {
            let audio = content
                .model_turn
                .map(|turn| {
                    turn.parts
                        .into_iter()
                        .filter_map(|part| part.inline_data)
                        .filter(|blob| {
                            blob.mime_type
                                .as_deref()
                                .is_none_or(|mime| mime.starts_with("audio/"))
                        })
                        .map(|blob| blob.data)
                        .collect()
                })
                .unwrap_or_default();
            return ServerEvent::Content {
                audio,
                interrupted: content.interrupted.unwrap_or(false),
                turn_complete: content.turn_complete.unwrap_or(false),
            };
        }
        if let Some(go_away) = msg.go_away {
            return ServerEvent::GoAway {
                time_left: go_away.time_left,
            };
        }
        ServerEvent::Other
    }
}

/// Parses a server frame (text or binary payload) into its canonical event.
pub fn parse_server_message(bytes: &[u8]) -> serde_json::Result<ServerEvent> {
    let msg: ServerMessage = serde_json::from_slice(bytes)?;
    Ok(msg.into())
}
