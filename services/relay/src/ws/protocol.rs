//! Defines the media-stream message protocol spoken by the telephony platform.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages received from the telephony side, keyed by the `event` field.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// First message on a new socket.
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    /// The stream began. Carries the stream identifier used to tag outbound media.
    Start { start: StreamStart },
    /// A frame of base64 mu-law 8 kHz caller audio.
    Media { media: MediaPayload },
    /// The call ended.
    Stop {
        #[serde(default)]
        stop: Option<serde_json::Value>,
    },
    /// Playback of a previously sent mark completed.
    Mark {
        #[serde(default)]
        mark: Option<MarkLabel>,
    },
    /// The caller pressed a key.
    Dtmf {
        #[serde(default)]
        dtmf: Option<DtmfDigit>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MediaPayload {
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MarkLabel {
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DtmfDigit {
    pub digit: String,
}

/// Messages sent to the telephony side.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyMessage {
    /// Audio for the caller, base64 mu-law 8 kHz.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Discards audio already queued for playback.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}

impl TelephonyMessage {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        TelephonyMessage::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia { payload },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        TelephonyMessage::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

pub fn parse_event(text: &str) -> serde_json::Result<TelephonyEvent> {
    serde_json::from_str(text)
}
