//! Pure mapping between telephony events and Gemini Live directives.

use super::protocol::TelephonyMessage;
use crate::audio_utils;
use base64::Engine;
use gemini_realtime::{ClientMessage, INPUT_AUDIO_MIME};
use relay_core::tenant::TenantProfile;

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("audio payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("audio payload produced no samples")]
    EmptyFrame,
}

/// The setup directive sent once per call when the stream starts.
pub fn setup_directive(model: &str, tenant: &TenantProfile) -> ClientMessage {
    ClientMessage::setup(model, &tenant.voice, &tenant.system_prompt)
}

/// Asks the AI to open the conversation with the tenant's greeting.
pub fn greeting_directive(greeting: &str) -> ClientMessage {
    ClientMessage::user_text(greeting)
}

/// Telephony `media` payload (base64 mu-law 8 kHz) -> realtime input (base64 PCM16 16 kHz).
pub fn caller_audio(payload: &str) -> Result<ClientMessage, TranslateError> {
    let mulaw = base64::engine::general_purpose::STANDARD.decode(payload)?;
    if mulaw.is_empty() {
        return Err(TranslateError::EmptyFrame);
    }
    let pcm8k = audio_utils::decode_mulaw(&mulaw);
    let pcm16k = audio_utils::upsample_8k_to_16k(&pcm8k);
    Ok(ClientMessage::audio(
        INPUT_AUDIO_MIME,
        audio_utils::encode_i16(&pcm16k),
    ))
}

/// AI audio part (base64 PCM16 24 kHz) -> telephony `media` event (base64 mu-law 8 kHz).
pub fn model_audio(stream_sid: &str, data: &str) -> Result<TelephonyMessage, TranslateError> {
    let pcm24k = audio_utils::decode_i16(data)?;
    let pcm8k = audio_utils::downsample_24k_to_8k(&pcm24k);
    if pcm8k.is_empty() {
        return Err(TranslateError::EmptyFrame);
    }
    let mulaw = audio_utils::encode_mulaw(&pcm8k);
    Ok(TelephonyMessage::media(
        stream_sid,
        base64::engine::general_purpose::STANDARD.encode(mulaw),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::sync::Arc;

    pub(crate) fn tenant(greeting: Option<&str>) -> Arc<TenantProfile> {
        Arc::new(TenantProfile {
            key: "acme".to_string(),
            name: "Acme Heating".to_string(),
            api_key: SecretString::from("test-key".to_string()),
            system_prompt: "You are the Acme Heating receptionist.".to_string(),
            voice: "Aoede".to_string(),
            greeting: greeting.map(str::to_string),
        })
    }

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_setup_directive_carries_tenant_settings() {
        let value = serde_json::to_value(setup_directive("models/x", &tenant(None))).unwrap();
        assert_eq!(value["setup"]["model"], "models/x");
        assert_eq!(
            value["setup"]["systemInstruction"]["parts"][0]["text"],
            "You are the Acme Heating receptionist."
        );
        assert_eq!(
            value["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Aoede"
        );
    }

    #[test]
    fn test_caller_audio_20ms_frame() {
        let mulaw: Vec<u8> = (0..160).map(|i| i as u8).collect();
        let ClientMessage::RealtimeInput(input) = caller_audio(&b64(&mulaw)).unwrap() else {
            panic!("expected realtime input");
        };
        assert_eq!(input.media_chunks.len(), 1);
        let chunk = &input.media_chunks[0];
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");

        let pcm = audio_utils::decode_i16(&chunk.data).unwrap();
        assert_eq!(pcm.len() * 2, 640);
        for (i, &byte) in mulaw.iter().enumerate() {
            let expected = audio_utils::mulaw_decode_sample(byte);
            assert_eq!(pcm[2 * i], expected);
            assert_eq!(pcm[2 * i + 1], expected);
        }
    }

    #[test]
    fn test_caller_audio_rejects_bad_payloads() {
        assert!(matches!(
            caller_audio("***"),
            Err(TranslateError::InvalidBase64(_))
        ));
        assert!(matches!(caller_audio(""), Err(TranslateError::EmptyFrame)));
    }

    #[test]
    fn test_model_audio_downsamples_and_tags_stream() {
        // 20 ms at 24 kHz: 480 samples, 960 bytes.
        let pcm24k: Vec<i16> = (0..480).map(|i| (i * 50) as i16).collect();
        let msg = model_audio("abc123", &audio_utils::encode_i16(&pcm24k)).unwrap();
        let TelephonyMessage::Media { stream_sid, media } = msg else {
            panic!("expected media");
        };
        assert_eq!(stream_sid, "abc123");

        let mulaw = base64::engine::general_purpose::STANDARD
            .decode(media.payload)
            .unwrap();
        assert_eq!(mulaw.len(), 160);
        for (i, &byte) in mulaw.iter().enumerate() {
            assert_eq!(byte, audio_utils::mulaw_encode_sample(pcm24k[3 * i]));
        }
    }

    #[test]
    fn test_model_audio_10ms_part() {
        let pcm24k = vec![0i16; 240];
        let TelephonyMessage::Media { media, .. } =
            model_audio("abc123", &audio_utils::encode_i16(&pcm24k)).unwrap()
        else {
            panic!("expected media");
        };
        let mulaw = base64::engine::general_purpose::STANDARD
            .decode(media.payload)
            .unwrap();
        assert_eq!(mulaw.len(), 80);
    }

    #[test]
    fn test_model_audio_rejects_bad_payloads() {
        assert!(matches!(
            model_audio("abc123", "not base64!"),
            Err(TranslateError::InvalidBase64(_))
        ));
        // Two samples cannot fill one output sample.
        assert!(matches!(
            model_audio("abc123", &audio_utils::encode_i16(&[1, 2])),
            Err(TranslateError::EmptyFrame)
        ));
    }
}
