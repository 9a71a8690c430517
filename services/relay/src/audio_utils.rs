//! Audio transcoding between the telephony wire format and the AI service.
//!
//! Telephony carries G.711 mu-law at 8 kHz. The AI service takes PCM16 at
//! 16 kHz and returns PCM16 at 24 kHz. Resampling here is deliberately naive
//! (sample duplication / decimation with no anti-aliasing filter); a filtered
//! resampler would improve fidelity at the cost of latency.

use base64::Engine;

pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;
pub const GEMINI_INPUT_SAMPLE_RATE: u32 = 16000;
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

const UPSAMPLE_FACTOR: usize = (GEMINI_INPUT_SAMPLE_RATE / TELEPHONY_SAMPLE_RATE) as usize;
const DOWNSAMPLE_FACTOR: usize = (GEMINI_OUTPUT_SAMPLE_RATE / TELEPHONY_SAMPLE_RATE) as usize;

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

const MULAW_DECODE_TABLE: [i16; 256] = build_decode_table();

const fn build_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        let byte = !(i as u8);
        let sign = byte & 0x80;
        let exponent = ((byte >> 4) & 0x07) as i32;
        let mantissa = (byte & 0x0F) as i32;
        let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
        table[i] = if sign != 0 {
            -magnitude as i16
        } else {
            magnitude as i16
        };
        i += 1;
    }
    table
}

/// Compresses one linear PCM16 sample to a G.711 mu-law byte.
pub fn mulaw_encode_sample(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 { 0x80 } else { 0x00 };
    if pcm < 0 {
        pcm = -pcm;
    }
    pcm = pcm.min(MULAW_CLIP) + MULAW_BIAS;

    // Position of the highest set bit above bit 7 selects the segment.
    let segment_bits = ((pcm >> 7) & 0xFF) as u8;
    let exponent = if segment_bits == 0 {
        0
    } else {
        7 - segment_bits.leading_zeros() as i32
    };
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;

    !(sign | (exponent << 4) as u8 | mantissa as u8)
}

/// Expands one G.711 mu-law byte to a linear PCM16 sample.
pub fn mulaw_decode_sample(byte: u8) -> i16 {
    MULAW_DECODE_TABLE[byte as usize]
}

pub fn encode_mulaw(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().map(|&s| mulaw_encode_sample(s)).collect()
}

pub fn decode_mulaw(mulaw: &[u8]) -> Vec<i16> {
    mulaw.iter().map(|&b| mulaw_decode_sample(b)).collect()
}

/// 8 kHz -> 16 kHz by zero-order hold: every sample is emitted twice.
pub fn upsample_8k_to_16k(pcm8k: &[i16]) -> Vec<i16> {
    pcm8k
        .iter()
        .flat_map(|&s| std::iter::repeat_n(s, UPSAMPLE_FACTOR))
        .collect()
}

/// 24 kHz -> 8 kHz by keeping every third sample.
///
/// Trailing samples that do not fill a group of three are dropped.
pub fn downsample_24k_to_8k(pcm24k: &[i16]) -> Vec<i16> {
    pcm24k
        .chunks_exact(DOWNSAMPLE_FACTOR)
        .map(|group| group[0])
        .collect()
}

/// Encodes PCM16 samples as little-endian bytes in base64.
pub fn encode_i16(pcm16: &[i16]) -> String {
    let pcm16_bytes: Vec<u8> = pcm16.iter().flat_map(|&s| s.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16_bytes)
}

/// Decodes base64 little-endian PCM16. A trailing odd byte is ignored.
pub fn decode_i16(base64_fragment: &str) -> Result<Vec<i16>, base64::DecodeError> {
    let pcm16_bytes = base64::engine::general_purpose::STANDARD.decode(base64_fragment)?;
    Ok(pcm16_bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}
