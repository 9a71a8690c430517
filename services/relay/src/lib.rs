//! Multi-tenant telephony relay.
//!
//! This library contains the relay between a telephony media stream and the
//! Gemini Live API: configuration, shared state, audio transcoding, the call
//! session and the HTTP routing. The `relay` binary is a thin wrapper around it.

pub mod audio_utils;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
