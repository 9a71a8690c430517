//! Telephony Call Relay
//!
//! Bridges a telephony media stream to a Gemini Live session:
//!
//! - `protocol`: The JSON envelope spoken by the telephony platform.
//! - `translator`: Maps telephony events to Gemini directives and back, transcoding audio.
//! - `lifecycle`: The per-call state machine deciding what to send and when to close.
//! - `session`: Accepts connections and drives both sockets for one call.

pub mod lifecycle;
pub mod protocol;
pub mod session;
pub mod translator;

pub use session::ws_handler;
