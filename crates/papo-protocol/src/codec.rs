//! Codec for the JSON text protocol.
//!
//! Each WebSocket text frame carries exactly one JSON object. Inbound frames
//! decode into [`ClientCommand`]; outbound [`ServerEvent`]s encode to a
//! string that is sent verbatim to every recipient of a broadcast.

use thiserror::Error;

use crate::command::ClientCommand;
use crate::event::ServerEvent;

/// Default maximum accepted inbound frame size (16 KiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound frame exceeds the configured size limit.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Payload is not valid JSON for the expected shape.
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode an inbound text frame into a command.
///
/// Unrecognized `type` values decode into [`ClientCommand::Unknown`]; only
/// syntactically malformed or oversized payloads are errors. The size limit
/// applies to inbound frames only; [`MAX_FRAME_SIZE`] is the usual value.
///
/// # Errors
///
/// Returns an error if the frame is too large or not parseable.
pub fn decode_command(raw: &str, max_frame_size: usize) -> Result<ClientCommand, ProtocolError> {
    if raw.len() > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: raw.len(),
            max: max_frame_size,
        });
    }
    Ok(serde_json::from_str(raw)?)
}

/// Encode an event into a text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}
