//! Newline-delimited JSON codec for analysis server communication.
//!
//! Each message is one line of JSON. After a request, the next stdout line
//! is its response, so a line that is not JSON is a protocol failure.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::IdeError;

/// Maximum response line size (16 MiB) accepted from the server.
const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Serialize `msg` as a single line, without the terminator.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, IdeError> {
    serde_json::to_string(msg).map_err(IdeError::Encode)
}

/// Parse one stdout line as a response.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, IdeError> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('{') {
        return Err(IdeError::NotJson {
            line: line.to_string(),
        });
    }
    if trimmed.len() > MAX_LINE_BYTES {
        return Err(IdeError::Decode {
            line: trimmed.chars().take(80).collect(),
            source: serde::de::Error::custom(format!(
                "line of {} bytes exceeds maximum {MAX_LINE_BYTES}",
                trimmed.len()
            )),
        });
    }
    serde_json::from_str(trimmed).map_err(|source| IdeError::Decode {
            line: trimmed.to_string(),
            source,
        })
}
