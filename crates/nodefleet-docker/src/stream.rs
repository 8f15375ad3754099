//! Rendering of the image pull message stream.
//!
//! The engine answers a pull with a sequence of JSON messages. The HTTP
//! status is 200 even when the pull fails; the failure arrives as a message
//! carrying `error`.

use serde::Deserialize;

use nodefleet_core::EngineError;

#[derive(Debug, Deserialize)]
struct PullMessage {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorDetail")]
    error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Append one text line per status message to `output`.
///
/// Progress bars are dropped. Layer messages render as `id: status`, the
/// rest (including `Digest: ...`) as the bare status.
pub fn render_pull_stream(body: &[u8], output: &mut String) -> Result<(), EngineError> {
    for message in serde_json::Deserializer::from_slice(body).into_iter::<PullMessage>() {
        let message = message
            .map_err(|e| EngineError::Transport(format!("malformed pull stream: {e}")))?;

        let detail = message.error_detail.and_then(|d| d.message);
        if let Some(error) = message.error.or(detail) {
            return Err(EngineError::Pull(error));
        }
        let Some(status) = message.status else {
            continue;
        };
        match message.id {
            Some(id) if !id.is_empty() => output.push_str(&format!("{id}: {status}\n")),
            _ => output.push_str(&format!("{status}\n")),
        }
    }
    Ok(())
}
