//! `data:` URL encoding for in-memory images.

use super::CaptureError;
use base64::Engine;

/// Wrap encoded image bytes as `data:<mime>;base64,<payload>`.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", mime, payload)
}

/// Split a base64 data URL into its MIME type and decoded bytes.
///
/// Only base64 payloads are accepted; percent-encoded data URLs never carry
/// binary images in practice.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), CaptureError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| CaptureError::InvalidDataUrl("missing data: scheme".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| CaptureError::InvalidDataUrl("missing ',' separator".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| CaptureError::InvalidDataUrl("payload is not base64".to_string()))?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
    Ok((mime.to_string(), bytes))
}
