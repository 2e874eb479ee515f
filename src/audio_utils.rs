use base64::Engine;

/// Decodes and re-encodes a base64 audio payload.
///
/// Both call legs carry 8 kHz G.711 µ-law audio, so there is no transcoding
/// in this service; the round trip validates the payload and normalizes its
/// padding while leaving the underlying bytes untouched.
pub fn reencode_base64(payload: &str) -> anyhow::Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}
