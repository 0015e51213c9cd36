//! HTTP upgrade handshake (RFC 6455 section 4.2).

use crate::error::HandshakeError;
use base64::Engine;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this server speaks.
pub const WEBSOCKET_VERSION: &str = "13";

/// Compute the `Sec-WebSocket-Accept` value for a client key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Whether the request asks for a protocol upgrade at all.
///
/// `header` looks up a request header case-insensitively.
pub fn is_upgrade_request<'a>(header: impl Fn(&str) -> Option<&'a str>) -> bool {
    header("upgrade").is_some()
}

/// Validate upgrade headers and return the accept key.
///
/// Checks run in a fixed order so the reported failure is deterministic:
/// `Upgrade`, `Connection`, `Sec-WebSocket-Version`, `Sec-WebSocket-Key`.
pub fn validate_handshake<'a>(
    header: impl Fn(&str) -> Option<&'a str>,
) -> Result<String, HandshakeError> {
    let upgrade = header("upgrade").ok_or(HandshakeError::MissingUpgrade)?;
    if !upgrade.trim().eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::InvalidUpgrade);
    }

    let has_upgrade_token = header("connection")
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    if !has_upgrade_token {
        return Err(HandshakeError::MissingConnectionUpgrade);
    }

    match header("sec-websocket-version") {
        Some(v) if v.trim() == WEBSOCKET_VERSION => {}
        _ => return Err(HandshakeError::UnsupportedVersion),
    }

    let key = header("sec-websocket-key")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    Ok(accept_key(key))
}

/// Raw `101 Switching Protocols` response.
pub fn switching_protocols_response(accept: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept
    )
    .into_bytes()
}
