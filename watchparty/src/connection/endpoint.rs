//! Room endpoint URL construction.
//!
//! The auth token travels as a connection-establishment query parameter,
//! passed explicitly per call — never smuggled through shared client
//! configuration.

use url::Url;

/// Errors building a room WebSocket endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The base URL could not be parsed.
    #[error("invalid base URL: {0}")]
    Parse(#[from] url::ParseError),

    /// The base URL cannot carry path segments (e.g. `mailto:`).
    #[error("base URL cannot carry a room path: {0}")]
    InvalidBase(String),

    /// The scheme is not a WebSocket scheme.
    #[error("unsupported scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    /// The room code is empty; the server route never matches it.
    #[error("room code is empty")]
    EmptyRoomCode,
}

/// Builds `<base>/ws/rooms/{room}[?token=...]`.
///
/// # Errors
///
/// Returns [`EndpointError`] when the base URL is unparsable, opaque,
/// or not a `ws`/`wss` URL, or when the room code is empty.
pub fn room_endpoint(
    base: &str,
    room_code: &str,
    token: Option<&str>,
) -> Result<Url, EndpointError> {
    if room_code.is_empty() {
        return Err(EndpointError::EmptyRoomCode);
    }
    let mut url = Url::parse(base)?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    }

    url.path_segments_mut()
        .map_err(|()| EndpointError::InvalidBase(base.to_string()))?
        .pop_if_empty()
        .extend(["ws", "rooms", room_code]);

    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url)
}
