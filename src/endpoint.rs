//! Relay endpoint normalization.
//!
//! The envelope carries `serverEp` in whatever form the operator configured:
//! `http(s)://` or `ws(s)://`, with or without the `/ws` path. The connection
//! manager always dials the normalized form.

/// Rewrites a configured endpoint into a dialable WebSocket URL.
///
/// Rules:
/// - `http://` becomes `ws://`, `https://` becomes `wss://`
/// - if the URL contains no `/ws` segment, trailing slashes are stripped and
///   `/ws` is appended
///
/// The function is total and idempotent: normalizing an already-normalized
/// URL is a no-op.
pub fn normalize_ws_url(endpoint: &str) -> String {
    let url = if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    };

    if url.contains("/ws") {
        url
    } else {
        format!("{}/ws", url.trim_end_matches('/'))
    }
}
