//! Directives carried by the `roblox-player:` / `roblox-studio:` URIs.
//!
//! A URI is a `+`-separated list of `key:value` tokens. Only `channel` is
//! acted on; every other token, and any token that is not exactly one
//! key and one value, is ignored.

use tracing::warn;

/// The channel requested by `uri`. When several `channel:` tokens are
/// present the last non-empty one wins.
pub(crate) fn requested_channel(uri: &str) -> Option<&str> {
    let mut channel = None;
    for token in uri.split('+') {
        let mut kv = token.split(':');
        let (Some("channel"), Some(value), None) = (kv.next(), kv.next(), kv.next()) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        warn!(channel = value, "Roblox has requested a user channel, changing...");
        channel = Some(value);
    }
    channel
}
