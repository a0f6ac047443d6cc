// Video reference normalization.
//
// Operators paste whatever they have at hand into the admin forms: a bare video id,
// a watch-page link, or a share link. The player widget only understands the bare
// id, so every raw reference goes through `normalize` before it reaches a playlist.

use serde::{Deserialize, Serialize};
use url::Url;

/// Length of a bare (already canonical) video id.
pub const VIDEO_ID_LEN: usize = 11;

const LONG_FORM_HOST: &str = "youtube.com";
const SHORT_FORM_HOST: &str = "youtu.be";

/// A video id the embedded player can load directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_bare_id(raw: &str) -> bool {
    raw.len() == VIDEO_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Map a raw reference to a canonical video id.
///
/// Accepted shapes:
///   - a bare 11 character id (`[A-Za-z0-9_-]{11}`), returned unchanged
///   - a long-form link whose host contains `youtube.com`: the `v` query parameter
///   - a short-form link whose host contains `youtu.be`: the first path segment
///
/// Anything else (relative strings, unknown hosts, a missing `v`) yields `None`.
pub fn normalize(raw: &str) -> Option<VideoId> {
    if raw.is_empty() {
        return None;
    }
    if is_bare_id(raw) {
        return Some(VideoId(raw.to_string()));
    }

    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;

    let id = if host.contains(LONG_FORM_HOST) {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())?
    } else if host.contains(SHORT_FORM_HOST) {
        url.path_segments()?.next()?.to_string()
    } else {
        return None;
    };

    if id.is_empty() {
        return None;
    }
    Some(VideoId(id))
}

#[cfg(test)]
pub(crate) fn video_id(raw: &str) -> VideoId {
    VideoId(raw.to_string())
}
