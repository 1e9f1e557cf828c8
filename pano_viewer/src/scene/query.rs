use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters `encodeURI` leaves alone: unreserved marks plus the URL
/// delimiters, so an already well-formed URL passes through unchanged apart
/// from spaces and non-ASCII text.
const URI_RESERVED_KEPT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// Scene parameter names in the order they are written back to a query.
pub const SCENE_KEYS: [&str; 13] = [
    "video",
    "image",
    "preview",
    "loop",
    "volume",
    "muted",
    "is_stereo",
    "is_yaw_only",
    "is_debug",
    "is_vr_off",
    "is_autopan_off",
    "default_yaw",
    "hide_fullscreen_button",
];

pub fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, URI_RESERVED_KEPT).to_string()
}

pub fn uri_decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Text shown in the error banner: URI-encoded so markup cannot leak through,
/// with encoded spaces restored for readability.
pub fn sanitize_message(message: &str) -> String {
    uri_encode(message).replace("%20", " ")
}

/// Split a page query (with or without the leading `?`) into its first
/// value per key.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    let trimmed = query.trim().trim_start_matches('?');
    let mut params = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(trimmed.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}
