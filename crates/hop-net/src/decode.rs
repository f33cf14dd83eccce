//! Byte-to-text decoding for fetched pages.

use encoding_rs::Encoding;
use encoding_rs::UTF_8;

const META_SNIFF_BYTES: usize = 1024;

/// Decodes a response body to text. A byte-order mark wins, then a
/// `<meta charset>` in the first kilobyte of markup, then the
/// `Content-Type` charset parameter, then UTF-8. Malformed sequences are
/// replaced rather than rejected.
pub fn decode_body(body: &[u8], content_type: &str) -> String {
    let encoding = sniff_charset(body, content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn sniff_charset(body: &[u8], content_type: &str) -> Option<String> {
    let lowered = content_type.to_ascii_lowercase();
    let is_markup = lowered.is_empty()
        || lowered.contains("text/html")
        || lowered.contains("application/xhtml+xml");

    if is_markup && let Some(label) = meta_charset(body) {
        return Some(label);
    }

    content_type_charset(content_type)
}

fn content_type_charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|parameter| {
        let (name, value) = parameter.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches(['"', '\'']);
        (!label.is_empty()).then(|| label.to_owned())
    })
}

fn meta_charset(body: &[u8]) -> Option<String> {
    let prefix = String::from_utf8_lossy(&body[..body.len().min(META_SNIFF_BYTES)]);
    let lowered = prefix.to_ascii_lowercase();

    lowered.match_indices("charset=").find_map(|(index, marker)| {
        let rest = prefix[index + marker.len()..].trim_start();
        let rest = rest.trim_start_matches(['"', '\'']);
        let end = rest
            .find(|ch: char| ch.is_whitespace() || matches!(ch, '"' | '\'' | ';' | '>' | '/'))
            .unwrap_or(rest.len());
        let label = &rest[..end];
        (!label.is_empty()).then(|| label.to_owned())
    })
}
