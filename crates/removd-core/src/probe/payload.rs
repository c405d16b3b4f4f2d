//! Unwrapping of textual image payloads.
//!
//! Sources may hold raw image bytes, base64 text, a base64 data URL, or a hex
//! dump left behind by an earlier stage that reinterpreted binary as text.
//! Bytes that survive a UTF-8 round trip unchanged are treated as text; all
//! others are already binary.
//!
//! Every function here accepts a *prefix* of the source, so trailing partial
//! groups (half a hex pair, an incomplete base64 quantum, a split UTF-8
//! sequence) are dropped rather than reported.

use std::borrow::Cow;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;

use super::{PayloadEncoding, ProbeError};

const BOM: char = '\u{feff}';

/// Image bytes recovered from a (possibly textual) payload prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped<'a> {
    pub bytes: Cow<'a, [u8]>,
    pub encoding: PayloadEncoding,
    /// MIME type from a `data:` prefix, when one was stripped.
    pub data_url_mime: Option<String>,
}

impl<'a> Unwrapped<'a> {
    fn binary(bytes: &'a [u8]) -> Self {
        Self {
            bytes: Cow::Borrowed(bytes),
            encoding: PayloadEncoding::Binary,
            data_url_mime: None,
        }
    }
}

/// Return the longest prefix of `raw` that is valid UTF-8 when `raw` is text.
///
/// A prefix window may cut a multi-byte sequence in half; that tail is
/// tolerated. Any other invalid sequence means the bytes do not survive the
/// round trip and are binary.
fn as_text(raw: &[u8]) -> Option<&str> {
    match std::str::from_utf8(raw) {
        Ok(text) => Some(text),
        Err(e) if e.error_len().is_none() => std::str::from_utf8(&raw[..e.valid_up_to()]).ok(),
        Err(_) => None,
    }
}

/// Recover image bytes from a payload prefix.
pub fn unwrap_payload(raw: &[u8]) -> Result<Unwrapped<'_>, ProbeError> {
    if raw.is_empty() {
        return Err(ProbeError::Empty);
    }

    let Some(text) = as_text(raw) else {
        return Ok(Unwrapped::binary(raw));
    };

    let text = text.trim_start_matches(BOM).trim_start();
    if text.is_empty() {
        return Err(ProbeError::Empty);
    }

    let (body, data_url_mime) = match strip_data_url(text, raw.len())? {
        Some((mime, body)) => (body, Some(mime)),
        None => (text, None),
    };

    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        // A data URL prefix with nothing behind it yet.
        return Err(ProbeError::Truncated {
            bytes_read: raw.len(),
        });
    }

    if data_url_mime.is_none() && looks_like_hex(&compact) {
        let even = compact.len() - compact.len() % 2;
        let bytes =
            hex::decode(&compact[..even]).map_err(|e| ProbeError::InvalidText(e.to_string()))?;
        return Ok(Unwrapped {
            bytes: Cow::Owned(bytes),
            encoding: PayloadEncoding::Hex,
            data_url_mime,
        });
    }

    let bytes = decode_base64_prefix(&compact)?;
    Ok(Unwrapped {
        bytes: Cow::Owned(bytes),
        encoding: PayloadEncoding::Base64,
        data_url_mime,
    })
}

/// Split `data:<mime>;base64,<body>` into its MIME type and body.
fn strip_data_url(text: &str, bytes_read: usize) -> Result<Option<(String, &str)>, ProbeError> {
    let Some(rest) = text.strip_prefix("data:") else {
        return Ok(None);
    };

    let Some((header, body)) = rest.split_once(',') else {
        return Err(ProbeError::Truncated { bytes_read });
    };

    let mut params = header.split(';');
    let mime = params.next().unwrap_or_default().trim().to_string();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ProbeError::InvalidText(
            "data URL is not base64 encoded".to_string(),
        ));
    }

    Ok(Some((mime, body)))
}

fn looks_like_hex(text: &str) -> bool {
    text.len() >= 2 && text.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decode the complete base64 quanta of a text prefix.
fn decode_base64_prefix(text: &str) -> Result<Vec<u8>, ProbeError> {
    let url_safe = text.bytes().any(|b| b == b'-' || b == b'_');
    let valid = |b: u8| {
        let symbol = if url_safe {
            b == b'-' || b == b'_'
        } else {
            b == b'+' || b == b'/'
        };
        b.is_ascii_alphanumeric() || b == b'=' || symbol
    };
    if let Some(bad) = text.bytes().find(|b| !valid(*b)) {
        return Err(ProbeError::InvalidText(format!(
            "unexpected character {:?} in base64 payload",
            bad as char
        )));
    }

    // Padding ends the payload; anything before it is complete.
    let usable = match text.find('=') {
        Some(end) => &text[..text.len().min(end.div_ceil(4) * 4)],
        None => &text[..text.len() - text.len() % 4],
    };
    if usable.is_empty() {
        return Err(ProbeError::Truncated {
            bytes_read: text.len(),
        });
    }

    let engine = if url_safe { &URL_SAFE } else { &STANDARD };
    engine
        .decode(usable)
        .map_err(|e| ProbeError::InvalidText(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_binary_passthrough() {
        let unwrapped = unwrap_payload(PNG_MAGIC).unwrap();
        assert_eq!(unwrapped.encoding, PayloadEncoding::Binary);
        assert!(matches!(unwrapped.bytes, Cow::Borrowed(_)));
        assert_eq!(&*unwrapped.bytes, PNG_MAGIC);
    }

    #[test]
    fn test_empty_is_error() {
        assert_eq!(unwrap_payload(b""), Err(ProbeError::Empty));
        assert_eq!(unwrap_payload(b"  \n"), Err(ProbeError::Empty));
    }

    #[test]
    fn test_base64_payload() {
        let text = STANDARD.encode(PNG_MAGIC);
        let unwrapped = unwrap_payload(text.as_bytes()).unwrap();
        assert_eq!(unwrapped.encoding, PayloadEncoding::Base64);
        assert_eq!(&*unwrapped.bytes, PNG_MAGIC);
    }

    #[test]
    fn test_base64_prefix_drops_partial_quantum() {
        let text = STANDARD.encode([1u8, 2, 3, 4, 5, 6, 7, 8, 9]);
        // 12 chars; cut at 10 keeps the first 8 chars (6 bytes)
        let unwrapped = unwrap_payload(&text.as_bytes()[..10]).unwrap();
        assert_eq!(&*unwrapped.bytes, &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_data_url_is_stripped() {
        let text = format!("\u{feff}data:image/png;base64,{}", STANDARD.encode(PNG_MAGIC));
        let unwrapped = unwrap_payload(text.as_bytes()).unwrap();
        assert_eq!(unwrapped.data_url_mime.as_deref(), Some("image/png"));
        assert_eq!(&*unwrapped.bytes, PNG_MAGIC);
    }

    #[test]
    fn test_data_url_cut_before_comma_is_truncated() {
        let err = unwrap_payload(b"data:image/png;bas").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_non_base64_data_url_rejected() {
        let err = unwrap_payload(b"data:text/plain,hello").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidText(_)));
    }

    #[test]
    fn test_hex_dump_is_undone() {
        let text = hex::encode(PNG_MAGIC);
        let unwrapped = unwrap_payload(text.as_bytes()).unwrap();
        assert_eq!(unwrapped.encoding, PayloadEncoding::Hex);
        assert_eq!(&*unwrapped.bytes, PNG_MAGIC);

        // Odd-length prefix drops the dangling nibble
        let unwrapped = unwrap_payload(&text.as_bytes()[..5]).unwrap();
        assert_eq!(&*unwrapped.bytes, &PNG_MAGIC[..2]);
    }

    #[test]
    fn test_plain_text_is_invalid() {
        let err = unwrap_payload(b"hello, world!").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidText(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_split_utf8_tail_is_tolerated() {
        let mut raw = STANDARD.encode(PNG_MAGIC).into_bytes();
        raw.push(0xE2); // first byte of a three-byte sequence
        let unwrapped = unwrap_payload(&raw).unwrap();
        assert_eq!(unwrapped.encoding, PayloadEncoding::Base64);
        assert_eq!(&*unwrapped.bytes, PNG_MAGIC);
    }
}
