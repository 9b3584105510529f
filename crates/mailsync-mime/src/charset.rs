//! Charset decoding backed by `encoding_rs`.

use std::borrow::Cow;

use encoding_rs::{Encoding, WINDOWS_1252};

/// Looks up the decoder for a MIME charset label.
///
/// Labels follow the WHATWG Encoding Standard, which covers the names mail
/// software actually emits (`us-ascii`, `latin1`, `gb2312`, ...). Labels
/// that map to the replacement encoding are treated as unsupported.
#[must_use]
pub fn lookup(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().trim_matches('"');
    let encoding = Encoding::for_label_no_replacement(label.as_bytes())
        .or_else(|| alias(label).and_then(|name| Encoding::for_label(name.as_bytes())))?;
    Some(encoding)
}

/// Names seen in the wild that are not WHATWG labels.
fn alias(label: &str) -> Option<&'static str> {
    let label = label.to_ascii_lowercase();
    Some(match label.as_str() {
        "utf8" | "unicode-1-1-utf-8" => "utf-8",
        "ascii" | "ansi_x3.4-1968" | "646" => "us-ascii",
        "cp1252" | "win-1252" => "windows-1252",
        "cp936" => "gbk",
        "ks_c_5601-1987" | "ks_c_5601" => "euc-kr",
        _ => return None,
    })
}

/// Decodes `bytes` in the named charset.
///
/// Returns `None` when the charset is unknown. Malformed sequences in a
/// known charset become U+FFFD.
#[must_use]
pub fn decode(bytes: &[u8], label: &str) -> Option<String> {
    let encoding = lookup(label)?;
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    Some(text.into_owned())
}

/// Decodes text that carries no charset label, such as a raw header block.
///
/// Valid UTF-8 is borrowed unchanged; anything else is read as
/// windows-1252, which maps every byte.
#[must_use]
pub fn decode_unlabelled(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8() {
        assert_eq!(decode("héllo".as_bytes(), "UTF-8").unwrap(), "héllo");
        assert_eq!(decode("héllo".as_bytes(), "utf8").unwrap(), "héllo");
    }

    #[test]
    fn test_latin1() {
        assert_eq!(decode(&[0x63, 0x61, 0x66, 0xE9], "iso-8859-1").unwrap(), "café");
    }

    #[test]
    fn test_quoted_label() {
        assert!(lookup("\"us-ascii\"").is_some());
    }

    #[test]
    fn test_unknown() {
        assert!(decode(b"abc", "x-unknown-charset").is_none());
        assert!(lookup("utf-7").is_none());
    }

    #[test]
    fn test_unlabelled() {
        assert!(matches!(decode_unlabelled(b"plain"), Cow::Borrowed("plain")));
        assert_eq!(decode_unlabelled(b"na\xefve \x80"), "naïve €");
    }

    #[test]
    fn test_replacement_label_is_unsupported() {
        assert!(lookup("iso-2022-kr").is_none());
    }
}
