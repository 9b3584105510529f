//! MIME content type and disposition handling.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::charset;
use crate::encoding::{decode_rfc2047, hex_value};
use crate::error::{Error, Result};

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters with lowercase names (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// The RFC 2045 default: `text/plain; charset=us-ascii`.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "us-ascii")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns `type/subtype`.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters
            .get("boundary")
            .map(String::as_str)
            .filter(|b| !b.is_empty())
    }

    /// Returns the legacy `name` parameter.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the `type/subtype` pair is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, params) = s.split_once(';').unwrap_or((s, ""));
        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .map(|(m, s)| (m.trim(), s.trim()))
            .filter(|(m, s)| is_token(m) && is_token(s))
            .ok_or_else(|| Error::InvalidContentType(s.to_string()))?;

        Ok(Self {
            main_type: main_type.to_lowercase(),
            sub_type: sub_type.to_lowercase(),
            parameters: parse_parameters(params),
        })
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::text_plain()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;

        let mut params: Vec<_> = self.parameters.iter().collect();
        params.sort();
        for (key, value) in params {
            if value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c)) {
                write!(f, "; {key}=\"{value}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

/// Disposition type from `Content-Disposition`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispositionKind {
    /// Shown as part of the message body.
    Inline,
    /// Meant to be saved separately.
    Attachment,
    /// Any other token, lowercased.
    Other(String),
}

/// Parsed `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentDisposition {
    /// Disposition type.
    pub kind: DispositionKind,
    /// Parameters with lowercase names.
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a disposition value. Never fails; an empty type is `Other("")`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (kind, params) = s.split_once(';').unwrap_or((s, ""));
        let kind = match kind.trim().to_lowercase().as_str() {
            "inline" => DispositionKind::Inline,
            "attachment" => DispositionKind::Attachment,
            other => DispositionKind::Other(other.to_string()),
        };
        Self {
            kind,
            parameters: parse_parameters(params),
        }
    }

    /// Returns the filename parameter.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }

    /// Checks if the disposition is `attachment`.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.kind == DispositionKind::Attachment
    }

    /// Checks if the disposition is `inline`.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.kind == DispositionKind::Inline
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
}

/// One `name*N*=value` section of an RFC 2231 parameter.
struct Section {
    value: String,
    extended: bool,
}

/// Parses `; key=value` parameters.
///
/// RFC 2231 continuations (`name*0=`, `name*1=`) are joined and extended
/// values (`name*=utf-8''%C3%A9`) are percent- and charset-decoded. Plain
/// values carrying RFC 2047 encoded words are decoded too, since mailers
/// commonly send filenames that way.
pub(crate) fn parse_parameters(s: &str) -> HashMap<String, String> {
    let mut plain = HashMap::new();
    let mut sections: BTreeMap<String, BTreeMap<u32, Section>> = BTreeMap::new();

    for param in split_parameters(s) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = unquote(value.trim());
        if key.is_empty() {
            continue;
        }

        let (name, extended) = match key.strip_suffix('*') {
            Some(name) => (name, true),
            None => (key.as_str(), false),
        };
        match name.split_once('*') {
            Some((base, index)) => {
                if let Ok(index) = index.parse::<u32>() {
                    sections
                        .entry(base.to_string())
                        .or_default()
                        .insert(index, Section { value, extended });
                }
            }
            None if extended => {
                sections
                    .entry(name.to_string())
                    .or_default()
                    .insert(0, Section { value, extended });
            }
            None => {
                plain.insert(name.to_string(), value);
            }
        }
    }

    let mut parameters: HashMap<String, String> = plain
        .into_iter()
        .map(|(key, value)| {
            let value = if value.contains("=?") {
                decode_rfc2047(&value)
            } else {
                value
            };
            (key, value)
        })
        .collect();

    // RFC 2231 values take precedence over their plain counterparts
    for (name, parts) in sections {
        parameters.insert(name, join_sections(&parts));
    }
    parameters
}

fn join_sections(parts: &BTreeMap<u32, Section>) -> String {
    let mut charset_label: Option<String> = None;
    let mut bytes = Vec::new();

    for (index, section) in parts {
        if !section.extended {
            bytes.extend_from_slice(section.value.as_bytes());
            continue;
        }
        let mut value = section.value.as_str();
        if *index == 0 {
            // charset'language'value
            let mut fields = value.splitn(3, '\'');
            if let (Some(label), Some(_lang), Some(rest)) =
                (fields.next(), fields.next(), fields.next())
            {
                charset_label = Some(label.to_string()).filter(|l| !l.is_empty());
                value = rest;
            }
        }
        bytes.extend(percent_decode(value));
    }

    charset_label
        .and_then(|label| charset::decode(&bytes, &label))
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned())
}

fn percent_decode(value: &str) -> Vec<u8> {
    let raw = value.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            if let (Some(high), Some(low)) = (
                raw.get(i + 1).and_then(|b| hex_value(*b)),
                raw.get(i + 2).and_then(|b| hex_value(*b)),
            ) {
                out.push((high << 4) | low);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

/// Splits on `;` outside quoted strings.
fn split_parameters(s: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&s[start..]);
    params.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(ch) = chars.next() {
                if ch == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(ch);
                }
            }
            out
        }
        None => value.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    mod content_type_tests {
        use super::*;

        #[test]
        fn test_content_type_parse() {
            let ct = ContentType::parse("Text/Plain; charset=utf-8").unwrap();
            assert_eq!(ct.main_type, "text");
            assert_eq!(ct.sub_type, "plain");
            assert_eq!(ct.charset(), Some("utf-8"));
            assert!(ct.is_text());
        }

        #[test]
        fn test_content_type_quoted_boundary() {
            let ct =
                ContentType::parse("multipart/mixed; boundary=\"a;b=c\"; charset=us-ascii").unwrap();
            assert!(ct.is_multipart());
            assert_eq!(ct.boundary(), Some("a;b=c"));
            assert_eq!(ct.charset(), Some("us-ascii"));
        }

        #[test]
        fn test_content_type_invalid() {
            assert!(ContentType::parse("text").is_err());
            assert!(ContentType::parse("/plain").is_err());
            assert!(ContentType::parse("").is_err());
        }

        #[test]
        fn test_content_type_display() {
            let ct = ContentType::new("multipart", "mixed").with_parameter("boundary", "a b");
            assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"a b\"");
            assert_eq!(ContentType::default().mime_type(), "text/plain");
        }

        #[test]
        fn test_empty_boundary_is_missing() {
            let ct = ContentType::parse("multipart/mixed; boundary=\"\"").unwrap();
            assert!(ct.boundary().is_none());
        }
    }

    mod disposition_tests {
        use super::*;

        #[test]
        fn test_attachment_with_filename() {
            let cd = ContentDisposition::parse("attachment; filename=\"report.pdf\"");
            assert!(cd.is_attachment());
            assert_eq!(cd.filename(), Some("report.pdf"));
        }

        #[test]
        fn test_inline_and_other() {
            assert!(ContentDisposition::parse("INLINE").is_inline());
            assert_eq!(
                ContentDisposition::parse("form-data; name=x").kind,
                DispositionKind::Other("form-data".into())
            );
        }

        #[test]
        fn test_rfc2231_extended_value() {
            let cd = ContentDisposition::parse("attachment; filename*=utf-8''na%C3%AFve%20file.txt");
            assert_eq!(cd.filename(), Some("naïve file.txt"));
        }

        #[test]
        fn test_rfc2231_continuations() {
            let cd = ContentDisposition::parse(
                "attachment; filename*0*=iso-8859-1''caf%E9; filename*1=\"-menu.txt\"",
            );
            assert_eq!(cd.filename(), Some("café-menu.txt"));
        }

        #[test]
        fn test_rfc2231_overrides_plain() {
            let cd = ContentDisposition::parse(
                "attachment; filename=\"fallback.txt\"; filename*=utf-8''real.txt",
            );
            assert_eq!(cd.filename(), Some("real.txt"));
        }

        #[test]
        fn test_rfc2047_in_parameter() {
            let cd = ContentDisposition::parse("attachment; filename=\"=?utf-8?B?w6kudHh0?=\"");
            assert_eq!(cd.filename(), Some("é.txt"));
        }

        #[test]
        fn test_escaped_quotes() {
            let cd = ContentDisposition::parse(r#"attachment; filename="say \"hi\".txt""#);
            assert_eq!(cd.filename(), Some("say \"hi\".txt"));
        }
    }
}
