//! RFC 5322 address lists.

use std::fmt;

use crate::encoding::decode_rfc2047;

/// A single mailbox from an address header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    /// Display name, decoded.
    pub name: Option<String>,
    /// `local@domain`.
    pub email: String,
}

impl Address {
    /// Creates an address without a display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parses one `Name <local@domain>` or bare `local@domain` entry.
    #[must_use]
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = strip_comments(entry);
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }

        if let (Some(open), Some(close)) = (entry.rfind('<'), entry.rfind('>')) {
            if open < close {
                let email = entry[open + 1..close].trim();
                if email.is_empty() {
                    return None;
                }
                let name = unquote(entry[..open].trim());
                let name = (!name.is_empty()).then(|| decode_rfc2047(&name));
                return Some(Self {
                    name,
                    email: email.to_string(),
                });
            }
        }

        entry
            .contains('@')
            .then(|| Self::new(entry.trim_matches(|c| c == '<' || c == '>')))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => f.write_str(&self.email),
        }
    }
}

/// Parses an address list such as a `To` or `Cc` value.
///
/// Groups (`team: a@x, b@x;`) are flattened into their members and entries
/// that are not addresses are skipped.
#[must_use]
pub fn parse_address_list(value: &str) -> Vec<Address> {
    split_top_level(value)
        .into_iter()
        .filter_map(|entry| {
            // Drop a group label: `team: a@x`
            let entry = match top_level_colon(entry) {
                Some(colon) => &entry[colon + 1..],
                None => entry,
            };
            Address::parse(entry)
        })
        .collect()
}

/// Splits on `,` and `;` outside quotes, angle brackets and comments.
fn split_top_level(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut angle = 0usize;
    let mut paren = 0usize;
    let mut start = 0;

    for (i, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => angle += 1,
            '>' if !in_quotes => angle = angle.saturating_sub(1),
            '(' if !in_quotes => paren += 1,
            ')' if !in_quotes => paren = paren.saturating_sub(1),
            ',' | ';' if !in_quotes && angle == 0 && paren == 0 => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

fn top_level_colon(entry: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, ch) in entry.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '<' | '@' if !in_quotes => return None,
            ':' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn strip_comments(entry: &str) -> String {
    let mut out = String::with_capacity(entry.len());
    let mut depth = 0usize;
    let mut in_quotes = false;
    for ch in entry.chars() {
        match ch {
            '"' if depth == 0 => {
                in_quotes = !in_quotes;
                out.push(ch);
            }
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

fn unquote(name: &str) -> String {
    let name = name.trim();
    name.strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .map_or_else(|| name.to_string(), |n| n.replace("\\\"", "\"").replace("\\\\", "\\"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_address() {
        let list = parse_address_list("ann@example.com");
        assert_eq!(list, vec![Address::new("ann@example.com")]);
    }

    #[test]
    fn test_named_addresses() {
        let list = parse_address_list("\"Doe, Jane\" <jane@example.com>, Bob <bob@example.com>");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name.as_deref(), Some("Doe, Jane"));
        assert_eq!(list[0].email, "jane@example.com");
        assert_eq!(list[1].to_string(), "Bob <bob@example.com>");
    }

    #[test]
    fn test_encoded_display_name() {
        let list = parse_address_list("=?utf-8?Q?Ren=C3=A9?= <rene@example.com>");
        assert_eq!(list[0].name.as_deref(), Some("René"));
    }

    #[test]
    fn test_group_and_comments() {
        let list = parse_address_list("team: a@example.com (Ann), b@example.com;");
        assert_eq!(
            list,
            vec![Address::new("a@example.com"), Address::new("b@example.com")]
        );
        assert!(parse_address_list("undisclosed-recipients:;").is_empty());
    }
}
