//! Composite key codec
//!
//! Every logical collection lives in one shared ordered keyspace. A physical
//! engine key has the shape:
//!
//! ```text
//! <tag>:<namespace>:<escaped-key>[:<escaped-field>]
//! ```
//!
//! The tag selects one of the six collection shapes (plus the two reserved
//! timer ranges), the namespace is an integer subspace, and key/field are
//! escaped so user data containing the delimiter can never collide with it.
//!
//! ## Invariants
//! - `unescape(escape(s)) == s` for every string, empty and delimiter-laden
//!   strings included
//! - tag + namespace + key fully determine which logical collection a raw
//!   engine key belongs to; scans must re-validate the decoded prefix before
//!   accepting a row, because an ordered keyspace physically interleaves all
//!   tags and namespaces around lexicographic boundaries

use crate::error::{Result, StoreError};

/// The key delimiter
pub const DELIMITER: char = ':';

/// The escape character used to protect delimiters inside user data
const ESCAPE: char = '\\';

/// Type tag of a composite key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Scalar value
    Key,
    /// Single-field hash member
    Map,
    /// Multi-field map member
    MultiMap,
    /// Ordered list (one value per list)
    List,
    /// Vector (one value per vector)
    Vector,
    /// Geo point
    Geo,
    /// Reserved: durable mirror of a scheduled expiration
    Expire,
    /// Reserved: durable mirror of a scheduled promotion
    Future,
}

impl Tag {
    /// Single-letter wire form of the tag
    pub fn letter(self) -> char {
        match self {
            Tag::Key => 'k',
            Tag::Map => 'm',
            Tag::MultiMap => 'u',
            Tag::List => 'l',
            Tag::Vector => 'v',
            Tag::Geo => 'g',
            Tag::Expire => 'e',
            Tag::Future => 'f',
        }
    }

    /// Parse a tag letter
    pub fn from_letter(letter: char) -> Option<Tag> {
        match letter {
            'k' => Some(Tag::Key),
            'm' => Some(Tag::Map),
            'u' => Some(Tag::MultiMap),
            'l' => Some(Tag::List),
            'v' => Some(Tag::Vector),
            'g' => Some(Tag::Geo),
            'e' => Some(Tag::Expire),
            'f' => Some(Tag::Future),
            _ => None,
        }
    }

    /// True for the shapes stored as many prefixed rows (one per field)
    pub fn is_prefixed_shape(self) -> bool {
        matches!(self, Tag::Map | Tag::MultiMap)
    }
}

/// A decoded composite key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub tag: Tag,
    pub namespace: u32,
    pub key: String,
    pub field: Option<String>,
}

// =============================================================================
// Escaping
// =============================================================================

/// Escape user data so it can sit between delimiters.
///
/// `\` becomes `\\` and `:` becomes `\:`.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == ESCAPE || ch == DELIMITER {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
    out
}

/// Inverse of [`escape`]
pub fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch == ESCAPE {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Split on unescaped delimiters, leaving segments escaped.
///
/// `limit` caps the number of segments; the final segment keeps any remaining
/// delimiters (escaped or not).
pub fn split_escaped(input: &str, limit: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let bytes = input.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ESCAPE as u8 {
            i += 2;
            continue;
        }
        if bytes[i] == DELIMITER as u8 {
            if parts.len() + 1 == limit {
                break;
            }
            parts.push(&input[start..i]);
            start = i + 1;
        }
        i += 1;
    }
    parts.push(&input[start..]);
    parts
}

// =============================================================================
// Encoding / Decoding
// =============================================================================

/// Build a full composite key
pub fn encode(tag: Tag, namespace: u32, key: &str, field: Option<&str>) -> Vec<u8> {
    let mut out = String::with_capacity(key.len() + 8);
    out.push(tag.letter());
    out.push(DELIMITER);
    out.push_str(&namespace.to_string());
    out.push(DELIMITER);
    out.push_str(&escape(key));
    if let Some(field) = field {
        out.push(DELIMITER);
        out.push_str(&escape(field));
    }
    out.into_bytes()
}

/// Prefix covering every key of one tag in one namespace: `t:ns:`
pub fn tag_prefix(tag: Tag, namespace: u32) -> Vec<u8> {
    let mut out = String::with_capacity(8);
    out.push(tag.letter());
    out.push(DELIMITER);
    out.push_str(&namespace.to_string());
    out.push(DELIMITER);
    out.into_bytes()
}

/// Prefix covering every key of one tag across all namespaces: `t:`
pub fn bare_tag_prefix(tag: Tag) -> Vec<u8> {
    let mut out = String::with_capacity(2);
    out.push(tag.letter());
    out.push(DELIMITER);
    out.into_bytes()
}

/// Prefix covering every field row of one hash/multimap: `t:ns:key:`
pub fn field_prefix(tag: Tag, namespace: u32, key: &str) -> Vec<u8> {
    let mut out = encode(tag, namespace, key, None);
    out.push(DELIMITER as u8);
    out
}

/// Parse a raw engine key back into its parts.
///
/// Fails with `MalformedKey` when the prefix cannot be parsed into a known
/// tag and namespace.
pub fn decode(raw: &[u8]) -> Result<Parsed> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| StoreError::MalformedKey("key is not valid UTF-8".into()))?;

    let parts = split_escaped(text, 4);
    if parts.len() < 3 {
        return Err(StoreError::MalformedKey(format!(
            "expected at least 3 segments, got {}",
            parts.len()
        )));
    }

    let tag = parts[0]
        .chars()
        .next()
        .filter(|_| parts[0].len() == 1)
        .and_then(Tag::from_letter)
        .ok_or_else(|| StoreError::MalformedKey(format!("unknown tag {:?}", parts[0])))?;

    let namespace: u32 = parts[1]
        .parse()
        .map_err(|_| StoreError::MalformedKey(format!("bad namespace {:?}", parts[1])))?;

    Ok(Parsed {
        tag,
        namespace,
        key: unescape(parts[2]),
        field: parts.get(3).map(|f| unescape(f)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_roundtrip() {
        for raw in ["", "plain", "a:b", "::::", "back\\slash", "mix\\:ed:", ":"] {
            assert_eq!(unescape(&escape(raw)), raw, "raw = {raw:?}");
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let cases = [
            (Tag::Key, 1, "user", None),
            (Tag::Map, 42, "colo:ns", Some("fie:ld")),
            (Tag::MultiMap, 100, "", Some("")),
            (Tag::List, 7, "a\\b:c", None),
            (Tag::Future, 3, "staged", None),
        ];
        for (tag, ns, key, field) in cases {
            let raw = encode(tag, ns, key, field);
            let parsed = decode(&raw).unwrap();
            assert_eq!(parsed.tag, tag);
            assert_eq!(parsed.namespace, ns);
            assert_eq!(parsed.key, key);
            assert_eq!(parsed.field.as_deref(), field);
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"zz").is_err());
        assert!(decode(b"x:1:key").is_err());
        assert!(decode(b"k:notanumber:key").is_err());
    }

    #[test]
    fn field_prefix_covers_fields_only() {
        let prefix = field_prefix(Tag::Map, 1, "hash");
        let row = encode(Tag::Map, 1, "hash", Some("field"));
        let other = encode(Tag::Map, 1, "hash2", Some("field"));
        assert!(row.starts_with(&prefix));
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn escaped_delimiter_does_not_split() {
        let raw = encode(Tag::Key, 1, "a:b", None);
        let parsed = decode(&raw).unwrap();
        assert_eq!(parsed.key, "a:b");
        assert_eq!(parsed.field, None);
    }
}
