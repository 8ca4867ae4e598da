//! String-format decoders used by the request decorator and response writer.
//!
//! Each decoder here is a pure function of its input: media-type parsing,
//! cookie headers, query strings, form-encoded bodies, and weak entity-tag
//! generation. Percent-decoding is delegated to [`url::form_urlencoded`].

use std::collections::HashMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// A parsed `Content-Type` value: base media type plus its parameters.
///
/// # Examples
///
/// ```
/// use nowbridge::decode::MediaType;
///
/// let mt = MediaType::parse("text/html; charset=iso-8859-1").unwrap();
/// assert_eq!(mt.essence(), "text/html");
/// assert_eq!(mt.parameter("charset"), Some("iso-8859-1"));
/// assert_eq!(mt.with_charset("utf-8").to_string(), "text/html; charset=utf-8");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    parameters: Vec<(String, String)>,
}

impl MediaType {
    /// Parses a media-type string of the form `type/subtype; key=value; ...`.
    ///
    /// Returns `None` when the base type is not a `type/subtype` pair.
    /// Parameter values may be quoted; quotes are stripped. Type and
    /// parameter keys are lowercased, parameter order is preserved.
    pub fn parse(input: &str) -> Option<Self> {
        let mut sections = input.split(';');
        let essence = sections.next()?.trim().to_ascii_lowercase();

        let (ty, subty) = essence.split_once('/')?;
        if ty.is_empty() || subty.is_empty() {
            return None;
        }

        let mut parameters = Vec::new();
        for section in sections {
            let Some((key, value)) = section.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"').to_owned();
            if !key.is_empty() {
                parameters.push((key, value));
            }
        }

        Some(Self { essence, parameters })
    }

    /// Returns the lowercased `type/subtype` pair.
    pub fn essence(&self) -> &str {
        &self.essence
    }

    /// Returns a parameter value by lowercased key.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a copy with the `charset` parameter set to `charset`,
    /// replacing an existing one and preserving every other parameter.
    pub fn with_charset(&self, charset: &str) -> Self {
        let mut out = self.clone();
        match out.parameters.iter_mut().find(|(k, _)| k == "charset") {
            Some((_, v)) => *v = charset.to_owned(),
            None => out.parameters.push(("charset".to_owned(), charset.to_owned())),
        }
        out
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.essence)?;
        for (key, value) in &self.parameters {
            write!(f, "; {key}={value}")?;
        }
        Ok(())
    }
}

/// A decoded query or form value: single occurrence or repeated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// The key appeared once.
    One(String),
    /// The key appeared multiple times; values in occurrence order.
    Many(Vec<String>),
}

impl QueryValue {
    /// Returns the first value.
    pub fn first(&self) -> &str {
        match self {
            Self::One(v) => v,
            Self::Many(vs) => vs.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Returns all values in occurrence order.
    pub fn all(&self) -> Vec<&str> {
        match self {
            Self::One(v) => vec![v.as_str()],
            Self::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::One(existing) => {
                let first = std::mem::take(existing);
                *self = Self::Many(vec![first, value]);
            }
            Self::Many(vs) => vs.push(value),
        }
    }
}

/// Decodes a `Cookie` header into a name → value map.
///
/// Pairs are `;`-separated, names and values whitespace-trimmed. A repeated
/// cookie name keeps its first occurrence, matching the convention that the
/// most relevant cookie is sent first.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        cookies
            .entry(name.to_owned())
            .or_insert_with(|| value.trim().to_owned());
    }
    cookies
}

/// Decodes the query-string section of a URL into a key → value map.
///
/// The input is the full request target; everything before the first `?` is
/// ignored, and a target without one yields an empty map. Keys and values are
/// percent-decoded; repeated keys collect into [`QueryValue::Many`].
pub fn parse_query(url: &str) -> HashMap<String, QueryValue> {
    match url.split_once('?') {
        Some((_, query)) => decode_pairs(query.as_bytes()),
        None => HashMap::new(),
    }
}

/// Decodes an `application/x-www-form-urlencoded` body.
///
/// Same decoder and output shape as [`parse_query`], so handlers see one
/// consistent representation for both sources. Iteration order over the map
/// is unspecified.
pub fn parse_form(body: &[u8]) -> HashMap<String, QueryValue> {
    decode_pairs(body)
}

fn decode_pairs(input: &[u8]) -> HashMap<String, QueryValue> {
    use std::collections::hash_map::Entry;

    let mut out: HashMap<String, QueryValue> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        if key.is_empty() {
            continue;
        }
        match out.entry(key.into_owned()) {
            Entry::Occupied(mut entry) => entry.get_mut().push(value.into_owned()),
            Entry::Vacant(entry) => {
                entry.insert(QueryValue::One(value.into_owned()));
            }
        }
    }
    out
}

/// Length of the digest section of an entity tag.
const TAG_DIGEST_LEN: usize = 27;

/// Computes a weak entity tag from byte content.
///
/// Format: `W/"<length-hex>-<digest>"` where the digest is URL-safe base64
/// (unpadded) of the SHA-256 of the content, truncated to 27 characters.
/// Equal content always yields equal tags.
///
/// # Examples
///
/// ```
/// use nowbridge::decode::entity_tag;
///
/// let tag = entity_tag(b"hello");
/// assert!(tag.starts_with("W/\"5-"));
/// assert_eq!(tag, entity_tag(b"hello"));
/// ```
pub fn entity_tag(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded.truncate(TAG_DIGEST_LEN);
    format!("W/\"{:x}-{}\"", content.len(), encoded)
}
