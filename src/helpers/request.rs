//! Request decorator — lazy `cookies`, `query` and `body` properties.
//!
//! Parsing is deferred until first access and memoized through [`Lazy`], so
//! a handler that never touches `.body()` never pays for body decoding. Each
//! property is also directly writable, letting a handler replace a parsed
//! value for downstream code.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::decode::{self, MediaType, QueryValue};
use crate::http::{Headers, Method, Request};
use crate::lazy::Lazy;

/// A recoverable, client-facing error carrying an HTTP status and message.
///
/// The only error kind a body producer raises; everything else in the
/// dispatch path is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ClientError {
    status: u16,
    message: String,
}

impl ClientError {
    /// Creates a client error with an explicit status and message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// The 400 error raised when a JSON body fails to parse.
    pub fn invalid_json() -> Self {
        Self::new(400, "Invalid JSON")
    }

    /// Returns the HTTP status to surface to the client.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the client-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A request body decoded according to its `content-type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// `application/json` — parsed JSON value; empty bodies decode to `{}`.
    Json(Value),
    /// `application/octet-stream` — the raw bytes, unmodified.
    Binary(Bytes),
    /// `application/x-www-form-urlencoded` — decoded form map.
    Form(HashMap<String, QueryValue>),
    /// `text/plain` — the UTF-8 decoded string.
    Text(String),
}

impl ParsedBody {
    /// Returns the JSON value if this is a JSON body.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the raw bytes if this is a binary body.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the form map if this is a form-encoded body.
    pub fn as_form(&self) -> Option<&HashMap<String, QueryValue>> {
        match self {
            Self::Form(f) => Some(f),
            _ => None,
        }
    }

    /// Returns the text if this is a plain-text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// The decorated inbound request: transport fields plus three lazy properties.
///
/// The payload is the event body buffered by the host, not whatever arrived
/// on the socket. Each lazy property computes on first read from state that
/// is already in memory, caches on success, and can be overwritten with the
/// matching `set_*` method.
pub struct BridgeRequest {
    method: Method,
    url: String,
    headers: Headers,
    payload: Bytes,
    cookies: Lazy<HashMap<String, String>>,
    query: Lazy<HashMap<String, QueryValue>>,
    body: Lazy<Option<ParsedBody>>,
}

impl BridgeRequest {
    /// Decorates a parsed request, substituting the bridged event payload
    /// for the socket body.
    pub fn new(request: Request, payload: Bytes) -> Self {
        let (method, url, headers, _socket_body) = request.into_parts();
        Self {
            method,
            url,
            headers,
            payload,
            cookies: Lazy::new(),
            query: Lazy::new(),
            body: Lazy::new(),
        }
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the original request target (path plus optional `?query`).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        match self.url.find('?') {
            Some(pos) => &self.url[..pos],
            None => &self.url,
        }
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw bridged payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the request cookies, decoding them on first access.
    ///
    /// Multiple `cookie` header occurrences are joined with `;` before
    /// decoding. No cookie header yields an empty map.
    pub fn cookies(&mut self) -> &HashMap<String, String> {
        let headers = &self.headers;
        self.cookies.get_or_init(|| {
            let joined = headers.get_all("cookie").collect::<Vec<_>>().join(";");
            if joined.is_empty() {
                HashMap::new()
            } else {
                decode::parse_cookies(&joined)
            }
        })
    }

    /// Returns the decoded query parameters, parsing them on first access.
    ///
    /// Repeated keys collect into [`QueryValue::Many`]. An empty url field
    /// parses as `/`.
    pub fn query(&mut self) -> &HashMap<String, QueryValue> {
        let url = &self.url;
        self.query.get_or_init(|| {
            let target = if url.is_empty() { "/" } else { url.as_str() };
            decode::parse_query(target)
        })
    }

    /// Returns the parsed body, decoding it on first access.
    ///
    /// `None` means there is no `content-type` header or the media type is
    /// unsupported — neither is an error. The raw bytes always remain
    /// available through [`payload`](Self::payload).
    ///
    /// # Errors
    ///
    /// [`ClientError`] with status 400 and message `Invalid JSON` when a
    /// JSON body fails to parse. The failure is not cached; a later read
    /// retries.
    pub fn body(&mut self) -> Result<Option<&ParsedBody>, ClientError> {
        let headers = &self.headers;
        let payload = &self.payload;
        self.body
            .get_or_try_init(|| produce_body(headers, payload))
            .map(Option::as_ref)
    }

    /// Replaces the cookie map, bypassing the producer.
    pub fn set_cookies(&mut self, cookies: HashMap<String, String>) {
        self.cookies.set(cookies);
    }

    /// Replaces the query map, bypassing the producer.
    pub fn set_query(&mut self, query: HashMap<String, QueryValue>) {
        self.query.set(query);
    }

    /// Replaces the parsed body, bypassing the producer.
    pub fn set_body(&mut self, body: Option<ParsedBody>) {
        self.body.set(body);
    }
}

/// Decodes the payload according to the `content-type` header.
fn produce_body(headers: &Headers, payload: &Bytes) -> Result<Option<ParsedBody>, ClientError> {
    let Some(raw_type) = headers.get("content-type") else {
        return Ok(None);
    };
    let Some(media) = MediaType::parse(raw_type) else {
        return Ok(None);
    };

    let parsed = match media.essence() {
        "application/json" => {
            let text = String::from_utf8_lossy(payload);
            let value = if text.is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(&text).map_err(|_| ClientError::invalid_json())?
            };
            ParsedBody::Json(value)
        }
        "application/octet-stream" => ParsedBody::Binary(payload.clone()),
        "application/x-www-form-urlencoded" => ParsedBody::Form(decode::parse_form(payload)),
        "text/plain" => ParsedBody::Text(String::from_utf8_lossy(payload).into_owned()),
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}
