//! Response writer — chained `status` / `send` / `json` / `redirect` helpers.
//!
//! Owns the serialization algorithm: content-type defaulting, charset
//! rewriting, `Content-Length` and `ETag` computation, the 204/304 header
//! strip, and the HEAD short-circuit. Exactly one terminal write completes
//! the response.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::decode::{self, MediaType};
use crate::http::{Method, Response, response::ResponseError};

/// Errors from the response helpers. These are programming errors surfaced
/// to the caller, never converted into HTTP error responses.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("response has already been ended")]
    AlreadyEnded,

    #[error("redirect requires a status code and a URL, got status {status} and url {url:?}")]
    InvalidRedirect { status: u16, url: String },

    #[error("failed to serialize body as JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ResponseError> for SendError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::AlreadyEnded => Self::AlreadyEnded,
        }
    }
}

/// The closed set of body categories [`BridgeResponse::send`] accepts.
///
/// Scalars (booleans, numbers) and structured values enter as [`Value`]
/// and are routed through the JSON path; they are not independently
/// serializable as a raw body.
///
/// [`Value`]: Body::Value
#[derive(Debug, Clone)]
pub enum Body {
    /// A textual body, transmitted as UTF-8.
    Text(String),
    /// A raw byte body.
    Binary(Bytes),
    /// A JSON-serializable value; delegated to the `json` path.
    Value(serde_json::Value),
    /// The null body; normalized to the empty string.
    Empty,
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Self::Binary(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(b))
    }
}

impl From<&[u8]> for Body {
    fn from(b: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(b))
    }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self {
        Self::Value(v)
    }
}

impl From<bool> for Body {
    fn from(v: bool) -> Self {
        Self::Value(serde_json::Value::Bool(v))
    }
}

impl From<i64> for Body {
    fn from(v: i64) -> Self {
        Self::Value(serde_json::Value::from(v))
    }
}

impl From<f64> for Body {
    fn from(v: f64) -> Self {
        Self::Value(serde_json::Value::from(v))
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

/// The decorated outbound response.
///
/// Wraps the transport [`Response`] together with the request method, which
/// the send path needs for the HEAD short-circuit.
///
/// # Examples
///
/// ```
/// use nowbridge::helpers::BridgeResponse;
/// use nowbridge::http::Method;
///
/// let mut res = BridgeResponse::new(Method::Get);
/// res.status(201).send("created").unwrap();
///
/// let response = res.into_response();
/// assert_eq!(response.status_code(), 201);
/// assert_eq!(
///     response.headers().get("content-type"),
///     Some("text/html; charset=utf-8"),
/// );
/// ```
pub struct BridgeResponse {
    res: Response,
    method: Method,
}

impl BridgeResponse {
    /// Creates a fresh decorated response for a request with the given method.
    pub fn new(method: Method) -> Self {
        Self {
            res: Response::new(),
            method,
        }
    }

    /// Sets the status code and returns `self` for chaining. Pure mutation.
    pub fn status(&mut self, code: u16) -> &mut Self {
        self.res.set_status(code);
        self
    }

    /// Returns the current status code.
    pub fn status_code(&self) -> u16 {
        self.res.status_code()
    }

    /// Returns the underlying response headers.
    pub fn headers(&self) -> &crate::http::Headers {
        self.res.headers()
    }

    /// Returns the underlying response headers mutably.
    pub fn headers_mut(&mut self) -> &mut crate::http::Headers {
        self.res.headers_mut()
    }

    /// Returns `true` once a terminal helper has completed the response.
    pub fn is_ended(&self) -> bool {
        self.res.is_ended()
    }

    /// Serializes and writes the body, then ends the response.
    ///
    /// Branches on the body category:
    /// - text → `content-type` defaults to `text/html`, transmission is
    ///   forced to UTF-8 and any present `content-type` is rewritten to carry
    ///   `charset=utf-8` (essence and other parameters preserved);
    /// - null → normalized to the empty string, then the text path;
    /// - bytes → `content-type` defaults to `application/octet-stream`, no
    ///   charset rewriting;
    /// - scalar or structured value → delegates entirely to [`json`](Self::json).
    ///
    /// `Content-Length` is set to the byte length of the final chunk. A weak
    /// `ETag` is computed from the chunk unless one is already set. Status
    /// 204 and 304 strip `content-type`, `content-length` and
    /// `transfer-encoding` and force an empty body. HEAD requests get
    /// headers only.
    ///
    /// # Errors
    ///
    /// [`SendError::AlreadyEnded`] after a terminal write;
    /// [`SendError::Serialize`] from the delegated JSON path.
    pub fn send(&mut self, body: impl Into<Body>) -> Result<(), SendError> {
        if self.res.is_ended() {
            return Err(SendError::AlreadyEnded);
        }

        match body.into() {
            Body::Value(value) => self.json(&value),
            Body::Text(text) => self.send_as_text(text),
            // The null body is normalized to the empty string.
            Body::Empty => self.send_as_text(String::new()),
            Body::Binary(bytes) => {
                if !self.res.headers().contains("content-type") {
                    self.res
                        .headers_mut()
                        .set("Content-Type", "application/octet-stream");
                }
                self.finish(bytes)
            }
        }
    }

    /// String-body branch of `send`: default the content type, then the
    /// shared text path.
    fn send_as_text(&mut self, text: String) -> Result<(), SendError> {
        if !self.res.headers().contains("content-type") {
            self.res.headers_mut().set("Content-Type", "text/html");
        }
        self.send_text(text)
    }

    /// Serializes `value` with [`serde_json`] and sends it as the body.
    ///
    /// `content-type` defaults to `application/json; charset=utf-8` when
    /// unset. Strictly a specialization of [`send`](Self::send): the
    /// serialized string flows through the same text path, including ETag
    /// and length computation.
    ///
    /// # Errors
    ///
    /// [`SendError::Serialize`] if serialization fails,
    /// [`SendError::AlreadyEnded`] after a terminal write.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SendError> {
        if self.res.is_ended() {
            return Err(SendError::AlreadyEnded);
        }
        let text = serde_json::to_string(value)?;
        if !self.res.headers().contains("content-type") {
            self.res
                .headers_mut()
                .set("Content-Type", "application/json; charset=utf-8");
        }
        self.send(Body::Text(text))
    }

    /// Redirects with status 307 (temporary redirect).
    ///
    /// See [`redirect_with`](Self::redirect_with).
    pub fn redirect(&mut self, url: &str) -> Result<(), SendError> {
        self.redirect_with(307, url)
    }

    /// Sets the status and `Location` header, then ends the response with no
    /// body. A terminal operation, not chainable with body-writing calls.
    ///
    /// # Errors
    ///
    /// [`SendError::InvalidRedirect`] when the pair is not a usable status
    /// code (100–599) and non-empty URL — a programming error, not an HTTP
    /// error. [`SendError::AlreadyEnded`] after a terminal write.
    pub fn redirect_with(&mut self, status: u16, url: &str) -> Result<(), SendError> {
        if self.res.is_ended() {
            return Err(SendError::AlreadyEnded);
        }
        if !(100..=599).contains(&status) || url.is_empty() {
            return Err(SendError::InvalidRedirect {
                status,
                url: url.to_owned(),
            });
        }
        self.res.set_status(status);
        self.res.headers_mut().set("Location", url);
        self.res.end(Bytes::new())?;
        Ok(())
    }

    /// Consumes the wrapper, returning the completed transport response.
    pub fn into_response(self) -> Response {
        self.res
    }

    /// Text path: force UTF-8 transmission, rewriting a present
    /// `content-type` to carry `charset=utf-8`.
    fn send_text(&mut self, text: String) -> Result<(), SendError> {
        let rewritten = self
            .res
            .headers()
            .get("content-type")
            .and_then(MediaType::parse)
            .map(|media| media.with_charset("utf-8").to_string());
        if let Some(rewritten) = rewritten {
            self.res.headers_mut().set("Content-Type", rewritten);
        }
        // Rust strings are UTF-8 already, so the byte length and the wire
        // encoding fall out of the same buffer.
        self.finish(Bytes::from(text))
    }

    /// Shared tail of the send path: length, entity tag, status-driven
    /// header strip, HEAD short-circuit, terminal write.
    fn finish(&mut self, chunk: Bytes) -> Result<(), SendError> {
        self.res
            .headers_mut()
            .set("Content-Length", chunk.len().to_string());

        if !self.res.headers().contains("etag") {
            let tag = decode::entity_tag(&chunk);
            if !tag.is_empty() {
                self.res.headers_mut().set("ETag", tag);
            }
        }

        // 204 and 304 forbid a body per HTTP semantics.
        let status = self.res.status_code();
        let chunk = if status == 204 || status == 304 {
            let headers = self.res.headers_mut();
            headers.remove("content-type");
            headers.remove("content-length");
            headers.remove("transfer-encoding");
            Bytes::new()
        } else {
            chunk
        };

        if self.method == Method::Head {
            self.res.end(Bytes::new())?;
        } else {
            self.res.end(chunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(method: Method) -> BridgeResponse {
        BridgeResponse::new(method)
    }

    #[test]
    fn send_text_defaults_content_type_and_length() {
        let mut res = response(Method::Get);
        res.send("x").unwrap();
        let res = res.into_response();
        assert_eq!(
            res.headers().get("content-type"),
            Some("text/html; charset=utf-8")
        );
        assert_eq!(res.headers().get("content-length"), Some("1"));
        assert_eq!(res.body().as_ref(), b"x");
    }

    #[test]
    fn send_text_length_is_utf8_byte_length() {
        let mut res = response(Method::Get);
        res.send("héllo").unwrap(); // é is two bytes in UTF-8
        let res = res.into_response();
        assert_eq!(res.headers().get("content-length"), Some("6"));
    }

    #[test]
    fn send_preserves_existing_media_type_on_charset_rewrite() {
        let mut res = response(Method::Get);
        res.headers_mut()
            .set("Content-Type", "text/markdown; charset=iso-8859-1; variant=gfm");
        res.send("# hi").unwrap();
        let res = res.into_response();
        assert_eq!(
            res.headers().get("content-type"),
            Some("text/markdown; charset=utf-8; variant=gfm")
        );
    }

    #[test]
    fn send_bytes_defaults_octet_stream_without_charset() {
        let mut res = response(Method::Get);
        res.send(Bytes::from_static(&[1, 2, 3])).unwrap();
        let res = res.into_response();
        assert_eq!(
            res.headers().get("content-type"),
            Some("application/octet-stream")
        );
        assert_eq!(res.headers().get("content-length"), Some("3"));
        assert_eq!(res.body().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn send_null_equals_send_empty_string() {
        let mut a = response(Method::Get);
        a.send(()).unwrap();
        let a = a.into_response();

        let mut b = response(Method::Get);
        b.send("").unwrap();
        let b = b.into_response();

        assert_eq!(a.headers().get("content-type"), b.headers().get("content-type"));
        assert_eq!(a.headers().get("content-length"), b.headers().get("content-length"));
        assert_eq!(a.headers().get("etag"), b.headers().get("etag"));
        assert_eq!(a.body(), b.body());
    }

    #[test]
    fn send_scalars_take_the_json_path() {
        let mut res = response(Method::Get);
        res.send(true).unwrap();
        let res = res.into_response();
        assert_eq!(
            res.headers().get("content-type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(res.body().as_ref(), b"true");
    }

    #[test]
    fn send_value_delegates_to_json() {
        let mut res = response(Method::Get);
        res.send(json!({"a": 1})).unwrap();
        let res = res.into_response();
        assert_eq!(
            res.headers().get("content-type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(res.body().as_ref(), b"{\"a\":1}");
    }

    #[test]
    fn json_sets_etag_and_body() {
        let mut res = response(Method::Get);
        res.json(&json!({"a": 1})).unwrap();
        let res = res.into_response();
        assert_eq!(res.body().as_ref(), b"{\"a\":1}");
        let etag = res.headers().get("etag").unwrap();
        assert!(!etag.is_empty());
        assert!(etag.starts_with("W/\""));
    }

    #[test]
    fn preset_etag_is_not_overwritten() {
        let mut res = response(Method::Get);
        res.headers_mut().set("ETag", "W/\"preset\"");
        res.send("body").unwrap();
        let res = res.into_response();
        assert_eq!(res.headers().get("etag"), Some("W/\"preset\""));
    }

    #[test]
    fn status_204_strips_entity_headers_and_body() {
        let mut res = response(Method::Get);
        res.status(204).send("ignored").unwrap();
        let res = res.into_response();
        assert_eq!(res.status_code(), 204);
        assert!(!res.headers().contains("content-type"));
        assert!(!res.headers().contains("content-length"));
        assert!(!res.headers().contains("transfer-encoding"));
        assert!(res.body().is_empty());
    }

    #[test]
    fn status_304_strips_entity_headers_and_body() {
        let mut res = response(Method::Get);
        res.status(304).send("ignored").unwrap();
        let res = res.into_response();
        assert!(!res.headers().contains("content-length"));
        assert!(res.body().is_empty());
    }

    #[test]
    fn head_request_gets_headers_only() {
        let mut res = response(Method::Head);
        res.send("hidden").unwrap();
        let res = res.into_response();
        assert_eq!(res.headers().get("content-length"), Some("6"));
        assert!(res.body().is_empty());
    }

    #[test]
    fn redirect_defaults_to_307() {
        let mut res = response(Method::Get);
        res.redirect("/next").unwrap();
        let res = res.into_response();
        assert_eq!(res.status_code(), 307);
        assert_eq!(res.headers().get("location"), Some("/next"));
        assert!(res.is_ended());
        assert!(res.body().is_empty());
    }

    #[test]
    fn redirect_with_explicit_status() {
        let mut res = response(Method::Get);
        res.redirect_with(302, "/x").unwrap();
        let res = res.into_response();
        assert_eq!(res.status_code(), 302);
        assert_eq!(res.headers().get("location"), Some("/x"));
    }

    #[test]
    fn redirect_rejects_malformed_arguments() {
        let mut res = response(Method::Get);
        assert!(matches!(
            res.redirect_with(302, ""),
            Err(SendError::InvalidRedirect { .. })
        ));
        assert!(matches!(
            res.redirect_with(0, "/x"),
            Err(SendError::InvalidRedirect { .. })
        ));
        assert!(!res.is_ended());
    }

    #[test]
    fn send_after_end_is_rejected() {
        let mut res = response(Method::Get);
        res.send("first").unwrap();
        assert!(matches!(res.send("second"), Err(SendError::AlreadyEnded)));
    }

    #[test]
    fn redirect_after_end_is_rejected() {
        let mut res = response(Method::Get);
        res.send("done").unwrap();
        assert!(matches!(
            res.redirect("/x"),
            Err(SendError::AlreadyEnded)
        ));
    }

    #[test]
    fn status_is_chainable() {
        let mut res = response(Method::Get);
        res.status(418).send("teapot").unwrap();
        assert_eq!(res.status_code(), 418);
    }

    #[test]
    fn identical_bodies_share_an_etag() {
        let mut a = response(Method::Get);
        a.send("same").unwrap();
        let mut b = response(Method::Get);
        b.send("same").unwrap();
        assert_eq!(
            a.into_response().headers().get("etag"),
            b.into_response().headers().get("etag")
        );
    }
}
