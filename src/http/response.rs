//! HTTP/1.1 response transport primitive.
//!
//! Holds mutable status and header state, enforces the single terminal
//! [`end`](Response::end) write, and serializes the finished response to a
//! byte buffer for transmission over TCP.
//!
//! This type writes exactly the headers it is given — `Content-Length`,
//! `Content-Type` and friends are owned by the response writer layer, which
//! must be able to omit them entirely (204/304 responses forbid a body).

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Headers, canonical_reason};

/// Errors from the response lifecycle.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response has already been ended")]
    AlreadyEnded,
}

/// An outbound HTTP/1.1 response.
///
/// Starts open with status 200 and no headers. Exactly one call to
/// [`end`](Self::end) completes it; afterwards the response is immutable and
/// ready for [`into_bytes`](Self::into_bytes).
///
/// # Examples
///
/// ```
/// use nowbridge::http::Response;
///
/// let mut response = Response::new();
/// response.set_status(200);
/// response.headers_mut().set("Content-Type", "text/plain");
/// response.end(&b"hi"[..]).unwrap();
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.ends_with("\r\n\r\nhi"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Bytes,
    ended: bool,
}

impl Response {
    /// Creates a new open response with status 200 and an empty header set.
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            body: Bytes::new(),
            ended: false,
        }
    }

    /// Creates an already-ended, bodyless response with the given status.
    ///
    /// Used by the error-sending path, where only the status line matters.
    pub fn finished(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            ended: true,
        }
    }

    /// Returns the current status code.
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Sets the status code. Pure mutation, no I/O.
    pub fn set_status(&mut self, code: u16) {
        self.status = code;
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response headers mutably.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns `true` once the terminal write has happened.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Returns the body chunk written by [`end`](Self::end).
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Performs the terminal write: stores the final body chunk and closes
    /// the response.
    ///
    /// # Errors
    ///
    /// [`ResponseError::AlreadyEnded`] if the response was ended before.
    pub fn end(&mut self, chunk: impl Into<Bytes>) -> Result<(), ResponseError> {
        if self.ended {
            return Err(ResponseError::AlreadyEnded);
        }
        self.body = chunk.into();
        self.ended = true;
        Ok(())
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// The status line uses [`canonical_reason`]; headers are written in
    /// insertion order with no additions or omissions.
    pub fn into_bytes(self) -> BytesMut {
        let estimated_size = 64 + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(format!("HTTP/1.1 {} {}\r\n", self.status, canonical_reason(self.status)).as_bytes());

        // Headers
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_ref());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let mut r = Response::new();
        r.headers_mut().set("Content-Length", "5");
        r.end(&b"Hello"[..]).unwrap();
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn status_line_uses_reason_phrase() {
        let mut r = Response::new();
        r.set_status(404);
        r.end(Bytes::new()).unwrap();
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn no_automatic_headers() {
        let mut r = Response::new();
        r.set_status(204);
        r.end(Bytes::new()).unwrap();
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Length"));
        assert!(!s.contains("Content-Type"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn second_end_is_rejected() {
        let mut r = Response::new();
        r.end(&b"one"[..]).unwrap();
        assert!(matches!(r.end(&b"two"[..]), Err(ResponseError::AlreadyEnded)));
        assert_eq!(r.body().as_ref(), b"one");
    }
}
