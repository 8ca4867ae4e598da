//! Dispatch loop — correlates an inbound connection with its buffered event
//! and runs the user handler over the decorated pair.
//!
//! Per connection: extract the reserved identifier header, strip it, resolve
//! the event through the [`EventStore`] (single consumption), decorate the
//! request/response pair, await the handler. A [`ClientError`] escaping the
//! handler becomes a bodyless error response; every other failure is fatal
//! to the process — there is no per-request recovery in this model.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::bridge::EventStore;
use crate::helpers::{BridgeRequest, BridgeResponse, ClientError, SendError};
use crate::http::{Request, Response};

/// The reserved header carrying the event identifier for a connection.
///
/// Stripped from the request before the handler runs; it is an internal
/// protocol detail, not part of the public request surface.
pub const BRIDGE_REQUEST_ID_HEADER: &str = "x-now-bridge-request-id";

/// An error escaping the user handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Recoverable: converted into a bodyless response with the carried status.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Unrecoverable: propagates as [`DispatchError::Handler`].
    #[error("{0}")]
    Fatal(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps an arbitrary error as fatal.
    pub fn fatal(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Fatal(cause.into())
    }
}

impl From<SendError> for HandlerError {
    fn from(err: SendError) -> Self {
        // Misuse of the response helpers is a programming error.
        Self::Fatal(Box::new(err))
    }
}

/// A failure of the dispatch protocol itself. Always fatal: the supervisor
/// owning process lifecycle must terminate exactly one process instance.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The reserved identifier header was missing or duplicated, or its
    /// identifier did not resolve to a pending event.
    #[error("Internal Server Error")]
    InvalidRequestId,

    /// The handler failed with a non-client error.
    #[error("handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DispatchError {
    /// The HTTP status describing this failure to the outside world.
    pub fn status(&self) -> u16 {
        500
    }
}

/// Runs one request through the bridge protocol.
///
/// The handler receives the decorated pair and returns the response it
/// ended; asynchronous handlers are awaited. The handler is never invoked
/// when identifier extraction or event resolution fails.
///
/// # Errors
///
/// [`DispatchError::InvalidRequestId`] when the reserved header is absent,
/// ambiguous, or names no pending event. [`DispatchError::Handler`] when the
/// handler fails fatally; the caller must treat this as process-ending.
pub async fn dispatch<H, F>(
    mut request: Request,
    events: &mut EventStore,
    handler: H,
) -> Result<Response, DispatchError>
where
    H: FnOnce(BridgeRequest, BridgeResponse) -> F,
    F: Future<Output = Result<BridgeResponse, HandlerError>>,
{
    let url = request.url().to_owned();

    let id = {
        let mut ids = request.headers().get_all(BRIDGE_REQUEST_ID_HEADER);
        match (ids.next(), ids.next()) {
            (Some(id), None) if !id.is_empty() => id.to_owned(),
            _ => {
                error!(url = %url, "missing or ambiguous bridge request identifier");
                return Err(DispatchError::InvalidRequestId);
            }
        }
    };
    request.headers_mut().remove(BRIDGE_REQUEST_ID_HEADER);

    let Some(event) = events.consume(&id) else {
        // Unknown and already-consumed identifiers are indistinguishable.
        error!(url = %url, id = %id, "no pending event for bridge request identifier");
        return Err(DispatchError::InvalidRequestId);
    };

    let method = request.method().clone();
    let req = BridgeRequest::new(request, event.into_payload());
    let res = BridgeResponse::new(method);

    debug!(url = %url, id = %id, "invoking handler");
    match handler(req, res).await {
        Ok(res) => Ok(res.into_response()),
        Err(HandlerError::Client(client)) => {
            warn!(
                url = %url,
                status = client.status(),
                message = client.message(),
                "handler rejected request"
            );
            Ok(Response::finished(client.status()))
        }
        Err(HandlerError::Fatal(cause)) => {
            error!(url = %url, error = %cause, "handler failed");
            Err(DispatchError::Handler(cause))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Event;
    use crate::http::{Headers, Method};

    fn bridged_request(id: Option<&str>) -> Request {
        let mut headers = Headers::new();
        if let Some(id) = id {
            headers.insert(BRIDGE_REQUEST_ID_HEADER, id);
        }
        headers.insert("Content-Type", "application/json");
        Request::from_parts(Method::Post, "/api/task", headers)
    }

    fn store_with(id: &str, payload: &'static [u8]) -> EventStore {
        let mut store = EventStore::new();
        store.enqueue(id, Event::new(payload));
        store
    }

    #[tokio::test]
    async fn handler_sees_event_payload_not_socket_body() {
        let mut events = store_with("req-1", b"{\"task\":\"build\"}");
        let response = dispatch(bridged_request(Some("req-1")), &mut events, |mut req, mut res| async move {
            let task = req.body()?.unwrap().as_json().unwrap()["task"].clone();
            res.json(&task)?;
            Ok(res)
        })
        .await
        .unwrap();
        assert_eq!(response.body().as_ref(), b"\"build\"");
    }

    #[tokio::test]
    async fn reserved_header_is_stripped_before_handler() {
        let mut events = store_with("req-1", b"");
        dispatch(bridged_request(Some("req-1")), &mut events, |req, mut res| async move {
            assert!(!req.headers().contains(BRIDGE_REQUEST_ID_HEADER));
            res.send(())?;
            Ok(res)
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn missing_identifier_never_invokes_handler() {
        let mut events = store_with("req-1", b"");
        let mut invoked = false;
        let result = dispatch(bridged_request(None), &mut events, |_req, res| {
            invoked = true;
            async move { Ok(res) }
        })
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequestId));
        assert_eq!(err.status(), 500);
        assert!(!invoked);
    }

    #[tokio::test]
    async fn duplicated_identifier_header_is_rejected() {
        let mut events = store_with("req-1", b"");
        let mut request = bridged_request(Some("req-1"));
        request.headers_mut().insert(BRIDGE_REQUEST_ID_HEADER, "req-2");
        let result = dispatch(request, &mut events, |_req, res| async move { Ok(res) }).await;
        assert!(matches!(result, Err(DispatchError::InvalidRequestId)));
        // The event was never consumed.
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn consumed_identifier_is_not_resolvable_twice() {
        let mut events = store_with("req-1", b"");
        dispatch(bridged_request(Some("req-1")), &mut events, |_req, mut res| async move {
            res.send("ok")?;
            Ok(res)
        })
        .await
        .unwrap();

        let second = dispatch(bridged_request(Some("req-1")), &mut events, |_req, res| async move {
            Ok(res)
        })
        .await;
        assert!(matches!(second, Err(DispatchError::InvalidRequestId)));
    }

    #[tokio::test]
    async fn client_error_becomes_bodyless_status_response() {
        let mut events = store_with("req-1", b"{");
        let response = dispatch(bridged_request(Some("req-1")), &mut events, |mut req, res| async move {
            req.body()?; // malformed JSON — propagates as a client error
            Ok(res)
        })
        .await
        .unwrap();
        assert_eq!(response.status_code(), 400);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn fatal_handler_error_propagates() {
        let mut events = store_with("req-1", b"");
        let result = dispatch(bridged_request(Some("req-1")), &mut events, |_req, _res| async move {
            Err(HandlerError::fatal("database gone"))
        })
        .await;
        assert!(matches!(result, Err(DispatchError::Handler(_))));
    }
}
