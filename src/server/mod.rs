//! Async TCP runner using Tokio, specialized to the bridge execution model:
//! one process instance services one connection, and an unrecoverable
//! dispatch failure terminates the process.

use std::future::Future;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use crate::bridge::EventStore;
use crate::dispatch::{HandlerError, dispatch};
use crate::helpers::{BridgeRequest, BridgeResponse};
use crate::http::{Request, Response, request::RequestError};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection closed before a complete request was received")]
    ConnectionClosed,
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The nowbridge connection runner.
///
/// Binds to a TCP address and services exactly one bridged request per call
/// to [`serve`](Self::serve) — the execution model assumes a single active
/// request per process lifetime, so there is no accept loop and no shared
/// handler state.
///
/// # Examples
///
/// ```rust,no_run
/// use nowbridge::bridge::EventStore;
/// use nowbridge::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     let events = EventStore::new();
///     server.serve(events, |_req, mut res| async move {
///         res.send("Hello, World!")?;
///         Ok(res)
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts a single connection and runs its request through the bridge
    /// dispatch protocol.
    ///
    /// A dispatch failure — missing identifier, unresolved event, fatal
    /// handler error — is logged with full detail and terminates the process
    /// with exit code 1 after a best-effort 500 write; there is no
    /// per-request recovery in this execution model. Malformed or oversized
    /// requests get a plain 4xx response without involving the handler.
    ///
    /// # Errors
    ///
    /// [`ServerError::Io`] for socket failures,
    /// [`ServerError::ConnectionClosed`] if the peer hangs up before a full
    /// request arrives.
    pub async fn serve<H, F>(self, mut events: EventStore, handler: H) -> Result<(), ServerError>
    where
        H: FnOnce(BridgeRequest, BridgeResponse) -> F,
        F: Future<Output = Result<BridgeResponse, HandlerError>>,
    {
        let (stream, peer_addr) = self.listener.accept().await?;
        debug!(peer = %peer_addr, "connection accepted");
        handle_connection(stream, peer_addr, &mut events, handler).await
    }
}

/// Reads one full request from the stream, dispatches it, writes the reply.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    events: &mut EventStore,
    handler: H,
) -> Result<(), ServerError>
where
    H: FnOnce(BridgeRequest, BridgeResponse) -> F,
    F: Future<Output = Result<BridgeResponse, HandlerError>>,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    let request = loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            return Err(ServerError::ConnectionClosed);
        }

        // Guard against excessively large requests.
        if buf.len() > MAX_REQUEST_SIZE {
            let e = RequestError::BodyTooLarge {
                max_bytes: MAX_REQUEST_SIZE,
            };
            warn!(peer = %peer_addr, error = %e, "request too large — sending 413");
            write_plain(&mut stream, 413, &e.to_string()).await?;
            return Ok(());
        }

        // Attempt to parse the buffered data as an HTTP request.
        match Request::parse(&buf) {
            Ok((request, body_offset)) => {
                // Wait for the full socket body to arrive if Content-Length is
                // set; the bridged payload still comes from the event store.
                let total_needed = body_offset + request.content_length().unwrap_or(0);
                if buf.len() < total_needed {
                    continue;
                }
                break request;
            }
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received — read more data.
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                write_plain(&mut stream, 400, &format!("Bad Request: {e}")).await?;
                return Ok(());
            }
        }
    };

    debug!(
        peer = %peer_addr,
        method = %request.method(),
        url = %request.url(),
        "dispatching bridged request"
    );

    match dispatch(request, events, handler).await {
        Ok(response) => {
            stream.write_all(&response.into_bytes()).await?;
            stream.flush().await?;
            Ok(())
        }
        Err(e) => {
            // No request isolation: a corrupted bridge state cannot be safely
            // continued, so this process instance ends here.
            error!(peer = %peer_addr, error = %e, "dispatch failed — terminating process");
            let response = Response::finished(e.status());
            let _ = stream.write_all(&response.into_bytes()).await;
            let _ = stream.flush().await;
            std::process::exit(1);
        }
    }
}

/// Writes a minimal plain-text response outside the dispatch path.
async fn write_plain(stream: &mut TcpStream, status: u16, text: &str) -> Result<(), ServerError> {
    let mut response = Response::new();
    response.set_status(status);
    response
        .headers_mut()
        .set("Content-Type", "text/plain; charset=utf-8");
    response
        .headers_mut()
        .set("Content-Length", text.len().to_string());
    if response.end(Bytes::copy_from_slice(text.as_bytes())).is_ok() {
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_request_is_rejected_with_413() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let events = EventStore::new();
        let task = tokio::spawn(async move {
            server
                .serve(events, |_req, res| async move { Ok(res) })
                .await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        // All token bytes, so the parser stays incomplete until the size
        // guard trips.
        let oversized = vec![b'a'; MAX_REQUEST_SIZE + 1];
        client.write_all(&oversized).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        let text = String::from_utf8_lossy(&reply);
        assert!(text.starts_with("HTTP/1.1 413"), "got: {text}");
        assert!(text.contains("exceeds maximum allowed size"));

        task.await.unwrap().unwrap();
    }
}
