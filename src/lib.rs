//! # nowbridge
//!
//! Framework-style request/response helpers over a bare HTTP connection.
//!
//! A host buffers each request's body as an event keyed by an opaque
//! identifier. When the connection arrives, the dispatch loop resolves the
//! event through the reserved `x-now-bridge-request-id` header, decorates
//! the request with lazily-parsed `cookies` / `query` / `body` properties,
//! and hands the pair to a handler that replies through chained
//! `status` / `send` / `json` / `redirect` helpers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nowbridge::bridge::{Event, EventStore};
//! use nowbridge::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut events = EventStore::new();
//!     events.enqueue("req-1", Event::new(&b"{\"name\":\"world\"}"[..]));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.serve(events, |mut req, mut res| async move {
//!         let name = req.body()?.and_then(|b| b.as_json().cloned());
//!         res.json(&name)?;
//!         Ok(res)
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod decode;
pub mod dispatch;
pub mod helpers;
pub mod http;
pub mod lazy;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use bridge::{Event, EventStore};
pub use dispatch::{BRIDGE_REQUEST_ID_HEADER, DispatchError, HandlerError, dispatch};
pub use helpers::{Body, BridgeRequest, BridgeResponse, ClientError, ParsedBody, SendError};
pub use http::{Headers, Method, Request, Response};
pub use server::{Server, ServerError};
