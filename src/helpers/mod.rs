//! Framework-style request/response augmentation.
//!
//! This module layers the ergonomic surface onto the bare transport pair:
//! [`BridgeRequest`] adds lazily-parsed `cookies`, `query` and `body`
//! properties to the inbound request, and [`BridgeResponse`] adds the chained
//! `status` / `send` / `json` / `redirect` helpers to the outbound response.

pub mod request;
pub mod response;

pub use request::{BridgeRequest, ClientError, ParsedBody};
pub use response::{Body, BridgeResponse, SendError};
