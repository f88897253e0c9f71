//! Per-connection request processing.
//!
//! [`HttpConnection`] reads requests, runs the handler for each one in order,
//! writes the responses back and decides whether the connection stays open.

mod http_connection;

pub use http_connection::HttpConnection;
