//! Package host
//!
//! Serves the catalog and streams packages over HTTP:
//!
//! | route | response |
//! |-------|----------|
//! | `GET /versions` | `{"versions": [...], "latest": ...}` |
//! | `GET /updates?version=<id>\|LATEST` | gzip tar stream |
//! | `GET /health` | `{"status": "OK", "timestamp": ..., "versions": [...]}` |
//!
//! Handlers are stateless beyond the package root; the catalog is read from
//! disk on every request.

mod response;
mod routes;
mod server;

pub use routes::HostState;
pub use server::{router, serve, start_on};
