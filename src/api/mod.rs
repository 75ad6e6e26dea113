//! HTTP boundary for study-set generation.
//!
//! `generation_router()` returns a composable `Router` exposing
//! `POST /generate` (NDJSON stream of growing item arrays) and
//! `GET /health`. `start_server()` binds it and runs it in the background.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::generation_router;
pub use server::{start_server, GenerationServer, ServerSession};
pub use types::ApiContext;
