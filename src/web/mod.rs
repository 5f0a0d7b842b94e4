//! Web API module for packrat.
//!
//! This module exposes the upload engine over HTTP: multipart uploads,
//! downloads, text previews, deletion and on-demand compaction.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::create_router;
pub use server::WebServer;
