//! HTTP server for devserver.
//!
//! Provides the GitHub webhook endpoint, a small trigger API and the report
//! viewer pages.

pub mod ansi;
pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
