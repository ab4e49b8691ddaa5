//! Notebook upload and grading server.
//!
//! Accepts notebook uploads from browsers and headless clients, tags each with
//! a submission ID and the uploader's pseudonymous hash, hands it to the
//! execution engine through a queue (or grades it in-process), and serves the
//! resulting report to polling clients.

pub mod audit;
pub mod auth;
pub mod config;
pub mod consumer;
pub mod error;
pub mod grader;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod poll;
pub mod render;
pub mod routes;
pub mod state;
pub mod store;
pub mod templates;

pub use routes::build_router;
pub use state::{AppState, HttpOptions};
