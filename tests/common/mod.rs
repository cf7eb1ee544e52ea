//! Common test infrastructure for end-to-end tests
//!
//! This module provides:
//! - Fake analysis tools installed as shell scripts
//! - Test server spawning on a random port
//! - HTTP client wrapper with SSE helpers
//! - Shared constants
//!
//! # Example
//!
//! ```rust,no_run
//! use common::{TestServer, TestClient, SAMPLE_CONTRACT, SLITHER};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.analyze(SLITHER, SAMPLE_CONTRACT).await;
//!     assert_eq!(response.status(), 200);
//! }
//! ```

#![allow(dead_code)]

mod client;
mod constants;
mod fixtures;
mod server;

pub use client::{read_events, SseEvent, TestClient};
pub use constants::*;
pub use fixtures::{process_is_running, FakeTools};
pub use server::TestServer;
