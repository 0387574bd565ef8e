//! Integration tests for the SSE client
//!
//! These tests run an [`sse_client::EventSource`] against real axum
//! servers bound to ephemeral local ports, so no external services are
//! needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p sse-tests
//! ```
//!
//! Set `RUST_LOG=sse_client=debug` to see the connection lifecycle.
//!
//! # Test Structure
//!
//! - `e2e_test.rs` - Event delivery, resumption, reconnection, and close

// This crate only contains tests, no library code
