//! Shared fixtures for integration tests
#![allow(dead_code)]

pub mod fake_engine;
pub mod mock_relay;

/// Initialize test logging (call once per test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,remotemedia_relay_signaling=debug")
        .try_init();
}
