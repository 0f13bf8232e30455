//! Test helper utilities for error-recovery integration tests
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use error_recovery::{BackoffPolicy, Jitter, RawFailure, RecoveryConfig, RetryOptions};
use std::net::TcpListener;
use std::time::Duration;

/// Configuration with short, deterministic delays for wall-clock tests.
pub fn fast_config(max_attempts: u32) -> RecoveryConfig {
    RecoveryConfig {
        retry: RetryOptions::new(max_attempts, Duration::from_millis(10)),
        backoff: BackoffPolicy {
            max_delay: Duration::from_millis(200),
            jitter: Jitter::None,
            ..BackoffPolicy::default()
        },
        ..RecoveryConfig::default()
    }
}

/// URL on a local port nothing listens on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/")
}

/// GET `url` and return the body. Non-success responses become status
/// failures with their headers; transport failures go through reqwest.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, RawFailure> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(RawFailure::from_response(&response));
    }
    Ok(response.text().await?)
}
