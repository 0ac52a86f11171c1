use std::time::Duration;

use anyhow::{Context, Result};

/// Build the shared HTTP client used for Telegram and the LLM API.
///
/// System proxy discovery is opt-in (`HABIT_COACH_ENABLE_SYSTEM_PROXY=1`)
/// because it can panic on some platforms; on failure we retry with
/// `no_proxy`.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let allow_system_proxy = std::env::var("HABIT_COACH_ENABLE_SYSTEM_PROXY")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if allow_system_proxy {
        if let Ok(Ok(client)) = std::panic::catch_unwind(|| attempt_build(timeout, false)) {
            return Ok(client);
        }

        tracing::warn!(
            "HTTP client initialization with system proxy discovery failed; retrying with no_proxy"
        );
    }

    attempt_build(timeout, true).context("Failed to initialize HTTP client")
}

fn attempt_build(timeout: Duration, no_proxy: bool) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout);
    if no_proxy {
        builder = builder.no_proxy();
    }
    builder.build()
}
