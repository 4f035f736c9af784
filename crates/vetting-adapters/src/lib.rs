//! HTTP adapters for the vetting pipeline capabilities.
//!
//! - [`OpenAiGeneration`]: chat completions with tool calling and JSON-schema output
//! - [`ExaSearch`]: Exa web search with page text
//! - [`SlackMessaging`]: user directory lookup and direct messages
//!
//! Request bodies and response parsing are plain functions so they can be
//! tested without a network. Transport and HTTP failures are mapped into
//! [`CapabilityError`]: transport errors, timeouts, 429 and 5xx are
//! `Unavailable`; other non-success statuses are `Rejected`; undecodable
//! bodies are `Malformed`.

pub mod exa;
pub mod openai;
pub mod slack;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use vetting_core::CapabilityError;

pub use exa::ExaSearch;
pub use openai::OpenAiGeneration;
pub use slack::SlackMessaging;

/// Default per-request timeout for every adapter.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Read a required secret from the environment.
pub fn require_env(name: &str) -> Result<String> {
    let value =
        std::env::var(name).map_err(|_| anyhow!("{name} environment variable not set"))?;
    if value.trim().is_empty() {
        return Err(anyhow!("{name} environment variable is empty"));
    }
    Ok(value)
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .user_agent(concat!("speaker-vet/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

pub(crate) fn transport_error(service: &str, error: reqwest::Error) -> CapabilityError {
    CapabilityError::Unavailable(format!("{service} request failed: {error}"))
}

/// Classify a non-success HTTP status.
pub(crate) fn status_error(service: &str, status: u16, body: &str) -> CapabilityError {
    let snippet: String = body.chars().take(300).collect();
    let detail = format!("{service} returned HTTP {status}: {snippet}");
    if status == 408 || status == 429 || status >= 500 {
        CapabilityError::Unavailable(detail)
    } else {
        CapabilityError::Rejected(detail)
    }
}

/// Send a prepared request and return the body of a successful response.
pub(crate) async fn send_for_text(
    service: &str,
    request: reqwest::RequestBuilder,
) -> std::result::Result<String, CapabilityError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(service, e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;
    if !status.is_success() {
        return Err(status_error(service, status.as_u16(), &body));
    }
    tracing::debug!(
        service,
        status = status.as_u16(),
        body = %body.chars().take(500).collect::<String>(),
        "adapter response"
    );
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error("exa", 503, "down"),
            CapabilityError::Unavailable(_)
        ));
        assert!(matches!(
            status_error("exa", 429, "slow down"),
            CapabilityError::Unavailable(_)
        ));
        assert!(matches!(
            status_error("openai", 401, "bad key"),
            CapabilityError::Rejected(_)
        ));
        assert!(status_error("openai", 400, "bad").to_string().contains("HTTP 400"));
    }
}
