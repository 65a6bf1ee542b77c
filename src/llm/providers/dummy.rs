//! Dummy LLM provider: echoes input back prefixed with `[echo]`.
//! Used for running the whole workflow without an API key. Failing and
//! slow variants stand in for provider outages and hangs in tests.

use std::time::Duration;

use crate::llm::{LlmResponse, ProviderError};

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    fail_with: Option<String>,
    delay: Option<Duration>,
}

impl DummyProvider {
    pub fn echo() -> Self {
        Self::default()
    }

    /// Every call fails with `ProviderError::Request(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { fail_with: Some(message.into()), ..Self::default() }
    }

    /// Echoes, but only after sleeping for `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub async fn complete(&self, prompt: &str) -> Result<LlmResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.fail_with {
            return Err(ProviderError::Request(msg.clone()));
        }
        Ok(LlmResponse {
            text: format!("[echo] {prompt}"),
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_prefixes_echo() {
        let p = DummyProvider::echo();
        assert_eq!(p.complete("hello").await.unwrap().text, "[echo] hello");
    }

    #[tokio::test]
    async fn complete_usage_is_none() {
        let p = DummyProvider::echo();
        assert!(p.complete("test").await.unwrap().usage.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_waits_before_echoing() {
        let p = DummyProvider::slow(Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        assert_eq!(p.complete("hi").await.unwrap().text, "[echo] hi");
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn failing_returns_request_error() {
        let p = DummyProvider::failing("quota exceeded");
        let err = p.complete("x").await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }
}
