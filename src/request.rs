//! GET requests that ride out transient faults.
//!
//! Two kinds of failure are treated as passing weather and retried on the same
//! request: TLS/SSL negotiation failures, and empty or throttled responses (the
//! usual sign that a polling limit was hit, or a server that is briefly down).
//! Everything else fails straight away.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{Sleeper, TokioSleeper};
use crate::config::RetryConfig;
use crate::{Error, Result};

/// Query parameters, in the order they are sent.
pub type Params<'a> = [(&'a str, String)];

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// One of `retry_statuses`, or a success carrying nothing (an empty body or a
    /// bare JSON `null`).
    pub fn is_throttled(&self, retry_statuses: &[u16]) -> bool {
        if retry_statuses.contains(&self.status) {
            return true;
        }
        let body = self.body.trim();
        self.is_success() && (body.is_empty() || body == "null")
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("TLS failure: {0}")]
    Tls(String),
    #[error("{0}")]
    Other(String),
}

/// One raw HTTP exchange, with no retrying of its own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &Params<'_>,
    ) -> core::result::Result<RawResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        params: &Params<'_>,
    ) -> core::result::Result<RawResponse, TransportError> {
        let res = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(classify)?;
        let status = res.status().as_u16();
        let body = res.text().await.map_err(classify)?;
        Ok(RawResponse { status, body })
    }
}

/// Walks the error chain looking for anything that smells like TLS.
fn classify(err: reqwest::Error) -> TransportError {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        chain.push_str(": ");
        chain.push_str(&inner.to_string());
        source = inner.source();
    }
    let lower = chain.to_lowercase();
    let is_tls = ["ssl", "tls", "certificate", "handshake"]
        .iter()
        .any(|needle| lower.contains(needle));
    if is_tls {
        TransportError::Tls(chain)
    } else {
        TransportError::Other(chain)
    }
}

enum Fault {
    Tls(String),
    Throttled(u16),
}

pub struct HttpClient<T = ReqwestTransport, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    retry: RetryConfig,
}

impl HttpClient {
    pub fn new(retry: RetryConfig) -> Result<Self> {
        Ok(Self::with_parts(ReqwestTransport::new()?, TokioSleeper, retry))
    }
}

impl<T: Transport, S: Sleeper> HttpClient<T, S> {
    pub fn with_parts(transport: T, sleeper: S, retry: RetryConfig) -> Self {
        Self {
            transport,
            sleeper,
            retry,
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Returns the decoded JSON body.
    pub async fn get_json(&self, url: &str, params: &Params<'_>) -> Result<Value> {
        let body = self.get_text(url, params).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Returns the raw body, retrying transient faults according to the retry config.
    pub async fn get_text(&self, url: &str, params: &Params<'_>) -> Result<String> {
        let mut attempt: u32 = 0;
        let mut tls_delay = self.retry.tls_cooldown;
        let mut throttle_delay = self.retry.throttle_cooldown;

        loop {
            attempt += 1;
            let fault = match self.transport.get(url, params).await {
                Ok(res) if res.is_throttled(&self.retry.retry_statuses) => Fault::Throttled(res.status),
                Ok(res) if res.is_success() => {
                    if attempt > 1 {
                        info!(url, attempts = attempt, "Request succeeded after retry");
                    }
                    return Ok(res.body);
                }
                Ok(res) => {
                    return Err(Error::HttpStatus {
                        url: url.to_string(),
                        status: res.status,
                    })
                }
                Err(TransportError::Tls(msg)) => Fault::Tls(msg),
                Err(TransportError::Other(msg)) => return Err(Error::Transport(msg)),
            };

            if let Some(max_attempts) = self.retry.max_attempts {
                if attempt >= max_attempts {
                    warn!(url, attempts = attempt, "Giving up on transient fault");
                    return Err(Error::RetriesExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                    });
                }
            }

            match fault {
                Fault::Tls(msg) => {
                    warn!(url, attempt, error = %msg, "SSL Error");
                    self.countdown(tls_delay).await;
                    tls_delay = self.next_delay(tls_delay);
                }
                Fault::Throttled(status) => {
                    warn!(
                        url,
                        attempt,
                        status,
                        wait_secs = throttle_delay.as_secs_f64(),
                        "No response, waiting"
                    );
                    self.sleeper.sleep(throttle_delay).await;
                    throttle_delay = self.next_delay(throttle_delay);
                }
            }
            info!(url, "Retrying.");
        }
    }

    /// Sleeps `delay` in one-second ticks, logging the seconds left on each.
    async fn countdown(&self, delay: Duration) {
        let whole = delay.as_secs();
        for remaining in (1..=whole).rev() {
            info!("Waiting... ({remaining})");
            self.sleeper.sleep(Duration::from_secs(1)).await;
        }
        let rest = delay - Duration::from_secs(whole);
        if !rest.is_zero() {
            self.sleeper.sleep(rest).await;
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay
            .mul_f64(self.retry.backoff_multiplier)
            .min(self.retry.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSleeper {
        slept: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingSleeper {
        fn recorded(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }

        fn total(&self) -> Duration {
            self.recorded().into_iter().sum()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    /// Plays back canned outcomes and counts calls.
    struct ScriptedTransport {
        script: Mutex<VecDeque<core::result::Result<RawResponse, TransportError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<core::result::Result<RawResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(
            &self,
            _url: &str,
            _params: &Params<'_>,
        ) -> core::result::Result<RawResponse, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted")
        }
    }

    fn client(
        script: Vec<core::result::Result<RawResponse, TransportError>>,
        retry: RetryConfig,
    ) -> (HttpClient<ScriptedTransport, RecordingSleeper>, RecordingSleeper) {
        let sleeper = RecordingSleeper::default();
        let client = HttpClient::with_parts(ScriptedTransport::new(script), sleeper.clone(), retry);
        (client, sleeper)
    }

    #[tokio::test]
    async fn empty_twice_then_success_takes_three_attempts() {
        let (client, sleeper) = client(
            vec![
                Ok(RawResponse::new(200, "")),
                Ok(RawResponse::new(200, "null")),
                Ok(RawResponse::new(200, r#"{"ok":true}"#)),
            ],
            RetryConfig::default(),
        );

        let value = client.get_json("http://x/api", &[]).await.unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(client.transport.calls(), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(10), Duration::from_secs(10)]
        );
    }

    #[tokio::test]
    async fn tls_failure_counts_down_then_retries() {
        let (client, sleeper) = client(
            vec![
                Err(TransportError::Tls("handshake failure".into())),
                Ok(RawResponse::new(200, "body")),
            ],
            RetryConfig::default(),
        );

        let body = client.get_text("http://x/page", &[]).await.unwrap();

        assert_eq!(body, "body");
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1); 5]);
    }

    #[tokio::test]
    async fn status_429_is_throttling() {
        let (client, sleeper) = client(
            vec![
                Ok(RawResponse::new(429, "slow down")),
                Ok(RawResponse::new(200, "[1]")),
            ],
            RetryConfig::default(),
        );

        assert_eq!(client.get_json("http://x", &[]).await.unwrap()[0], 1);
        assert_eq!(sleeper.total(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn permanent_status_fails_without_retry() {
        let (client, sleeper) = client(vec![Ok(RawResponse::new(404, "gone"))], RetryConfig::default());

        let err = client.get_text("http://x/missing", &[]).await.unwrap_err();

        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
        assert_eq!(client.transport.calls(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn other_transport_errors_are_permanent() {
        let (client, _) = client(
            vec![Err(TransportError::Other("connection refused".into()))],
            RetryConfig::default(),
        );

        let err = client.get_text("http://x", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn bounded_retries_give_up() {
        let retry = RetryConfig {
            max_attempts: Some(2),
            ..RetryConfig::default()
        };
        let (client, sleeper) = client(
            vec![Ok(RawResponse::new(200, "")), Ok(RawResponse::new(200, ""))],
            retry,
        );

        let err = client.get_text("http://x", &[]).await.unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(sleeper.recorded().len(), 1);
    }

    #[tokio::test]
    async fn backoff_grows_and_is_capped() {
        let retry = RetryConfig {
            throttle_cooldown: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            ..RetryConfig::default()
        };
        let (client, sleeper) = client(
            vec![
                Ok(RawResponse::new(200, "")),
                Ok(RawResponse::new(200, "")),
                Ok(RawResponse::new(200, "")),
                Ok(RawResponse::new(200, "done")),
            ],
            retry,
        );

        client.get_text("http://x", &[]).await.unwrap();

        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30)
            ]
        );
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let (client, sleeper) = client(
            vec![
                Ok(RawResponse::new(503, "Service Unavailable")),
                Ok(RawResponse::new(502, "Bad Gateway")),
                Ok(RawResponse::new(200, "{}")),
            ],
            RetryConfig::default(),
        );

        client.get_json("http://x/api", &[]).await.unwrap();

        assert_eq!(client.transport.calls(), 3);
        assert_eq!(sleeper.total(), Duration::from_secs(20));
    }

    #[test]
    fn throttle_detection() {
        let statuses = RetryConfig::default().retry_statuses;
        assert!(RawResponse::new(200, "  ").is_throttled(&statuses));
        assert!(RawResponse::new(200, "null\n").is_throttled(&statuses));
        assert!(RawResponse::new(429, "{}").is_throttled(&statuses));
        assert!(RawResponse::new(500, "").is_throttled(&statuses));
        assert!(RawResponse::new(503, "<html>").is_throttled(&statuses));
        assert!(!RawResponse::new(200, "{}").is_throttled(&statuses));
        assert!(!RawResponse::new(404, "").is_throttled(&statuses));
        assert!(!RawResponse::new(501, "").is_throttled(&statuses));
        assert!(!RawResponse::new(503, "").is_throttled(&[]));
    }
}
