//! Subscription status lookups against the remote authority.
//!
//! The authority answers `GET <server>/user-status?email=<email>` with the
//! subscriber's premium / trial state. Lookups never fail from the caller's
//! point of view: every problem is folded into [`StatusOutcome::Unknown`],
//! which the gating engine treats as a denial.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::CoreError;

const STATUS_PATH: &str = "/user-status";

/// Default request timeout for status lookups.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Subscriber status as reported by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatus {
    pub premium: bool,
    /// End of the trial period, epoch seconds.
    #[serde(default)]
    pub trial_end: Option<i64>,
    // The authority's own derivation can yield `null` instead of `false`.
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_active: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
}

impl RemoteStatus {
    /// The authority's rule: active while premium or inside the trial.
    pub fn derive_active(premium: bool, trial_end: Option<i64>, now: DateTime<Utc>) -> bool {
        premium || trial_end.is_some_and(|end| end > now.timestamp())
    }
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Why a lookup produced no usable status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownReason {
    /// No server URL configured. A configuration state, not a failure.
    NotConfigured,
    /// Connection, TLS or timeout failure.
    Transport(String),
    /// The authority answered with a non-success status code.
    HttpStatus(u16),
    /// The body was not a valid status document.
    Malformed(String),
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::NotConfigured => f.write_str("no server configured"),
            UnknownReason::Transport(msg) => write!(f, "transport error: {msg}"),
            UnknownReason::HttpStatus(code) => write!(f, "server answered HTTP {code}"),
            UnknownReason::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

/// Result of one status lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    Resolved(RemoteStatus),
    Unknown(UnknownReason),
}

impl StatusOutcome {
    /// True only for a resolved, active subscriber.
    pub fn is_active(&self) -> bool {
        matches!(self, StatusOutcome::Resolved(status) if status.is_active)
    }

    /// One-line summary for settings surfaces.
    pub fn describe(&self) -> &'static str {
        match self {
            StatusOutcome::Resolved(status) if status.is_active => "Active (premium or trial)",
            StatusOutcome::Resolved(_) => "Inactive",
            StatusOutcome::Unknown(UnknownReason::NotConfigured) => "server URL or email missing",
            StatusOutcome::Unknown(_) => "validation failed",
        }
    }
}

/// Source of subscriber status. Implemented over HTTP by
/// [`HttpStatusResolver`]; tests substitute scripted authorities.
#[async_trait]
pub trait StatusAuthority: Send + Sync {
    async fn fetch_status(&self, email: &str, server_url: Option<&str>) -> StatusOutcome;
}

/// Status lookups over HTTP.
///
/// One request per call: no retries and no caching. The next navigation
/// re-polls.
pub struct HttpStatusResolver {
    http_client: Client,
}

impl HttpStatusResolver {
    /// Client with `timeout` applied to every lookup.
    ///
    /// # Errors
    /// Returns [`CoreError::HttpClient`] if the TLS backend cannot be
    /// initialized.
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::HttpClient(e.to_string()))?;
        Ok(Self { http_client })
    }

    /// Build the lookup URL, or `None` when no server is configured.
    pub fn status_url(email: &str, server_url: Option<&str>) -> Option<String> {
        let base = server_url.map(str::trim).filter(|s| !s.is_empty())?;
        Some(format!(
            "{}{}?email={}",
            base.trim_end_matches('/'),
            STATUS_PATH,
            urlencoding::encode(email)
        ))
    }

    async fn request(&self, url: &str) -> Result<RemoteStatus, UnknownReason> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| UnknownReason::Transport(e.to_string()))?;

        let code = response.status();
        if !code.is_success() {
            return Err(UnknownReason::HttpStatus(code.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UnknownReason::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| UnknownReason::Malformed(e.to_string()))
    }
}

#[async_trait]
impl StatusAuthority for HttpStatusResolver {
    async fn fetch_status(&self, email: &str, server_url: Option<&str>) -> StatusOutcome {
        let Some(url) = Self::status_url(email, server_url) else {
            return StatusOutcome::Unknown(UnknownReason::NotConfigured);
        };

        match self.request(&url).await {
            Ok(status) => {
                tracing::debug!(email, is_active = status.is_active, "user status resolved");
                StatusOutcome::Resolved(status)
            }
            Err(reason) => {
                tracing::warn!(email, %reason, "user-status fetch failed");
                StatusOutcome::Unknown(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn resolver() -> HttpStatusResolver {
        HttpStatusResolver::new(DEFAULT_TIMEOUT).unwrap()
    }

    fn active_body() -> &'static str {
        r#"{"premium":true,"trialEnd":null,"isActive":true,"verified":true,"stripeCustomerId":"cus_123"}"#
    }

    #[test]
    fn status_url_encodes_email_and_trims_slash() {
        let url = HttpStatusResolver::status_url("a+b@example.com", Some("https://api.test/"));
        assert_eq!(
            url.as_deref(),
            Some("https://api.test/user-status?email=a%2Bb%40example.com")
        );
    }

    #[test]
    fn status_url_absent_for_blank_server() {
        assert!(HttpStatusResolver::status_url("a@b.c", None).is_none());
        assert!(HttpStatusResolver::status_url("a@b.c", Some("  ")).is_none());
    }

    #[tokio::test]
    async fn unconfigured_server_is_not_configured() {
        let resolver = resolver();
        let outcome = resolver.fetch_status("a@b.c", None).await;
        assert_eq!(outcome, StatusOutcome::Unknown(UnknownReason::NotConfigured));
        assert_eq!(outcome.describe(), "server URL or email missing");
    }

    #[tokio::test]
    async fn resolves_active_subscriber() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/user-status")
            .match_query(Matcher::UrlEncoded("email".into(), "kid@example.com".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(active_body())
            .expect(1)
            .create_async()
            .await;

        let resolver = resolver();
        let outcome = resolver
            .fetch_status("kid@example.com", Some(&server.url()))
            .await;

        mock.assert_async().await;
        match &outcome {
            StatusOutcome::Resolved(status) => {
                assert!(status.premium);
                assert!(status.is_active);
                assert_eq!(status.stripe_customer_id.as_deref(), Some("cus_123"));
            }
            other => panic!("expected resolved status, got {other:?}"),
        }
        assert!(outcome.is_active());
        assert_eq!(outcome.describe(), "Active (premium or trial)");
    }

    #[tokio::test]
    async fn unknown_subscriber_body_is_inactive() {
        // The authority omits verified/stripeCustomerId and may send null.
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user-status")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"premium":false,"trialEnd":null,"isActive":null}"#)
            .create_async()
            .await;

        let outcome = resolver()
            .fetch_status("nobody@example.com", Some(&server.url()))
            .await;

        match outcome {
            StatusOutcome::Resolved(status) => {
                assert!(!status.is_active);
                assert!(!status.verified);
                assert!(status.stripe_customer_id.is_none());
            }
            other => panic!("expected resolved status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_unknown() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user-status")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"error":"db error"}"#)
            .create_async()
            .await;

        let outcome = resolver()
            .fetch_status("kid@example.com", Some(&server.url()))
            .await;
        assert_eq!(outcome, StatusOutcome::Unknown(UnknownReason::HttpStatus(500)));
        assert_eq!(outcome.describe(), "validation failed");
    }

    #[tokio::test]
    async fn malformed_body_is_unknown() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user-status")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let outcome = resolver()
            .fetch_status("kid@example.com", Some(&server.url()))
            .await;
        assert!(matches!(
            outcome,
            StatusOutcome::Unknown(UnknownReason::Malformed(_))
        ));
        assert!(!outcome.is_active());
    }

    #[tokio::test]
    async fn unreachable_server_is_unknown() {
        // Port 9 (discard) on localhost is not expected to answer HTTP.
        let resolver = HttpStatusResolver::new(Duration::from_secs(2)).unwrap();
        let outcome = resolver
            .fetch_status("kid@example.com", Some("http://127.0.0.1:9"))
            .await;
        assert!(matches!(
            outcome,
            StatusOutcome::Unknown(UnknownReason::Transport(_))
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Accepted by the listen backlog, never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let server = format!("http://{}", listener.local_addr().unwrap());

        let resolver = HttpStatusResolver::new(Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let outcome = resolver.fetch_status("kid@example.com", Some(&server)).await;

        assert!(matches!(
            outcome,
            StatusOutcome::Unknown(UnknownReason::Transport(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }

    #[test]
    fn derive_active_follows_trial_window() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let ts = now.timestamp();
        assert!(RemoteStatus::derive_active(true, None, now));
        assert!(RemoteStatus::derive_active(false, Some(ts + 60), now));
        assert!(!RemoteStatus::derive_active(false, Some(ts), now));
        assert!(!RemoteStatus::derive_active(false, None, now));
    }
}
