//! Handshake with the collector
//!
//! A site moves between three states:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──token issued──▶ Connected
//!      ▲                                                    │
//!      └────────── credential cleared externally ───────────┘
//! ```
//!
//! Every handshake first takes the throttle lock, so a failing collector is
//! contacted at most once per backoff interval no matter how often callers
//! ask to connect.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::throttle::ThrottleGate;
use crate::config::CollectorConfig;
use crate::error::{Error, Result};
use crate::provider::SiteProviders;
use crate::store::{CredentialStore, EphemeralStore, StateStores};
use crate::types::{CoreData, InstalledPlugin};

/// Initial handshake endpoint
pub const CONNECT_PATH: &str = "/sites/v2/connect";

/// Handshake endpoint proving ownership with the current credential
pub const RECONNECT_PATH: &str = "/sites/v2/reconnect";

/// Transient key holding the outstanding verification token
pub const VERIFY_TOKEN_KEY: &str = "verify_token";

/// Where the site stands with the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No credential and no handshake in flight
    Disconnected,
    /// A verification token is outstanding
    Connecting,
    /// A credential is present
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Answer to a verification callback from the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReply {
    /// The token the collector presented
    pub token: String,
    /// Whether it matched the outstanding verification token
    pub valid: bool,
}

impl VerificationReply {
    /// HTTP status any verification endpoint should answer with
    pub fn status(&self) -> u16 {
        if self.valid {
            200
        } else {
            400
        }
    }
}

/// Request body for the handshake endpoints
#[derive(Serialize)]
struct HandshakeRequest {
    #[serde(flatten)]
    core: CoreData,
    verify_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugins: Option<Vec<InstalledPlugin>>,
}

/// Response from the handshake endpoints
#[derive(Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Establishes and renews the site's bearer credential
pub struct ConnectionManager {
    config: CollectorConfig,
    http_client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    transients: Arc<dyn EphemeralStore>,
    throttle: ThrottleGate,
    site: SiteProviders,
}

impl ConnectionManager {
    /// Create a connection manager
    ///
    /// Returns an error if the collector configuration is invalid.
    pub fn new(config: CollectorConfig, stores: StateStores, site: SiteProviders) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("sitelink/", env!("CARGO_PKG_VERSION"))),
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        let throttle = ThrottleGate::new(stores.transients.clone(), stores.attempts.clone());

        Ok(Self {
            config,
            http_client,
            credentials: stores.credentials,
            transients: stores.transients,
            throttle,
            site,
        })
    }

    /// Attempt a handshake against `path`.
    ///
    /// Returns false without touching any state when throttled. Otherwise the
    /// throttle is taken and the attempt counter incremented before the
    /// request goes out, whatever its outcome.
    #[tracing::instrument(name = "handshake", skip(self, authorization))]
    pub async fn connect(&self, path: &str, authorization: Option<&str>) -> bool {
        if self.throttle.is_throttled() {
            tracing::debug!(path, "Connection attempt skipped, throttled");
            return false;
        }

        if let Err(e) = self.throttle.throttle() {
            tracing::warn!(error = %e, "Failed to set connection throttle, skipping attempt");
            return false;
        }

        let verify_token = generate_verification_token();
        if let Err(e) = self
            .transients
            .set(VERIFY_TOKEN_KEY, &verify_token, self.config.verify_token_ttl())
        {
            tracing::warn!(error = %e, "Failed to store verification token");
            return false;
        }

        let body = HandshakeRequest {
            core: self.site.core_data.core_data(),
            verify_token,
            plugins: self.site.plugins.as_ref().map(|p| p.collect()),
        };

        match self.throttle.record_attempt() {
            Ok(attempts) => tracing::debug!(attempts, "Connection attempt recorded"),
            Err(e) => tracing::warn!(error = %e, "Failed to record connection attempt"),
        }

        let url = format!("{}{}", self.config.api_url(), path);
        let mut request = self
            .http_client
            .post(&url)
            .timeout(self.config.connect_timeout())
            .json(&body);

        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = Error::transport(&e);
                tracing::warn!(path, error = %err, "Handshake request failed");
                return false;
            }
        };

        let status = response.status();

        // Created = 201; Updated = 200
        if status != StatusCode::OK && status != StatusCode::CREATED {
            tracing::warn!(path, status = status.as_u16(), "Handshake rejected");
            return false;
        }

        let token = match response.json::<HandshakeResponse>().await {
            Ok(HandshakeResponse { token: Some(token) }) if !token.is_empty() => token,
            Ok(_) => {
                tracing::warn!(path, status = status.as_u16(), "Handshake response carried no token");
                return false;
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "Failed to parse handshake response");
                return false;
            }
        };

        if let Err(e) = self.credentials.set(&token) {
            tracing::warn!(error = %e, "Failed to persist credential");
            return false;
        }

        tracing::info!(path, status = status.as_u16(), "Connected to collector");
        true
    }

    /// Initial handshake
    pub async fn connect_default(&self) -> bool {
        self.connect(CONNECT_PATH, None).await
    }

    /// Handshake proving ownership with the current credential.
    ///
    /// Lets the collector re-associate the site (e.g. after a URL change) or
    /// rotate its token. Returns false when there is no credential to prove
    /// ownership with.
    pub async fn reconnect(&self) -> bool {
        let Some(token) = self.auth_token() else {
            tracing::debug!("Reconnect skipped, no credential to present");
            return false;
        };

        let authorization = format!("Bearer {}", token);
        self.connect(RECONNECT_PATH, Some(&authorization)).await
    }

    /// Whether a non-empty credential is available
    pub fn is_connected(&self) -> bool {
        self.auth_token().is_some()
    }

    /// Current credential, if present and non-empty
    pub fn auth_token(&self) -> Option<String> {
        match self.credentials.get() {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read credential");
                None
            }
        }
    }

    /// Current position in the connection state machine
    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            return ConnectionState::Connected;
        }

        match self.transients.get(VERIFY_TOKEN_KEY) {
            Ok(Some(_)) => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Check a token presented by the collector against the outstanding
    /// verification token. A match consumes the token.
    pub fn verify_token(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }

        let saved = match self.transients.get(VERIFY_TOKEN_KEY) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read verification token");
                return false;
            }
        };

        match saved {
            Some(saved) if saved == candidate => {
                if let Err(e) = self.transients.delete(VERIFY_TOKEN_KEY) {
                    tracing::warn!(error = %e, "Failed to consume verification token");
                }
                true
            }
            _ => false,
        }
    }

    /// Verification result in the shape verification endpoints return
    pub fn verification_reply(&self, candidate: &str) -> VerificationReply {
        VerificationReply {
            token: candidate.to_string(),
            valid: self.verify_token(candidate),
        }
    }

    /// Whether handshakes are currently disallowed
    pub fn is_throttled(&self) -> bool {
        self.throttle.is_throttled()
    }

    /// Backoff interval the next handshake would lock for
    pub fn throttle_interval(&self) -> Result<Duration> {
        self.throttle.interval()
    }

    /// Recorded connection attempts
    pub fn attempts(&self) -> Result<u32> {
        self.throttle.attempts()
    }

    /// Fresh site snapshot
    pub fn core_data(&self) -> CoreData {
        self.site.core_data.core_data()
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

/// New 32-character hex verification token
fn generate_verification_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hasher.update(
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    let digest = hasher.finalize();

    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::store::MemoryStore;

    fn manager(store: &Arc<MemoryStore>) -> ConnectionManager {
        ConnectionManager::new(
            CollectorConfig::with_base_url("http://127.0.0.1:9"),
            StateStores::shared(store.clone()),
            SiteProviders::configured(SiteConfig::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_verification_token_format() {
        let token = generate_verification_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, generate_verification_token());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let store = Arc::new(MemoryStore::new());
        let result = ConnectionManager::new(
            CollectorConfig::with_base_url("not a url"),
            StateStores::shared(store),
            SiteProviders::configured(SiteConfig::default()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_is_connected_requires_non_empty_token() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        assert!(!manager.is_connected());

        CredentialStore::set(store.as_ref(), "").unwrap();
        assert!(!manager.is_connected());

        CredentialStore::set(store.as_ref(), "abc").unwrap();
        assert!(manager.is_connected());
        assert_eq!(manager.auth_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_verify_token_consumes_once() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        EphemeralStore::set(store.as_ref(), VERIFY_TOKEN_KEY, "secret", Duration::from_secs(300))
            .unwrap();

        assert!(!manager.verify_token("wrong"));
        assert!(!manager.verify_token(""));
        assert!(manager.verify_token("secret"));
        assert!(!manager.verify_token("secret"));
    }

    #[test]
    fn test_verify_token_without_outstanding_token() {
        let store = Arc::new(MemoryStore::new());
        assert!(!manager(&store).verify_token("anything"));
    }

    #[test]
    fn test_verification_reply_status() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        EphemeralStore::set(store.as_ref(), VERIFY_TOKEN_KEY, "secret", Duration::from_secs(300))
            .unwrap();

        let reply = manager.verification_reply("nope");
        assert!(!reply.valid);
        assert_eq!(reply.status(), 400);

        let reply = manager.verification_reply("secret");
        assert!(reply.valid);
        assert_eq!(reply.status(), 200);
        assert_eq!(reply.token, "secret");
    }

    #[test]
    fn test_state_transitions() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        EphemeralStore::set(store.as_ref(), VERIFY_TOKEN_KEY, "pending", Duration::from_secs(300))
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Connecting);

        CredentialStore::set(store.as_ref(), "issued").unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.state().to_string(), "connected");
    }

    #[tokio::test]
    async fn test_connect_while_throttled_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        EphemeralStore::set(
            store.as_ref(),
            super::super::throttle::THROTTLE_KEY,
            "1",
            Duration::from_secs(60),
        )
        .unwrap();

        assert!(!manager.connect_default().await);
        assert_eq!(manager.attempts().unwrap(), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_without_credential() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);

        assert!(!manager.reconnect().await);
        assert_eq!(manager.attempts().unwrap(), 0);
        assert!(!manager.is_throttled());
    }
}
