//! Authenticated requests to the collector
//!
//! Every request carries the site's bearer credential. When the collector
//! answers 403 "Invalid token for url" the credential is valid but bound to a
//! different site URL; the dispatcher then reconnects once and replays the
//! request. The replay is not deduplicated against the rejected attempt.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;

use super::connection::ConnectionManager;
use super::outcome::DeliveryOutcome;
use crate::error::{Error, Result};

/// Message the collector sends with a 403 when the token belongs to another URL
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token for url";

/// Reconnect-and-replay cycles allowed per dispatch
const MAX_REAUTH_RETRIES: usize = 1;

/// Which latency budget a request runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestContext {
    /// A user is waiting on the result
    Interactive,
    /// Background work (scheduled flushes, CLI)
    #[default]
    Background,
}

/// Per-request overrides
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method (POST unless overridden)
    pub method: Method,
    /// Latency budget used to pick the timeout
    pub context: RequestContext,
    /// Explicit timeout, overriding the context's
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::POST,
            context: RequestContext::default(),
            timeout: None,
        }
    }
}

impl RequestOptions {
    /// Options for a request in the given context
    pub fn in_context(context: RequestContext) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A response read in full from the collector
#[derive(Debug, Clone)]
pub struct CollectorResponse {
    pub status: StatusCode,
    /// HTTP reason phrase
    pub reason: String,
    pub body: String,
}

impl CollectorResponse {
    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let body = response.text().await.map_err(|e| Error::transport(&e))?;

        Ok(Self {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }

    /// Body parsed as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// The body's `message` field, falling back to the reason phrase
    pub fn message(&self) -> String {
        self.json()
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.reason.clone())
    }

    /// Whether the collector rejected the credential for this site's URL
    pub fn is_invalid_token(&self) -> bool {
        self.status == StatusCode::FORBIDDEN
            && self
                .json()
                .as_ref()
                .and_then(|v| v.get("message"))
                .and_then(|m| m.as_str())
                == Some(INVALID_TOKEN_MESSAGE)
    }
}

/// Sends authenticated requests and re-authenticates on URL-bound rejection
pub struct Dispatcher {
    connection: ConnectionManager,
}

impl Dispatcher {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Send `payload` to `path` with the site's credential.
    ///
    /// Fails fast with [`Error::NotConnected`] when there is no credential and
    /// with [`Error::Transport`] when no response arrives; neither is retried.
    /// Any HTTP status is returned as a response for the caller to judge.
    #[tracing::instrument(
        name = "dispatch",
        skip(self, payload, options),
        fields(method = %options.method, context = ?options.context)
    )]
    pub async fn dispatch(
        &self,
        path: &str,
        payload: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<CollectorResponse> {
        let config = self.connection.config();
        let url = format!("{}/{}", config.api_url(), path.trim_start_matches('/'));
        let timeout = options.timeout.unwrap_or(match options.context {
            RequestContext::Interactive => config.interactive_timeout(),
            RequestContext::Background => config.background_timeout(),
        });
        let payload = payload.filter(|p| !p.is_null());

        let mut retries = 0;
        loop {
            let Some(token) = self.connection.auth_token() else {
                tracing::debug!("Dispatch skipped, not connected");
                return Err(Error::NotConnected);
            };

            let mut request = self
                .connection
                .http_client()
                .request(options.method.clone(), &url)
                .timeout(timeout)
                .bearer_auth(&token);

            if let Some(payload) = payload {
                request = request.json(payload);
            }

            let response = match request.send().await {
                Ok(response) => CollectorResponse::read(response).await?,
                Err(e) => {
                    let err = Error::transport(&e);
                    tracing::warn!(error = %err, "Collector request failed");
                    return Err(err);
                }
            };

            if response.is_invalid_token() && retries < MAX_REAUTH_RETRIES {
                retries += 1;
                tracing::info!("Credential rejected for this site, reconnecting");

                if self.connection.reconnect().await {
                    continue;
                }

                tracing::warn!("Reconnect failed, giving up on request");
                return Err(Error::NotConnected);
            }

            tracing::debug!(status = response.status.as_u16(), "Collector responded");
            return Ok(response);
        }
    }

    /// Dispatch and classify the result against the accepted statuses.
    ///
    /// Errors that are not delivery outcomes (local failures) are returned as-is.
    pub async fn deliver(
        &self,
        path: &str,
        payload: Option<&Value>,
        accepted: &[u16],
        options: &RequestOptions,
    ) -> Result<DeliveryOutcome> {
        match self.dispatch(path, payload, options).await {
            Ok(response) => Ok(DeliveryOutcome::classify(&response, accepted)),
            Err(e) => DeliveryOutcome::from_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> CollectorResponse {
        let status = StatusCode::from_u16(status).unwrap();
        CollectorResponse {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_invalid_token_detection() {
        assert!(response(403, r#"{"message":"Invalid token for url"}"#).is_invalid_token());
        assert!(!response(403, r#"{"message":"invalid token for url"}"#).is_invalid_token());
        assert!(!response(403, r#"{"message":"Forbidden"}"#).is_invalid_token());
        assert!(!response(403, "Invalid token for url").is_invalid_token());
        assert!(!response(401, r#"{"message":"Invalid token for url"}"#).is_invalid_token());
    }

    #[test]
    fn test_message_prefers_body() {
        assert_eq!(response(422, r#"{"message":"bad event"}"#).message(), "bad event");
        assert_eq!(response(422, "nope").message(), "Unprocessable Entity");
        assert_eq!(response(500, r#"{"error":1}"#).message(), "Internal Server Error");
    }

    #[test]
    fn test_request_options_defaults() {
        let options = RequestOptions::default();
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.context, RequestContext::Background);
        assert!(options.timeout.is_none());

        let options = RequestOptions::in_context(RequestContext::Interactive)
            .with_method(Method::GET)
            .with_timeout(Duration::from_secs(2));
        assert_eq!(options.method, Method::GET);
        assert_eq!(options.context, RequestContext::Interactive);
        assert_eq!(options.timeout, Some(Duration::from_secs(2)));
    }
}
