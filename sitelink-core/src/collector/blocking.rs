//! Synchronous wrapper for SiteClient
//!
//! Provides blocking methods for use in synchronous code.

use serde_json::Value;

use super::client::SiteClient;
use super::connection::{ConnectionState, VerificationReply};
use super::dispatch::{CollectorResponse, RequestContext, RequestOptions};
use super::outcome::BatchReport;
use crate::config::CollectorConfig;
use crate::error::{Error, Result};
use crate::provider::SiteProviders;
use crate::store::StateStores;
use crate::types::Event;

/// Blocking client; each call runs to completion or its timeout
pub struct BlockingSiteClient {
    inner: SiteClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingSiteClient {
    /// Create a blocking client
    ///
    /// Must not be called from within an async runtime.
    pub fn new(config: CollectorConfig, stores: StateStores, site: SiteProviders) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to create runtime: {}", e)))?;

        Ok(Self {
            inner: SiteClient::new(config, stores, site)?,
            runtime,
        })
    }

    /// Initial handshake (blocking)
    pub fn connect(&self) -> bool {
        self.runtime.block_on(self.inner.connect())
    }

    /// Ownership-proving handshake (blocking)
    pub fn reconnect(&self) -> bool {
        self.runtime.block_on(self.inner.reconnect())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn verify_token(&self, token: &str) -> bool {
        self.inner.verify_token(token)
    }

    pub fn verification_reply(&self, token: &str) -> VerificationReply {
        self.inner.verification_reply(token)
    }

    /// Authenticated request (blocking)
    pub fn dispatch(
        &self,
        path: &str,
        payload: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<CollectorResponse> {
        self.runtime
            .block_on(self.inner.dispatch(path, payload, options))
    }

    /// Send one event (blocking)
    pub fn send_event(&self, event: &Event, context: RequestContext) -> Result<Value> {
        self.runtime.block_on(self.inner.send_event(event, context))
    }

    /// Send a batch of events (blocking)
    pub fn send_batch(&self, events: &[Event], context: RequestContext) -> Result<BatchReport> {
        self.runtime.block_on(self.inner.send_batch(events, context))
    }

    /// The async client underneath
    pub fn inner(&self) -> &SiteClient {
        &self.inner
    }
}
