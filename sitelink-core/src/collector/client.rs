//! Event delivery to the collector
//!
//! Thin operations on top of [`Dispatcher`]: one event to the v1 endpoint,
//! a batch to the v2 endpoint. Undelivered events are not queued here;
//! callers decide whether and when to resend.

use serde_json::{Map, Value};

use super::connection::{ConnectionManager, ConnectionState, VerificationReply};
use super::dispatch::{CollectorResponse, Dispatcher, RequestContext, RequestOptions};
use super::outcome::{BatchReport, DeliveryOutcome};
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::provider::SiteProviders;
use crate::store::StateStores;
use crate::types::{Event, EventEnvelope};

/// Single-event endpoint
pub const SINGLE_EVENT_PATH: &str = "sites/v1/events";

/// Batch endpoint
pub const BATCH_EVENTS_PATH: &str = "sites/v2/events";

const SINGLE_EVENT_ACCEPTED: &[u16] = &[200, 201];

// The batch endpoint may report per-event results alongside a 500.
const BATCH_ACCEPTED: &[u16] = &[200, 201, 500];

/// Client for a site's connection to the collector
pub struct SiteClient {
    dispatcher: Dispatcher,
}

impl SiteClient {
    /// Create a client from configuration, state stores, and site providers
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: CollectorConfig, stores: StateStores, site: SiteProviders) -> Result<Self> {
        let connection = ConnectionManager::new(config, stores, site)?;
        Ok(Self {
            dispatcher: Dispatcher::new(connection),
        })
    }

    pub fn connection(&self) -> &ConnectionManager {
        self.dispatcher.connection()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Initial handshake; false when throttled or refused
    pub async fn connect(&self) -> bool {
        self.connection().connect_default().await
    }

    /// Ownership-proving handshake; false when throttled or refused
    pub async fn reconnect(&self) -> bool {
        self.connection().reconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection().state()
    }

    /// Match-and-consume a verification token presented by the collector
    pub fn verify_token(&self, token: &str) -> bool {
        self.connection().verify_token(token)
    }

    pub fn verification_reply(&self, token: &str) -> VerificationReply {
        self.connection().verification_reply(token)
    }

    /// Authenticated request to an arbitrary collector path
    pub async fn dispatch(
        &self,
        path: &str,
        payload: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<CollectorResponse> {
        self.dispatcher.dispatch(path, payload, options).await
    }

    /// Send one event and return the record the collector answers with.
    ///
    /// Returns the body's `data` field, or an empty object when absent.
    pub async fn send_event(&self, event: &Event, context: RequestContext) -> Result<Value> {
        let payload = self.envelope(std::slice::from_ref(event))?;

        let body = self
            .dispatcher
            .deliver(
                SINGLE_EVENT_PATH,
                Some(&payload),
                SINGLE_EVENT_ACCEPTED,
                &RequestOptions::in_context(context),
            )
            .await?
            .into_result()?;

        Ok(match body.get("data") {
            Some(data) if !data.is_null() => data.clone(),
            _ => Value::Object(Map::new()),
        })
    }

    /// Send a batch of events and return the collector's report.
    ///
    /// On 200, 201 and 500 the parsed body comes back exactly as sent; a 500
    /// usually carries per-event results and is not an error.
    pub async fn send_batch(&self, events: &[Event], context: RequestContext) -> Result<BatchReport> {
        match self.deliver_batch(events, context).await? {
            DeliveryOutcome::PartialFailure(report) => {
                tracing::info!(
                    succeeded = report.succeeded_count(),
                    failed = report.failed_count(),
                    "Batch partially delivered"
                );
                Ok(report)
            }
            other => other.into_result().map(BatchReport::new),
        }
    }

    /// Send a batch and return the classified outcome without converting it.
    pub async fn deliver_batch(
        &self,
        events: &[Event],
        context: RequestContext,
    ) -> Result<DeliveryOutcome> {
        let payload = self.envelope(events)?;

        let outcome = self
            .dispatcher
            .deliver(
                BATCH_EVENTS_PATH,
                Some(&payload),
                BATCH_ACCEPTED,
                &RequestOptions::in_context(context),
            )
            .await?;

        tracing::debug!(
            events = events.len(),
            delivered = outcome.is_delivered(),
            "Batch dispatched"
        );
        Ok(outcome)
    }

    fn envelope(&self, events: &[Event]) -> Result<Value> {
        let envelope = EventEnvelope {
            environment: self.connection().core_data(),
            events,
        };
        Ok(serde_json::to_value(&envelope)?)
    }
}
