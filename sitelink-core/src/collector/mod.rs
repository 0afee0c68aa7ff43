//! Collector connection and event delivery
//!
//! This module links a site to a remote collector and delivers its events.
//!
//! ## Architecture
//!
//! ```text
//! SiteClient ──▶ Dispatcher ──(403 invalid token)──▶ ConnectionManager::reconnect
//!                                                      │
//!                               ThrottleGate ◀─────────┘ ──▶ backoff schedule
//! ```
//!
//! - Handshakes are throttled with an escalating backoff so a population of
//!   sites never hammers an unavailable collector.
//! - A request rejected because the credential is bound to another URL is
//!   re-authenticated and replayed once, never more.
//! - Failures come back as typed results; nothing here panics or queues.
//!
//! ## Usage
//!
//! Point the client at a collector in `~/.config/sitelink/config.toml`:
//!
//! ```toml
//! [collector]
//! base_url = "https://hiive.cloud/api"
//!
//! [site]
//! brand = "bluehost"
//! url = "https://example.com"
//! ```

mod backoff;
mod blocking;
mod client;
mod connection;
mod dispatch;
mod outcome;
mod throttle;

pub use backoff::throttle_interval;
pub use blocking::BlockingSiteClient;
pub use client::{SiteClient, BATCH_EVENTS_PATH, SINGLE_EVENT_PATH};
pub use connection::{
    ConnectionManager, ConnectionState, VerificationReply, CONNECT_PATH, RECONNECT_PATH,
    VERIFY_TOKEN_KEY,
};
pub use dispatch::{
    CollectorResponse, Dispatcher, RequestContext, RequestOptions, INVALID_TOKEN_MESSAGE,
};
pub use outcome::{BatchReport, DeliveryOutcome};
pub use throttle::{ThrottleGate, THROTTLE_KEY};
