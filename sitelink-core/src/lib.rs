//! # sitelink-core
//!
//! Core library for sitelink - reliable event reporting from many client
//! installations to a central collector.
//!
//! This library provides:
//! - The connection handshake with throttled, escalating reconnect backoff
//! - Authenticated event delivery with one-shot re-authentication
//! - State stores (in-memory and SQLite) for credentials and throttle state
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sitelink_core::collector::{BlockingSiteClient, RequestContext};
//! use sitelink_core::store::{SqliteStore, StateStores};
//! use sitelink_core::{Config, Event, SiteProviders};
//!
//! let config = Config::load().expect("failed to load config");
//! let store = Arc::new(SqliteStore::open(&Config::store_path()).expect("failed to open store"));
//!
//! let client = BlockingSiteClient::new(
//!     config.collector.clone(),
//!     StateStores::shared(store),
//!     SiteProviders::configured(config.site.clone()),
//! )
//! .expect("invalid collector config");
//!
//! if !client.is_connected() {
//!     client.connect();
//! }
//!
//! let event = Event::new("admin", "login");
//! let _ = client.send_batch(&[event], RequestContext::Background);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use provider::{CoreDataProvider, PluginInventoryProvider, SiteProviders};
pub use types::*;

// Public modules
pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod store;
pub mod types;
