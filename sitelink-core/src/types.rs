//! Core domain types for sitelink
//!
//! These types are what travels over the wire to the collector.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Collector** | The remote service receiving handshakes and events |
//! | **Site** | One client installation reporting to the collector |
//! | **CoreData** | A snapshot describing the site, rebuilt for every request |
//! | **Event** | A discrete application occurrence (category + key + data) |
//! | **Handshake** | The connect/reconnect exchange that yields a bearer credential |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================
// Site snapshot
// ============================================

/// Description of the reporting installation.
///
/// Field names on the wire are the collector's; the Rust names say what the
/// value actually is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreData {
    /// Brand slug of the hosting product
    pub brand: String,
    /// Page cache level
    pub cache_level: i64,
    /// Whether the site is fronted by Cloudflare
    pub cloudflare: bool,
    /// Version of this reporting module
    #[serde(rename = "data")]
    pub module_version: String,
    /// Administrator contact email
    pub email: String,
    /// Machine hostname
    pub hostname: String,
    /// Database server version
    #[serde(rename = "mysql")]
    pub database_version: String,
    /// Identifier of the host plugin
    pub origin: String,
    /// Language runtime version
    #[serde(rename = "php")]
    pub runtime_version: String,
    /// Version of the host plugin
    #[serde(rename = "plugin")]
    pub plugin_version: String,
    /// Public site URL
    pub url: String,
    /// Process owner
    pub username: String,
    /// Hosting platform version
    #[serde(rename = "wp")]
    pub platform_version: String,
    /// Installation root on the server
    pub server_path: String,
    /// Additional fields contributed by the embedding application
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================
// Plugin inventory
// ============================================

/// One entry of the installed-plugin inventory sent during a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    /// Plugin slug (directory/basename)
    pub slug: String,
    /// Installed version
    #[serde(default)]
    pub version: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Whether the plugin is currently active
    #[serde(default)]
    pub active: bool,
    /// Must-use plugins cannot be deactivated
    #[serde(default)]
    pub mu: bool,
    /// Whether automatic updates are enabled
    #[serde(default)]
    pub auto_updates: bool,
}

// ============================================
// Events
// ============================================

/// An application event as the collector expects it.
///
/// `data` keeps its insertion order on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event category (e.g. "admin", "commerce")
    pub category: String,
    /// Event name within the category (e.g. "plugin_search")
    pub key: String,
    /// Event context
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Event {
    /// Create an event with no context data
    pub fn new(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            data: Map::new(),
        }
    }

    /// Create an event from a JSON object; non-object values are stored under `value`.
    pub fn with_data(category: impl Into<String>, key: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        Self {
            category: category.into(),
            key: key.into(),
            data,
        }
    }
}

/// Request body for the event endpoints.
#[derive(Debug, Serialize)]
pub struct EventEnvelope<'a> {
    /// Site snapshot at the time of sending
    pub environment: CoreData,
    /// Events being delivered
    pub events: &'a [Event],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_core_data_wire_names() {
        let data = CoreData {
            brand: "bluehost".to_string(),
            module_version: "2.6.0".to_string(),
            database_version: "8.0.36".to_string(),
            runtime_version: "8.2.1".to_string(),
            plugin_version: "3.1.0".to_string(),
            platform_version: "6.5".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["brand"], "bluehost");
        assert_eq!(value["data"], "2.6.0");
        assert_eq!(value["mysql"], "8.0.36");
        assert_eq!(value["php"], "8.2.1");
        assert_eq!(value["plugin"], "3.1.0");
        assert_eq!(value["wp"], "6.5");
        assert!(value.get("module_version").is_none());
    }

    #[test]
    fn test_core_data_extra_fields_flatten() {
        let mut data = CoreData::default();
        data.extra.insert("region".to_string(), json!("eu-west"));

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["region"], "eu-west");
    }

    #[test]
    fn test_event_data_preserves_order() {
        let event = Event::with_data(
            "admin",
            "plugin_search",
            json!({"type": "term", "query": "seo", "a": 1}),
        );

        let encoded = serde_json::to_string(&event).unwrap();
        assert_eq!(
            encoded,
            r#"{"category":"admin","key":"plugin_search","data":{"type":"term","query":"seo","a":1}}"#
        );
    }

    #[test]
    fn test_event_with_scalar_data() {
        let event = Event::with_data("admin", "login", json!(42));
        assert_eq!(event.data["value"], 42);

        let event = Event::with_data("admin", "login", Value::Null);
        assert!(event.data.is_empty());
    }
}
