//! Typed delivery results

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dispatch::CollectorResponse;
use crate::error::{Error, Result};

/// Response body of a batch delivery, exactly as the collector sent it.
///
/// The collector normally reports `succeededEvents` and `failedEvents`, keyed
/// by the events' positions in the submitted batch, but nothing is assumed:
/// missing lists stay missing and a non-JSON body is kept as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchReport {
    body: Value,
}

impl BatchReport {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    /// The parsed body
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    pub fn succeeded_events(&self) -> Option<&Value> {
        self.body.get("succeededEvents")
    }

    pub fn failed_events(&self) -> Option<&Value> {
        self.body.get("failedEvents")
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded_events().map(entry_count).unwrap_or(0)
    }

    pub fn failed_count(&self) -> usize {
        self.failed_events().map(entry_count).unwrap_or(0)
    }

    /// Whether the collector reported no failed events
    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }
}

fn entry_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 0,
    }
}

/// How a delivery ended
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Accepted status; the parsed body (null when not JSON)
    Accepted(Value),
    /// Accepted server error; the collector may still report per-event results
    PartialFailure(BatchReport),
    /// Refused before or by the collector; `status` is None when no request was made
    Rejected { status: Option<u16>, message: String },
    /// No HTTP response was received
    TransportError { code: &'static str, message: String },
}

impl DeliveryOutcome {
    /// Classify a response against the statuses the calling operation accepts.
    pub fn classify(response: &CollectorResponse, accepted: &[u16]) -> Self {
        let status = response.status.as_u16();

        if !accepted.contains(&status) {
            return DeliveryOutcome::Rejected {
                status: Some(status),
                message: response.message(),
            };
        }

        let body = response.json().unwrap_or(Value::Null);
        if response.status.is_server_error() {
            DeliveryOutcome::PartialFailure(BatchReport::new(body))
        } else {
            DeliveryOutcome::Accepted(body)
        }
    }

    /// Outcome for a dispatch that produced no response.
    ///
    /// Only connection and transport failures are delivery outcomes; any
    /// other error is handed back unchanged.
    pub fn from_error(error: Error) -> Result<Self> {
        match error {
            Error::NotConnected => Ok(DeliveryOutcome::Rejected {
                status: None,
                message: "not connected".to_string(),
            }),
            Error::Transport { code, message } => {
                Ok(DeliveryOutcome::TransportError { code, message })
            }
            Error::Rejected { status, message } => Ok(DeliveryOutcome::Rejected {
                status: Some(status),
                message,
            }),
            other => Err(other),
        }
    }

    /// Whether the collector took the delivery (fully or partially)
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            DeliveryOutcome::Accepted(_) | DeliveryOutcome::PartialFailure(_)
        )
    }

    /// Accepted bodies become `Ok`; everything else becomes the matching error.
    pub fn into_result(self) -> Result<Value> {
        match self {
            DeliveryOutcome::Accepted(value) => Ok(value),
            DeliveryOutcome::PartialFailure(report) => Ok(report.into_body()),
            DeliveryOutcome::Rejected { status: None, .. } => Err(Error::NotConnected),
            DeliveryOutcome::Rejected {
                status: Some(status),
                message,
            } => Err(Error::Rejected { status, message }),
            DeliveryOutcome::TransportError { code, message } => {
                Err(Error::Transport { code, message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn response(status: u16, body: &str) -> CollectorResponse {
        let status = StatusCode::from_u16(status).unwrap();
        CollectorResponse {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_accepted_json_body() {
        let outcome = DeliveryOutcome::classify(&response(201, r#"{"data":{"id":"x"}}"#), &[200, 201]);
        assert_eq!(outcome, DeliveryOutcome::Accepted(json!({"data": {"id": "x"}})));
        assert!(outcome.is_delivered());
    }

    #[test]
    fn test_accepted_non_json_body() {
        let outcome = DeliveryOutcome::classify(&response(200, ""), &[200, 201]);
        assert_eq!(outcome, DeliveryOutcome::Accepted(Value::Null));
        assert_eq!(outcome.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_unexpected_status_rejected() {
        let outcome = DeliveryOutcome::classify(&response(404, "missing"), &[200, 201]);
        assert_eq!(
            outcome,
            DeliveryOutcome::Rejected {
                status: Some(404),
                message: "Not Found".to_string()
            }
        );
        assert!(matches!(
            outcome.into_result(),
            Err(Error::Rejected { status: 404, .. })
        ));
    }

    #[test]
    fn test_accepted_server_error_keeps_body() {
        let body = r#"{"succeededEvents":{"1":{"key":"a"}},"failedEvents":{"2":{"key":"b"}}}"#;
        let outcome = DeliveryOutcome::classify(&response(500, body), &[200, 201, 500]);

        match outcome {
            DeliveryOutcome::PartialFailure(report) => {
                assert_eq!(report.succeeded_count(), 1);
                assert_eq!(report.failed_count(), 1);
                assert!(!report.is_complete());
                assert_eq!(report.failed_events().unwrap()["2"]["key"], "b");
                assert_eq!(report.into_body(), serde_json::from_str::<Value>(body).unwrap());
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[test]
    fn test_accepted_server_error_without_lists() {
        let outcome = DeliveryOutcome::classify(&response(500, r#"{"message":"oops"}"#), &[200, 201, 500]);
        assert_eq!(
            outcome,
            DeliveryOutcome::PartialFailure(BatchReport::new(json!({"message": "oops"})))
        );

        let outcome =
            DeliveryOutcome::classify(&response(500, "Internal Server Error"), &[200, 201, 500]);
        assert_eq!(outcome.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_server_error_not_accepted() {
        let body = r#"{"succeededEvents":[],"failedEvents":[]}"#;
        let outcome = DeliveryOutcome::classify(&response(500, body), &[200, 201]);
        assert!(matches!(
            outcome,
            DeliveryOutcome::Rejected {
                status: Some(500),
                ..
            }
        ));
    }

    #[test]
    fn test_from_error() {
        assert_eq!(
            DeliveryOutcome::from_error(Error::NotConnected).unwrap(),
            DeliveryOutcome::Rejected {
                status: None,
                message: "not connected".to_string()
            }
        );

        let outcome = DeliveryOutcome::from_error(Error::Transport {
            code: "connect",
            message: "connection refused".to_string(),
        })
        .unwrap();
        assert!(!outcome.is_delivered());
        assert!(matches!(
            outcome.into_result(),
            Err(Error::Transport { code: "connect", .. })
        ));
    }

    #[test]
    fn test_from_error_passes_local_failures_through() {
        let json_error = serde_json::from_str::<Value>("{").unwrap_err();
        assert!(matches!(
            DeliveryOutcome::from_error(Error::Json(json_error)),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            DeliveryOutcome::from_error(Error::Store("locked".to_string())),
            Err(Error::Store(_))
        ));
    }

    #[test]
    fn test_not_connected_into_result() {
        let outcome = DeliveryOutcome::from_error(Error::NotConnected).unwrap();
        assert!(matches!(outcome.into_result(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_batch_report_missing_list_stays_missing() {
        let body = json!({"failedEvents": {"2": {"key": "b"}}, "requestId": "r-1"});
        let report = BatchReport::new(body.clone());

        assert!(report.succeeded_events().is_none());
        assert_eq!(report.succeeded_count(), 0);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(serde_json::to_value(&report).unwrap(), body);
        assert_eq!(report.into_body(), body);
    }

    #[test]
    fn test_batch_report_counts_arrays_and_maps() {
        let report = BatchReport::new(json!({
            "succeededEvents": [{"key": "a"}, {"key": "b"}],
            "failedEvents": {}
        }));

        assert_eq!(report.succeeded_count(), 2);
        assert_eq!(report.failed_count(), 0);
        assert!(report.is_complete());
    }
}
