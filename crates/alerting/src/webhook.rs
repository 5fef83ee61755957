//! Webhook Payload Parsing
//!
//! Converts notifier batches into canonical [`Alert`] values.

use crate::error::{ParseError, PipelineError};
use crate::model::{Alert, AlertStatus};
use chrono::{DateTime, Datelike, Utc};
use coordination::operation_key;
use enrichment::EnrichmentMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Batch submitted by the monitoring notifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub status: String,
    pub alerts: Vec<RawAlertEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
    #[serde(
        default,
        rename = "externalURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub external_url: Option<String>,
}

/// One alert event as sent by the notifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlertEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    #[serde(
        default,
        rename = "generatorURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub generator_url: Option<String>,
}

impl WebhookPayload {
    /// Decode a payload; any failure here rejects the whole batch
    pub fn from_json(bytes: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(bytes).map_err(|e| PipelineError::InvalidPayload(e.to_string()))
    }

    /// Instance-independent key identifying this batch for duplicate suppression.
    ///
    /// An explicit mode is part of the key, so the same batch under another
    /// override is processed again.
    pub fn idempotency_key(&self, mode: Option<EnrichmentMode>) -> String {
        let mut entries: Vec<String> = self
            .alerts
            .iter()
            .map(|raw| {
                format!(
                    "{}|{}|{}|{}",
                    raw.identity(),
                    raw.status.trim().to_ascii_lowercase(),
                    raw.starts_at.as_deref().unwrap_or(""),
                    raw.ends_at.as_deref().unwrap_or("")
                )
            })
            .collect();
        entries.sort();

        let group = self.group_key.clone().unwrap_or_default();
        let status = self.status.to_ascii_lowercase();
        let mode = mode.map_or("", EnrichmentMode::as_str).to_string();
        operation_key(
            "webhook",
            [group, status, mode].into_iter().chain(entries),
        )
    }
}

impl RawAlertEvent {
    /// Upstream fingerprint, derived fingerprint, or sorted label signature
    fn identity(&self) -> String {
        self.upstream_fingerprint()
            .map(str::to_string)
            .or_else(|| derive_fingerprint(self.generator_url.as_deref(), &self.labels))
            .unwrap_or_else(|| label_signature(&self.labels))
    }

    fn upstream_fingerprint(&self) -> Option<&str> {
        self.fingerprint
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

fn label_signature(labels: &HashMap<String, String>) -> String {
    let mut pairs: Vec<_> = labels.iter().collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Derive a fingerprint from the generator URL and label set.
///
/// Labels are included so distinct alerts from one rule stay distinct.
pub fn derive_fingerprint(
    generator_url: Option<&str>,
    labels: &HashMap<String, String>,
) -> Option<String> {
    let url = generator_url.map(str::trim).filter(|u| !u.is_empty())?;
    let key = operation_key("fingerprint", [url.to_string(), label_signature(labels)]);
    // Strip the "fingerprint:" prefix and keep 16 hex chars
    key.rsplit(':').next().map(|hash| hash[..16].to_string())
}

/// Parse an RFC 3339 timestamp, normalising a `Z` suffix to `+00:00`
pub fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, ParseError> {
    let trimmed = value.trim();
    let normalized = match trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
    {
        Some(base) => format!("{}+00:00", base),
        None => trimmed.to_string(),
    };

    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ParseError::InvalidTimestamp {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse one raw event.
///
/// `request_nonce` and `index` make placeholder fingerprints unique within
/// the request when nothing upstream identifies the alert.
pub fn parse_alert(
    raw: &RawAlertEvent,
    index: usize,
    request_nonce: &str,
    received_at: DateTime<Utc>,
) -> Result<Alert, ParseError> {
    let status: AlertStatus = raw.status.parse().map_err(ParseError::InvalidStatus)?;

    let starts_at = raw
        .starts_at
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(ParseError::MissingField("startsAt"))
        .and_then(|s| parse_timestamp("startsAt", s))?;

    // The notifier sends the zero time for alerts that are still open
    let ends_at = match raw.ends_at.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(parse_timestamp("endsAt", s)?).filter(|dt| dt.year() > 1),
    };

    let fingerprint = raw
        .upstream_fingerprint()
        .map(str::to_string)
        .or_else(|| derive_fingerprint(raw.generator_url.as_deref(), &raw.labels))
        .unwrap_or_else(|| format!("unfingerprinted-{}-{}", request_nonce, index));

    Ok(Alert {
        fingerprint,
        alert_name: raw
            .labels
            .get("alertname")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string()),
        status,
        labels: raw.labels.clone(),
        annotations: raw.annotations.clone(),
        starts_at,
        ends_at,
        generator_url: raw.generator_url.clone().unwrap_or_default(),
        received_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(fingerprint: Option<&str>) -> RawAlertEvent {
        RawAlertEvent {
            fingerprint: fingerprint.map(str::to_string),
            status: "firing".to_string(),
            labels: HashMap::from([
                ("alertname".to_string(), "DiskFull".to_string()),
                ("instance".to_string(), "db-1".to_string()),
            ]),
            starts_at: Some("2024-03-01T12:00:00Z".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("startsAt", "2024-03-01T12:00:00Z").unwrap(), expected);
        assert_eq!(
            parse_timestamp("startsAt", "2024-03-01T14:00:00+02:00").unwrap(),
            expected
        );
        assert!(parse_timestamp("startsAt", "2024-03-01T12:00:00.123456789Z").is_ok());
        assert!(matches!(
            parse_timestamp("startsAt", "yesterday"),
            Err(ParseError::InvalidTimestamp { field: "startsAt", .. })
        ));
    }

    #[test]
    fn test_parse_alert_fields() {
        let received = Utc::now();
        let alert = parse_alert(&raw(Some("abc123")), 0, "n", received).unwrap();
        assert_eq!(alert.fingerprint, "abc123");
        assert_eq!(alert.alert_name, "DiskFull");
        assert_eq!(alert.status, AlertStatus::Firing);
        assert!(alert.is_open());
        assert_eq!(alert.received_at, received);
    }

    #[test]
    fn test_zero_end_time_means_open() {
        let mut event = raw(Some("abc"));
        event.ends_at = Some("0001-01-01T00:00:00Z".to_string());
        assert!(parse_alert(&event, 0, "n", Utc::now()).unwrap().is_open());

        event.ends_at = Some("2024-03-01T13:00:00Z".to_string());
        event.status = "resolved".to_string();
        let alert = parse_alert(&event, 0, "n", Utc::now()).unwrap();
        assert_eq!(alert.ends_at, Some(Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap()));
    }

    #[test]
    fn test_parse_errors() {
        let mut event = raw(None);
        event.starts_at = None;
        assert_eq!(
            parse_alert(&event, 0, "n", Utc::now()),
            Err(ParseError::MissingField("startsAt"))
        );

        let mut event = raw(None);
        event.status = "pending".to_string();
        assert!(matches!(
            parse_alert(&event, 0, "n", Utc::now()),
            Err(ParseError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_fingerprint_derivation() {
        let mut a = raw(None);
        a.generator_url = Some("http://prom/graph?g0.expr=up".to_string());
        let mut b = a.clone();
        b.labels.insert("instance".to_string(), "db-2".to_string());

        let fa = parse_alert(&a, 0, "n", Utc::now()).unwrap().fingerprint;
        let fb = parse_alert(&b, 1, "n", Utc::now()).unwrap().fingerprint;
        assert_eq!(fa.len(), 16);
        assert_ne!(fa, fb);
        // Deterministic across requests
        assert_eq!(fa, parse_alert(&a, 5, "other", Utc::now()).unwrap().fingerprint);
    }

    #[test]
    fn test_placeholder_fingerprints_are_unique_per_item() {
        let event = raw(Some("  "));
        let first = parse_alert(&event, 0, "req1", Utc::now()).unwrap();
        let second = parse_alert(&event, 1, "req1", Utc::now()).unwrap();
        assert_ne!(first.fingerprint, second.fingerprint);
        assert!(first.fingerprint.starts_with("unfingerprinted-req1-"));
    }

    #[test]
    fn test_payload_decoding() {
        let body = br#"{
            "receiver": "ingest",
            "status": "firing",
            "groupKey": "{}:{alertname=\"DiskFull\"}",
            "externalURL": "http://alertmanager:9093",
            "alerts": [{
                "status": "firing",
                "labels": {"alertname": "DiskFull"},
                "annotations": {"summary": "disk at 95%"},
                "startsAt": "2024-03-01T12:00:00Z",
                "endsAt": "0001-01-01T00:00:00Z",
                "generatorURL": "http://prom/graph",
                "fingerprint": "f00d"
            }]
        }"#;
        let payload = WebhookPayload::from_json(body).unwrap();
        assert_eq!(payload.alerts.len(), 1);
        assert_eq!(payload.external_url.as_deref(), Some("http://alertmanager:9093"));
        assert_eq!(payload.alerts[0].generator_url.as_deref(), Some("http://prom/graph"));

        assert!(matches!(
            WebhookPayload::from_json(b"{\"alerts\": 3}"),
            Err(PipelineError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_idempotency_key_ignores_alert_order() {
        let a = raw(Some("a"));
        let b = raw(Some("b"));
        let first = WebhookPayload {
            alerts: vec![a.clone(), b.clone()],
            group_key: Some("g".to_string()),
            ..Default::default()
        };
        let second = WebhookPayload {
            alerts: vec![b, a.clone()],
            group_key: Some("g".to_string()),
            ..Default::default()
        };
        assert_eq!(first.idempotency_key(None), second.idempotency_key(None));

        let mut resolved = a;
        resolved.status = "resolved".to_string();
        let third = WebhookPayload {
            alerts: vec![resolved],
            group_key: Some("g".to_string()),
            ..Default::default()
        };
        assert_ne!(first.idempotency_key(None), third.idempotency_key(None));
    }

    #[test]
    fn test_idempotency_key_includes_explicit_mode() {
        let payload = WebhookPayload {
            alerts: vec![raw(Some("a"))],
            ..Default::default()
        };
        let enriched = payload.idempotency_key(Some(EnrichmentMode::Enriched));
        assert_ne!(enriched, payload.idempotency_key(Some(EnrichmentMode::Transparent)));
        assert_ne!(enriched, payload.idempotency_key(None));
        assert_eq!(enriched, payload.idempotency_key(Some(EnrichmentMode::Enriched)));
    }
}
