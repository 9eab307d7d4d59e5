// SPDX-License-Identifier: Apache-2.0
//! Destination types and v2 ingress payload validation.

use serde_json::Value;

use crate::error::InvalidPayload;

/// Where an event is destined, selecting the egress URL shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationType {
    /// `{base_url}/v2/enqueue`.
    V2,
    /// `{base_url}/integration/{routing_key}/enqueue`.
    V1,
    Cet,
    Raw,
    /// `{base_url}/x-ere/{routing_key}`.
    XEre,
    Routing,
    Ger,
}

impl DestinationType {
    /// Parse a destination-type string as used in configuration/ingress
    /// routing; unrecognized values fall back to `v2`, matching the
    /// original's `url_for_routing_key` default branch.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "v1" => Self::V1,
            "cet" => Self::Cet,
            "raw" => Self::Raw,
            "x-ere" => Self::XEre,
            "routing" => Self::Routing,
            "ger" => Self::Ger,
            _ => Self::V2,
        }
    }

    /// Build the full egress URL for `base_url` and `routing_key`.
    pub fn url(self, base_url: &str, routing_key: &str) -> String {
        match self {
            Self::V2 => format!("{base_url}/v2/enqueue"),
            Self::V1 | Self::Cet | Self::Raw => {
                format!("{base_url}/integration/{routing_key}/enqueue")
            }
            Self::XEre | Self::Routing | Self::Ger => format!("{base_url}/x-ere/{routing_key}"),
        }
    }
}

/// Validate a strict v2 event payload: `event_action` must be one of
/// `trigger`/`acknowledge`/`resolve`; a `trigger` additionally requires
/// `payload.severity` in the known set and non-empty `summary`/`source`.
pub fn validate_v2_payload(payload: &Value) -> Result<(), InvalidPayload> {
    let action = payload
        .get("event_action")
        .and_then(Value::as_str)
        .ok_or(InvalidPayload::BadV2Payload)?;
    if !matches!(action, "trigger" | "acknowledge" | "resolve") {
        return Err(InvalidPayload::BadV2Payload);
    }
    if action == "trigger" {
        let inner = payload.get("payload").ok_or(InvalidPayload::BadV2Payload)?;
        let severity = inner
            .get("severity")
            .and_then(Value::as_str)
            .ok_or(InvalidPayload::BadV2Payload)?;
        if !matches!(severity, "info" | "warning" | "error" | "critical") {
            return Err(InvalidPayload::BadV2Payload);
        }
        let summary = inner.get("summary").and_then(Value::as_str).unwrap_or("");
        let source = inner.get("source").and_then(Value::as_str).unwrap_or("");
        if summary.is_empty() || source.is_empty() {
            return Err(InvalidPayload::BadV2Payload);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v2_url_routes_by_destination_type() {
        assert_eq!(DestinationType::V2.url("https://e", "rk"), "https://e/v2/enqueue");
        assert_eq!(DestinationType::V1.url("https://e", "rk"), "https://e/integration/rk/enqueue");
        assert_eq!(DestinationType::XEre.url("https://e", "rk"), "https://e/x-ere/rk");
    }

    #[test]
    fn valid_trigger_payload_passes() {
        let payload = json!({
            "event_action": "trigger",
            "payload": {"severity": "critical", "summary": "down", "source": "host1"},
        });
        assert!(validate_v2_payload(&payload).is_ok());
    }

    #[test]
    fn resolve_does_not_require_payload_block() {
        let payload = json!({"event_action": "resolve"});
        assert!(validate_v2_payload(&payload).is_ok());
    }

    #[test]
    fn trigger_missing_summary_is_rejected() {
        let payload = json!({
            "event_action": "trigger",
            "payload": {"severity": "critical", "summary": "", "source": "host1"},
        });
        assert!(validate_v2_payload(&payload).is_err());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let payload = json!({"event_action": "explode"});
        assert!(validate_v2_payload(&payload).is_err());
    }
}
