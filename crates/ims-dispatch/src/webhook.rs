// SPDX-License-Identifier: Apache-2.0
//! Reconstructs a webhook payload from an IMS activity-log entry,
//! grounded on `pd.ile_to_webhook` in the original source.

use serde_json::{json, Value};

/// Build the webhook envelope for a single activity-log entry `ile`.
/// Returns `None` if a services allow-list is configured and the
/// incident's service id is absent from it.
pub fn reconstruct(ile: &Value, services_allowlist: Option<&[String]>, webhook_config: Option<&Value>) -> Option<Value> {
    let event_type = ile.get("type").and_then(Value::as_str).unwrap_or("");
    let event = event_type.split('_').next().unwrap_or("");

    let short_service = ile.pointer("/incident/service")?.clone();
    if let Some(allowlist) = services_allowlist {
        let service_id = short_service.get("id").and_then(Value::as_str).unwrap_or("");
        if !allowlist.iter().any(|id| id == service_id) {
            return None;
        }
    }

    let long_service = ile.get("service").cloned().unwrap_or(Value::Null);
    let mut long_incident = ile.get("incident").cloned().unwrap_or(Value::Null);

    let short_incident = json!({
        "id": long_incident.get("id"),
        "type": "incident_reference",
        "summary": long_incident.get("summary"),
        "self": long_incident.get("self"),
        "html_url": long_incident.get("html_url"),
    });

    if let Some(map) = long_incident.as_object_mut() {
        map.insert("service".to_string(), long_service);
    }

    let mut log_entry = ile.clone();
    if let Some(map) = log_entry.as_object_mut() {
        map.insert("incident".to_string(), short_incident);
        map.insert("service".to_string(), short_service);
    }

    let mut message = json!({
        "event": format!("incident.{event}"),
        "log_entries": [log_entry],
        "incident": long_incident,
    });
    if let Some(config) = webhook_config {
        if let Some(map) = message.as_object_mut() {
            map.insert("webhook".to_string(), json!({"config": config}));
        }
    }

    Some(json!({"messages": [message]}))
}

/// The incident id an activity-log entry belongs to, used to key the
/// per-incident delivery chain.
pub fn incident_id(ile: &Value) -> Option<String> {
    ile.pointer("/incident/id").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Value {
        json!({
            "id": "ile1",
            "type": "trigger_log_entry",
            "incident": {
                "id": "inc1",
                "summary": "it broke",
                "self": "https://api/incidents/inc1",
                "html_url": "https://app/incidents/inc1",
                "service": {"id": "svc1", "summary": "short svc"},
            },
            "service": {"id": "svc1", "summary": "long svc", "escalation_policy": {}},
        })
    }

    #[test]
    fn reconstructs_envelope_with_short_incident_reference() {
        let webhook = reconstruct(&sample_entry(), None, None).unwrap();
        let message = &webhook["messages"][0];
        assert_eq!(message["event"], json!("incident.trigger"));
        assert_eq!(message["incident"]["service"]["summary"], json!("long svc"));
        let logged = &message["log_entries"][0];
        assert_eq!(logged["incident"]["type"], json!("incident_reference"));
        assert_eq!(logged["service"]["summary"], json!("short svc"));
    }

    #[test]
    fn drops_when_service_not_allowlisted() {
        let allowlist = vec!["other-svc".to_string()];
        assert!(reconstruct(&sample_entry(), Some(&allowlist), None).is_none());
    }

    #[test]
    fn includes_webhook_config_when_present() {
        let config = json!({"custom": true});
        let webhook = reconstruct(&sample_entry(), None, Some(&config)).unwrap();
        assert_eq!(webhook["messages"][0]["webhook"]["config"], config);
    }

    #[test]
    fn incident_id_reads_nested_field() {
        assert_eq!(incident_id(&sample_entry()), Some("inc1".to_string()));
    }
}
