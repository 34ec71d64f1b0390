//! Plain text rendering of twin documents for the CLI.

use std::fmt::Write;

use chrono::DateTime;
use chrono::Utc;
use serde_json::Value;

use crate::horn::HornStatus;
use crate::store::TwinDocument;

const NOT_AVAILABLE: &str = "N/A";

/// `2026-10-16T08:00:00.000Z` becomes `2026-10-16 08:00:00 UTC`; anything
/// unparseable becomes `N/A`.
pub fn format_timestamp(timestamp: Option<&str>) -> String {
    timestamp
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NOT_AVAILABLE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn line(out: &mut String, label: &str, value: impl AsRef<str>) {
    let _ = writeln!(out, "  {:<18}{}", format!("{}:", label), value.as_ref());
}

/// One line summary used by `monitor` and `seed`.
pub fn render_status(status: &HornStatus) -> String {
    format!(
        "state {} | activations {} | last activated {}",
        status
            .state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string()),
        status.activation_count,
        format_timestamp(status.last_activated.as_deref()),
    )
}

/// Full human readable summary of a twin.
pub fn render_twin(doc: &TwinDocument) -> String {
    let mut out = String::new();
    let get = |path: &[&str]| doc.pointer(path);

    let _ = writeln!(out, "{}", doc.thing_id());
    line(&mut out, "Policy ID", text(get(&["policyId"])));
    line(&mut out, "Definition", text(get(&["definition"])));

    out.push_str("\nMetadata\n");
    for (label, key) in [
        ("Manufacturer", "manufacturer"),
        ("Model", "model"),
        ("Version", "version"),
    ] {
        line(&mut out, label, text(get(&["attributes", "metadata", key])));
    }
    line(
        &mut out,
        "Last modified",
        format_timestamp(
            get(&["attributes", "metadata", "lastModified"]).and_then(Value::as_str),
        ),
    );

    if get(&["attributes", "identification"]).is_some() {
        out.push_str("\nIdentification\n");
        for (label, key) in [
            ("Vehicle ID", "vehicleId"),
            ("Serial number", "serialNumber"),
            ("VIN", "vin"),
        ] {
            line(&mut out, label, text(get(&["attributes", "identification", key])));
        }
    }

    let status = doc.horn_status();
    out.push_str("\nHorn\n");
    line(
        &mut out,
        "State",
        status
            .state
            .map(|s| s.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string()),
    );
    line(&mut out, "Activations", status.activation_count.to_string());
    line(
        &mut out,
        "Last activated",
        format_timestamp(status.last_activated.as_deref()),
    );
    if let Some(description) = get(&["features", "horn", "properties", "status", "description"]) {
        line(&mut out, "Description", text(Some(description)));
    }

    if get(&["features", "horn", "properties", "configuration"]).is_some() {
        out.push_str("\nConfiguration\n");
        let config = |key: &str| text(get(&["features", "horn", "properties", "configuration", key]));
        line(&mut out, "Enabled", config("enabled"));
        line(&mut out, "Volume", config("volume"));
        line(&mut out, "Pattern", config("pattern"));
        line(&mut out, "Max duration", format!("{} ms", config("maxDuration")));
    }

    if get(&["features", "horn", "properties", "hardware"]).is_some() {
        out.push_str("\nHardware\n");
        for (label, key) in [
            ("Type", "type"),
            ("Pin", "pin"),
            ("Voltage", "voltage"),
            ("Frequency", "frequency"),
        ] {
            line(
                &mut out,
                label,
                text(get(&["features", "horn", "properties", "hardware", key])),
            );
        }
    }

    out.push_str("\nStore\n");
    line(
        &mut out,
        "Created",
        format_timestamp(get(&["_created"]).and_then(Value::as_str)),
    );
    line(
        &mut out,
        "Modified",
        format_timestamp(get(&["_modified"]).and_then(Value::as_str)),
    );
    line(&mut out, "Revision", doc.revision().to_string());

    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::horn::HornState;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(Some("2026-10-16T08:00:00.000Z")),
            "2026-10-16 08:00:00 UTC"
        );
        assert_eq!(
            format_timestamp(Some("2026-10-16T10:00:00+02:00")),
            "2026-10-16 08:00:00 UTC"
        );
        assert_eq!(format_timestamp(Some("yesterday")), "N/A");
        assert_eq!(format_timestamp(None), "N/A");
    }

    #[test]
    fn test_render_status() {
        let status = HornStatus {
            state: Some(HornState::On),
            activation_count: 12,
            last_activated: Some("2026-10-16T08:00:00.000Z".to_string()),
        };
        insta::assert_snapshot!(
            render_status(&status),
            @"state ON | activations 12 | last activated 2026-10-16 08:00:00 UTC"
        );
        insta::assert_snapshot!(
            render_status(&HornStatus::default()),
            @"state UNKNOWN | activations 0 | last activated N/A"
        );
    }

    #[test]
    fn test_render_twin() {
        let doc = TwinDocument::from_value(json!({
            "thingId": "car:horn-car-001",
            "policyId": "car:horn-policy",
            "definition": "car:HornCar:1.0.0",
            "attributes": {
                "metadata": {
                    "manufacturer": "Example Motors",
                    "model": "Horn Car",
                    "version": "1.0.0",
                    "lastModified": "2026-10-16T08:00:00.000Z"
                }
            },
            "features": {
                "horn": {
                    "properties": {
                        "status": {
                            "state": "OFF",
                            "activationCount": 3,
                            "lastActivated": "2026-10-15T18:30:00.000Z"
                        },
                        "configuration": {
                            "enabled": true,
                            "volume": 80,
                            "pattern": "single",
                            "maxDuration": 3000
                        }
                    }
                }
            },
            "_created": "2026-10-01T00:00:00.000Z",
            "_modified": "2026-10-16T08:00:00.000Z",
            "_metadata": { "_revision": 7 }
        }))
        .unwrap();

        insta::assert_snapshot!(render_twin(&doc), @r"
        car:horn-car-001
          Policy ID:        car:horn-policy
          Definition:       car:HornCar:1.0.0

        Metadata
          Manufacturer:     Example Motors
          Model:            Horn Car
          Version:          1.0.0
          Last modified:    2026-10-16 08:00:00 UTC

        Horn
          State:            OFF
          Activations:      3
          Last activated:   2026-10-15 18:30:00 UTC

        Configuration
          Enabled:          true
          Volume:           80
          Pattern:          single
          Max duration:     3000 ms

        Store
          Created:          2026-10-01 00:00:00 UTC
          Modified:         2026-10-16 08:00:00 UTC
          Revision:         7
        ");
    }
}
