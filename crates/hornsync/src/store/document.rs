use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use super::StoreError;
use crate::horn::HornState;
use crate::horn::HornStatus;

const HORN_STATUS_PATH: [&str; 4] = ["features", "horn", "properties", "status"];

/// Format used for every timestamp written into a twin document.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A digital twin record.
///
/// The document is kept as free-form JSON so fields this service does not
/// know about survive every write. The only structural guarantee is a
/// non-empty string `thingId` at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct TwinDocument(Map<String, Value>);

impl TryFrom<Value> for TwinDocument {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(StoreError::InvalidDocument(
                "twin document must be a JSON object".to_string(),
            ));
        };

        match map.get("thingId") {
            Some(Value::String(id)) if !id.is_empty() => Ok(Self(map)),
            Some(_) => Err(StoreError::InvalidDocument(
                "thingId must be a non-empty string".to_string(),
            )),
            None => Err(StoreError::InvalidDocument(
                "twin document has no thingId".to_string(),
            )),
        }
    }
}

impl From<TwinDocument> for Value {
    fn from(doc: TwinDocument) -> Self {
        Value::Object(doc.0)
    }
}

impl TwinDocument {
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        Self::try_from(value)
    }

    /// A bare document carrying only the thing id and an OFF horn.
    pub fn new(thing_id: &str) -> Self {
        let mut map = Map::new();
        map.insert("thingId".to_string(), Value::String(thing_id.to_string()));
        let mut doc = Self(map);
        doc.horn_status_object()
            .insert("state".to_string(), Value::from(HornState::Off.to_string()));
        doc
    }

    pub fn thing_id(&self) -> &str {
        self.0
            .get("thingId")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Looks up a nested value by object keys.
    pub fn pointer(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |value, key| value.get(*key))
    }

    /// The recorded horn state, or `None` if the path is missing or holds
    /// anything other than `"ON"`/`"OFF"`.
    pub fn horn_state(&self) -> Option<HornState> {
        let mut path = HORN_STATUS_PATH.to_vec();
        path.push("state");
        match self.pointer(&path)?.as_str()? {
            "ON" => Some(HornState::On),
            "OFF" => Some(HornState::Off),
            _ => None,
        }
    }

    pub fn horn_status(&self) -> HornStatus {
        let status = self.pointer(&HORN_STATUS_PATH);
        HornStatus {
            state: self.horn_state(),
            activation_count: status
                .and_then(|s| s.get("activationCount"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
            last_activated: status
                .and_then(|s| s.get("lastActivated"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// Monotonic revision marker, `1` for documents that never carried one.
    pub fn revision(&self) -> u64 {
        self.pointer(&["_metadata", "_revision"])
            .and_then(Value::as_u64)
            .unwrap_or(1)
    }

    /// Records a horn state change and bumps the revision markers.
    ///
    /// Turning the horn ON increments `activationCount` and stamps
    /// `lastActivated`, even when it was already ON. Turning it OFF leaves
    /// both untouched.
    pub fn set_horn_state(&mut self, state: HornState, now: DateTime<Utc>) -> HornStatus {
        let stamp = timestamp(now);
        let status = self.horn_status_object();
        status.insert("state".to_string(), Value::from(state.to_string()));

        if state.is_on() {
            let count = status
                .get("activationCount")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            status.insert("activationCount".to_string(), Value::from(count + 1));
            status.insert("lastActivated".to_string(), Value::from(stamp));
        }

        self.touch(now);
        self.horn_status()
    }

    /// Bumps the modification markers after a write.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let stamp = timestamp(now);
        let revision = self.revision() + 1;

        let metadata = object_at(&mut self.0, &["_metadata"]);
        metadata.insert("modified".to_string(), Value::from(stamp.clone()));
        metadata.insert("_revision".to_string(), Value::from(revision));

        if let Some(Value::Object(meta)) = self
            .0
            .get_mut("attributes")
            .and_then(|attributes| attributes.get_mut("metadata"))
        {
            meta.insert("lastModified".to_string(), Value::from(stamp.clone()));
        }

        self.0.insert("_modified".to_string(), Value::from(stamp));
    }

    /// Stamps a freshly inserted document.
    pub(crate) fn stamp_created(&mut self, now: DateTime<Utc>) {
        let stamp = timestamp(now);
        self.0
            .entry("_created")
            .or_insert_with(|| Value::from(stamp.clone()));
        self.0.insert("_modified".to_string(), Value::from(stamp));

        let metadata = object_at(&mut self.0, &["_metadata"]);
        metadata
            .entry("_revision")
            .or_insert_with(|| Value::from(1u64));
    }

    /// Full replacement of `previous`. Creation time and revision carry over
    /// so the revision keeps increasing across replacements.
    pub(crate) fn replacing(
        mut self,
        previous: &TwinDocument,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        if self.thing_id() != previous.thing_id() {
            return Err(StoreError::InvalidDocument(format!(
                "thingId '{}' does not match '{}'",
                self.thing_id(),
                previous.thing_id()
            )));
        }

        if let Some(created) = previous.0.get("_created") {
            self.0.insert("_created".to_string(), created.clone());
        }
        let revision = previous.revision().max(self.revision());
        object_at(&mut self.0, &["_metadata"]).insert("_revision".to_string(), Value::from(revision));

        self.touch(now);
        Ok(self)
    }

    /// Applies a JSON merge patch (RFC 7386). `thingId` cannot be changed
    /// or removed this way.
    pub(crate) fn merge(&mut self, patch: &Value, now: DateTime<Utc>) -> Result<(), StoreError> {
        let Value::Object(fields) = patch else {
            return Err(StoreError::InvalidDocument(
                "merge patch must be a JSON object".to_string(),
            ));
        };

        if let Some(id) = fields.get("thingId") {
            if id.as_str() != Some(self.thing_id()) {
                return Err(StoreError::InvalidDocument(
                    "thingId cannot be changed by a merge".to_string(),
                ));
            }
        }

        let mut merged = Value::Object(std::mem::take(&mut self.0));
        merge_patch(&mut merged, patch);
        if let Value::Object(map) = merged {
            self.0 = map;
        }

        self.touch(now);
        Ok(())
    }

    fn horn_status_object(&mut self) -> &mut Map<String, Value> {
        object_at(&mut self.0, &HORN_STATUS_PATH)
    }
}

/// Walks `path`, creating (or overwriting non-object values with) empty
/// objects along the way.
fn object_at<'a>(root: &'a mut Map<String, Value>, path: &[&str]) -> &'a mut Map<String, Value> {
    let mut current = root;
    for key in path {
        let slot = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        };
    }
    current
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        for (key, value) in fields {
            if value.is_null() {
                map.remove(key);
            } else {
                merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
