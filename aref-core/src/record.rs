//! Stage results and the aggregate record
//!
//! A [`StageResult`] is a schema-less JSON document. The core stores and
//! merges it but never looks inside; adapters build it from their own typed
//! structs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Opaque stage payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageResult(Map<String, Value>);

impl StageResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit `{"error": msg}` marker for failures a stage catches itself
    pub fn error(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("error".to_string(), Value::String(message.into()));
        Self(map)
    }

    /// Serialize a typed adapter payload into a stage result
    pub fn from_serialize<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(payload)? {
            Value::Object(map) => Ok(Self(map)),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Ok(Self(map))
            }
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Follow a dotted path (`osint.shodan`) through nested objects
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = self.0.get(parts.next()?)?;
        parts.try_fold(first, |value, part| value.get(part))
    }

    pub fn is_error(&self) -> bool {
        self.0.contains_key("error")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for StageResult {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Stage name -> stage output, for one target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateRecord {
    stages: BTreeMap<String, StageResult>,
}

impl AggregateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stage's output. Later writes for the same stage replace earlier ones.
    pub fn insert(&mut self, stage: &str, result: StageResult) {
        self.stages.insert(stage.to_string(), result);
    }

    pub fn get(&self, stage: &str) -> Option<&StageResult> {
        self.stages.get(stage)
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.stages.contains_key(stage)
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageResult)> {
        self.stages.iter().map(|(name, result)| (name.as_str(), result))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
