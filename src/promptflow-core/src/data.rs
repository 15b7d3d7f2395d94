//! Data threaded through a dialogue.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data accumulated over a dialogue run.
///
/// The runner owns the value for the duration of a run and replaces it with
/// whatever each transform returns. The responder id decides whose messages
/// the collectors listen to.
pub trait PromptData: Clone + Send + Sync + 'static {
    /// Identity of the user allowed to answer prompts.
    fn responder_id(&self) -> &str;
}

/// Open-ended key/value record carrying a responder id.
///
/// Updates are functional: [`with`](Record::with) returns a new record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    responder_id: String,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

impl Record {
    pub fn new(responder_id: impl Into<String>) -> Self {
        Self {
            responder_id: responder_id.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Copy of this record with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Copy of this record with `value` appended to the array at `key`.
    /// A missing or non-array field is replaced by a one-element array.
    pub fn with_appended(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.fields.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                self.fields.insert(key, Value::Array(vec![value]));
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// Array at `key`, or an empty slice.
    pub fn get_array(&self, key: &str) -> &[Value] {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> &serde_json::Map<String, Value> {
        &self.fields
    }
}

impl PromptData for Record {
    fn responder_id(&self) -> &str {
        &self.responder_id
    }
}
