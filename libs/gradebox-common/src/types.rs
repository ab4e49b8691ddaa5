//! Wire format shared with the execution engine.
//!
//! Submissions travel as notebook JSON with control fields stored under the
//! top-level `metadata` object. Results travel as a flat JSON object: the
//! control fields sit at the top level and every other key is a part
//! (exercise) identifier mapping to an object with at least a `report` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const METADATA_KEY: &str = "metadata";
pub const SUBMISSION_ID_KEY: &str = "submission_id";
pub const USER_HASH_KEY: &str = "user_hash";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const REQUESTED_EXERCISE_KEY: &str = "requested_exercise_id";
pub const REPORT_KEY: &str = "report";

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no submission_id")]
    MissingSubmissionId,

    #[error("submission_id must be a string, got {0}")]
    SubmissionIdType(&'static str),
}

/// Control fields injected by ingestion so the engine can tag its results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub submission_id: String,
    pub user_hash: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_exercise_id: Option<String>,
}

impl SubmissionMetadata {
    /// Merge the control fields into a notebook document, creating the
    /// `metadata` object when it is missing or not an object. Existing
    /// metadata keys other than the control fields are preserved.
    pub fn inject_into(&self, notebook: &mut Map<String, Value>) {
        let metadata = notebook
            .entry(METADATA_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(fields) = metadata {
            fields.insert(SUBMISSION_ID_KEY.into(), Value::from(self.submission_id.clone()));
            fields.insert(USER_HASH_KEY.into(), Value::from(self.user_hash.clone()));
            fields.insert(TIMESTAMP_KEY.into(), Value::from(self.timestamp));
            if let Some(exercise_id) = &self.requested_exercise_id {
                fields.insert(REQUESTED_EXERCISE_KEY.into(), Value::from(exercise_id.clone()));
            }
        }
    }
}

/// Parse a payload that must be a JSON object.
pub fn parse_object(payload: &[u8]) -> Result<Map<String, Value>, WireError> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(WireError::NotAnObject),
    }
}

/// Pull the submission ID out of a result message.
pub fn extract_submission_id(payload: &[u8]) -> Result<String, WireError> {
    let message = parse_object(payload)?;
    match message.get(SUBMISSION_ID_KEY) {
        None => Err(WireError::MissingSubmissionId),
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Err(WireError::SubmissionIdType(json_type_name(other))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
