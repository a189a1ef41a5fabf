//! The task payload forwarded to workers.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{DispatchError, DispatchResult};

/// One unit of work: an audio record and the file it points at.
///
/// Fields beyond `audio_id` and `file_name` (target language, output
/// format, ...) are passed through to the worker untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRequest {
    pub audio_id: i64,
    pub file_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRequest {
    pub fn new(audio_id: i64, file_name: impl Into<String>) -> Self {
        Self {
            audio_id,
            file_name: file_name.into(),
            extra: Map::new(),
        }
    }

    /// Validate a raw JSON body.
    ///
    /// `audio_id` must be a JSON integer (not a string, float, or bool)
    /// and `file_name` a non-empty string.
    pub fn from_value(value: Value) -> DispatchResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(invalid("task body must be a JSON object"));
        };

        let audio_id = match map.remove("audio_id") {
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| invalid("audio_id must be an integer"))?,
            Some(_) => return Err(invalid("audio_id must be an integer")),
            None => return Err(invalid("audio_id is required")),
        };

        let file_name = match map.remove("file_name") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::String(_)) => return Err(invalid("file_name must not be empty")),
            Some(_) => return Err(invalid("file_name must be a string")),
            None => return Err(invalid("file_name is required")),
        };

        Ok(Self {
            audio_id,
            file_name,
            extra: map,
        })
    }
}

fn invalid(msg: &str) -> DispatchError {
    DispatchError::InvalidInput(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_integer_id_and_name() {
        let task = TaskRequest::from_value(json!({"audio_id": 42, "file_name": "a.wav"})).unwrap();
        assert_eq!(task, TaskRequest::new(42, "a.wav"));
    }

    #[test]
    fn keeps_extra_fields() {
        let task = TaskRequest::from_value(json!({
            "audio_id": 7,
            "file_name": "b.wav",
            "target_language": "ja",
            "format": "srt"
        }))
        .unwrap();
        assert_eq!(task.extra.len(), 2);

        let body = serde_json::to_value(&task).unwrap();
        assert_eq!(body["audio_id"], 7);
        assert_eq!(body["target_language"], "ja");
        assert_eq!(body["format"], "srt");
    }

    #[test]
    fn rejects_non_integer_audio_id() {
        for bad in [json!("42"), json!(4.2), json!(true), json!(null)] {
            let err = TaskRequest::from_value(json!({"audio_id": bad, "file_name": "a.wav"})).unwrap_err();
            assert!(matches!(err, DispatchError::InvalidInput(_)), "accepted {bad}");
        }
    }

    #[test]
    fn rejects_missing_or_empty_file_name() {
        assert!(TaskRequest::from_value(json!({"audio_id": 1})).is_err());
        assert!(TaskRequest::from_value(json!({"audio_id": 1, "file_name": " "})).is_err());
        assert!(TaskRequest::from_value(json!({"audio_id": 1, "file_name": 3})).is_err());
    }

    #[test]
    fn rejects_non_object_body() {
        assert!(TaskRequest::from_value(json!([1, 2])).is_err());
    }
}
