//! JSONL request record schema.
//!
//! One line of a request artifact is a [`RequestRecord`]; its `request` is
//! either a content-generation body (plural `contents`) or an embedding body
//! (singular `content` plus `task_type`).

use serde::{Deserialize, Serialize};

use gembatch_shared::{JobKind, TaskType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

impl Content {
    /// Single-part content holding `text`.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// Request body, discriminated by which field is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    Content {
        contents: Vec<Content>,
    },
    Embedding {
        content: Content,
        task_type: TaskType,
    },
}

impl RequestBody {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Content { .. } => JobKind::Content,
            Self::Embedding { .. } => JobKind::Embedding,
        }
    }
}

/// One line of a JSONL request artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Unique within one artifact; the provider echoes it on results.
    pub key: String,
    pub request: RequestBody,
}

impl RequestRecord {
    pub fn content(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            request: RequestBody::Content {
                contents: vec![Content::text(text)],
            },
        }
    }

    pub fn embedding(key: impl Into<String>, text: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            key: key.into(),
            request: RequestBody::Embedding {
                content: Content::text(text),
                task_type,
            },
        }
    }
}

/// Which request schema a converter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSchema {
    Content,
    /// Embedding records; the task type is fixed before conversion starts.
    Embedding(TaskType),
}

impl TargetSchema {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Content => JobKind::Content,
            Self::Embedding(_) => JobKind::Embedding,
        }
    }

    /// Build the record for the `index`-th (1-based) text.
    pub fn record(&self, index: usize, text: impl Into<String>) -> RequestRecord {
        let key = format!("request-{index}");
        match self {
            Self::Content => RequestRecord::content(key, text),
            Self::Embedding(task_type) => RequestRecord::embedding(key, text, *task_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_record_wire_shape() {
        let record = TargetSchema::Content.record(1, "Hello");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"key": "request-1", "request": {"contents": [{"parts": [{"text": "Hello"}]}]}})
        );
    }

    #[test]
    fn embedding_record_wire_shape() {
        let record = TargetSchema::Embedding(TaskType::Clustering).record(3, "doc");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "key": "request-3",
                "request": {"content": {"parts": [{"text": "doc"}]}, "task_type": "CLUSTERING"}
            })
        );
    }

    #[test]
    fn body_discriminated_by_field() {
        let content: RequestBody =
            serde_json::from_value(json!({"contents": [{"parts": [{"text": "a"}]}]})).unwrap();
        assert_eq!(content.kind(), JobKind::Content);

        let embedding: RequestBody = serde_json::from_value(json!({
            "content": {"parts": [{"text": "a"}]},
            "task_type": "RETRIEVAL_QUERY"
        }))
        .unwrap();
        assert_eq!(embedding.kind(), JobKind::Embedding);

        let neither = serde_json::from_value::<RequestBody>(json!({"prompt": "a"}));
        assert!(neither.is_err());
    }
}
