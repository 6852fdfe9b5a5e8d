//! Embedding task-type recommendation.
//!
//! Keyword heuristic over the caller's description of what the embeddings are
//! for. Advisory only: nothing downstream requires the suggestion to be used.

use serde::{Deserialize, Serialize};

use gembatch_shared::TaskType;

/// Suggested task type with a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeRecommendation {
    pub selected_task_type: TaskType,
    pub confidence: f32,
    pub reasoning: String,
}

/// Ordered rules: first match wins.
const RULES: &[(&[&str], TaskType, f32, &str)] = &[
    (
        &["similar", "recommend"],
        TaskType::SemanticSimilarity,
        0.9,
        "similarity or recommendation use case",
    ),
    (
        &["categor", "classif"],
        TaskType::Classification,
        0.9,
        "categorization or classification use case",
    ),
    (
        &["search", "retriev"],
        TaskType::RetrievalDocument,
        0.8,
        "search or retrieval use case",
    ),
];

const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Recommend an embedding task type from a free-text context.
///
/// `samples` are accepted for a future content-based classifier and do not
/// affect the score.
pub fn recommend_task_type(context: &str, samples: &[String]) -> TaskTypeRecommendation {
    let lowered = context.to_lowercase();

    let (selected_task_type, confidence, mut reasoning) = RULES
        .iter()
        .find_map(|(keywords, task_type, confidence, why)| {
            keywords
                .iter()
                .find(|k| lowered.contains(*k))
                .map(|k| (*task_type, *confidence, format!("Context mentions `{k}`: {why}.")))
        })
        .unwrap_or_else(|| {
            (
                TaskType::RetrievalDocument,
                DEFAULT_CONFIDENCE,
                "No specific use case recognized; RETRIEVAL_DOCUMENT is the general-purpose default."
                    .to_string(),
            )
        });

    if !samples.is_empty() {
        reasoning.push_str(&format!(
            " {} sample text(s) provided but not used for scoring.",
            samples.len()
        ));
    }

    TaskTypeRecommendation {
        selected_task_type,
        confidence,
        reasoning,
    }
}
