use crate::shared::config::RetrievalConfig;
use crate::shared::error::TriageError;
use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{SearchPointsBuilder, Value};
use qdrant_client::Qdrant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One historical ticket returned by similarity search, with the resolution
/// text that grounds draft generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarTicket {
    pub subject: String,
    pub body: String,
    pub answer: String,
    pub queue: String,
    pub priority: String,
    pub language: String,
    pub score: f32,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SimilarTicket>, TriageError>;
}

/// Qdrant-backed nearest-neighbor search over the prebuilt historical
/// ticket collection. Vectors are normalized at index time, so cosine
/// distance is configured on the collection itself.
pub struct QdrantRetriever {
    client: Qdrant,
    collection: String,
}

impl QdrantRetriever {
    pub fn new(config: &RetrievalConfig) -> Result<Self, TriageError> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .build()
            .map_err(|e| TriageError::Retrieval(format!("qdrant client: {e}")))?;
        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> String {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SimilarTicket>, TriageError> {
        let request =
            SearchPointsBuilder::new(&self.collection, embedding.to_vec(), k as u64)
                .with_payload(true);

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| TriageError::Retrieval(format!("qdrant search: {e}")))?;

        let results = response
            .result
            .into_iter()
            .map(|point| SimilarTicket {
                subject: payload_str(&point.payload, "subject"),
                body: payload_str(&point.payload, "body"),
                answer: payload_str(&point.payload, "answer"),
                queue: payload_str(&point.payload, "queue"),
                priority: payload_str(&point.payload, "priority"),
                language: payload_str(&point.payload, "language"),
                score: point.score,
            })
            .collect();

        Ok(results)
    }
}

/// Compact neighbor summaries actually handed to the generator and stored
/// on the Response as retrieval context. At most three, answers truncated.
pub fn context_summaries(neighbors: &[SimilarTicket]) -> Vec<serde_json::Value> {
    neighbors
        .iter()
        .take(3)
        .map(|t| {
            serde_json::json!({
                "subject": t.subject,
                "answer": truncate(&t.answer, 200),
            })
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(subject: &str, answer: &str) -> SimilarTicket {
        SimilarTicket {
            subject: subject.to_string(),
            body: String::new(),
            answer: answer.to_string(),
            queue: "IT".to_string(),
            priority: "medium".to_string(),
            language: "en".to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn context_keeps_at_most_three_neighbors() {
        let neighbors: Vec<_> = (0..5).map(|i| neighbor(&format!("t{i}"), "fix")).collect();
        assert_eq!(context_summaries(&neighbors).len(), 3);
    }

    #[test]
    fn context_truncates_long_answers() {
        let long = "x".repeat(500);
        let ctx = context_summaries(&[neighbor("subj", &long)]);
        assert_eq!(ctx[0]["answer"].as_str().unwrap().len(), 200);
    }

    #[test]
    fn empty_neighbor_set_is_valid() {
        assert!(context_summaries(&[]).is_empty());
    }
}
