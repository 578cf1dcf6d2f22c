use crate::retrieval::SimilarTicket;
use crate::shared::config::LlmConfig;
use crate::shared::error::TriageError;
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_ATTEMPTS: usize = 3;

/// Structured draft reply. Every field here is required from the model;
/// an attempt that cannot produce all of them counts as failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftReply {
    pub language: String,
    pub subject: String,
    pub body: String,
    pub confidence: f64,
    pub needs_human_approval: bool,
    #[serde(default)]
    pub suggested_tags: Vec<String>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn draft(
        &self,
        subject: &str,
        body: &str,
        predicted_queue: &str,
        is_critical: bool,
        neighbors: &[SimilarTicket],
    ) -> Result<DraftReply, TriageError>;
}

/// Draft generation against an OpenAI-compatible chat-completions endpoint.
/// The model is instructed to answer with strict JSON; responses are
/// re-requested up to three times before the call is declared failed.
pub struct LlmGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmGenerator {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, TriageError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.3,
                "max_tokens": 2048
            }))
            .send()
            .await
            .map_err(|e| TriageError::Generation(format!("llm unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(TriageError::Generation(format!(
                "llm returned HTTP {}",
                response.status()
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| TriageError::Generation(format!("malformed completion: {e}")))?;

        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| TriageError::Generation("completion missing content".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn draft(
        &self,
        subject: &str,
        body: &str,
        predicted_queue: &str,
        is_critical: bool,
        neighbors: &[SimilarTicket],
    ) -> Result<DraftReply, TriageError> {
        let prompt = build_prompt(subject, body, predicted_queue, is_critical, neighbors);

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.complete(&prompt).await {
                Ok(raw) => match parse_draft(&raw) {
                    Ok(draft) => return Ok(draft),
                    Err(e) => {
                        warn!("draft parse failed (attempt {attempt}/{MAX_ATTEMPTS}): {e}");
                        last_error = e;
                    }
                },
                Err(e) => {
                    warn!("draft generation failed (attempt {attempt}/{MAX_ATTEMPTS}): {e}");
                    last_error = e.to_string();
                }
            }
        }

        Err(TriageError::Generation(format!(
            "no valid draft after {MAX_ATTEMPTS} attempts: {last_error}"
        )))
    }
}

fn build_prompt(
    subject: &str,
    body: &str,
    predicted_queue: &str,
    is_critical: bool,
    neighbors: &[SimilarTicket],
) -> String {
    let mut prompt = format!(
        "You are an expert IT support assistant. Generate a professional draft reply for the following IT support ticket.\n\n\
         TICKET INFORMATION:\n\
         Subject: {subject}\n\
         Body: {body}\n\
         Department: {predicted_queue}\n\
         Priority: {}\n\n",
        if is_critical { "HIGH (CRITICAL)" } else { "Normal" }
    );

    if !neighbors.is_empty() {
        prompt.push_str("SIMILAR HISTORICAL TICKETS (for reference):\n\n");
        for (i, ticket) in neighbors.iter().take(3).enumerate() {
            prompt.push_str(&format!(
                "Example {}:\nSubject: {}\nIssue: {:.200}...\nResolution: {:.200}...\nQueue: {}\n\n",
                i + 1,
                ticket.subject,
                ticket.body,
                ticket.answer,
                ticket.queue
            ));
        }
    }

    prompt.push_str(
        "\nINSTRUCTIONS:\n\
         1. Draft a professional, helpful reply suitable for corporate IT support\n\
         2. Detect the language of the ticket and respond in the SAME language\n\
         3. If information is missing, ask 1-2 specific clarifying questions\n\
         4. Do NOT hallucinate policies or make up information\n\
         5. Use the similar tickets above as reference for tone and approach (if provided)\n\
         6. Be concise but thorough\n\n\
         OUTPUT FORMAT (STRICT JSON ONLY):\n\
         Return ONLY a valid JSON object (no markdown, no explanation) with this exact structure:\n\
         {\n\
           \"language\": \"en|de|es|fr|etc\",\n\
           \"subject\": \"Reply subject line\",\n\
           \"body\": \"Full reply body text\",\n\
           \"confidence\": 0.0-1.0,\n\
           \"needs_human_approval\": true|false,\n\
           \"suggested_tags\": [\"tag1\", \"tag2\", \"tag3\"]\n\
         }\n\n\
         IMPORTANT: Return ONLY the JSON object, nothing else.\n",
    );

    prompt
}

/// Extract a JSON object from a model response that may be wrapped in code
/// fences or surrounding prose.
pub fn extract_json(response: &str) -> String {
    let response = response.trim();

    if let Some(start) = response.find("```") {
        if let Some(json_start) = response[start..].find('{') {
            let json_part = &response[start + json_start..];
            if let Some(end) = json_part.find("```") {
                return json_part[..end].trim().to_string();
            }
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            return response[start..=end].to_string();
        }
    }

    response.to_string()
}

/// Parse one completion into a structured draft. All five required fields
/// must be present; confidence is clamped to [0, 1].
pub fn parse_draft(raw: &str) -> Result<DraftReply, String> {
    let json = extract_json(raw);
    let mut draft: DraftReply =
        serde_json::from_str(&json).map_err(|e| format!("invalid draft JSON: {e}"))?;
    draft.confidence = draft.confidence.clamp(0.0, 1.0);
    Ok(draft)
}
