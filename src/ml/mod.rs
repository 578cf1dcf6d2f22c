use crate::shared::config::PredictorConfig;
use crate::shared::error::TriageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Queue/criticality prediction for one ticket, plus the embedding of the
/// combined text for downstream retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_queue: String,
    pub queue_confidence: f64,
    pub critical_prob: f64,
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, text: &str) -> Result<Prediction, TriageError>;
}

/// Adapter for the model-serving endpoint that hosts the trained queue and
/// criticality classifiers. Pure function of the text and the loaded model
/// snapshot; the server owns model files and embedding generation.
pub struct HttpPredictor {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

impl HttpPredictor {
    pub fn new(config: &PredictorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, text: &str) -> Result<Prediction, TriageError> {
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&PredictRequest { text })
            .send()
            .await
            .map_err(|e| TriageError::Prediction(format!("predictor unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(TriageError::Prediction(format!(
                "predictor returned HTTP {}",
                response.status()
            )));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| TriageError::Prediction(format!("malformed prediction: {e}")))?;

        if !(0.0..=1.0).contains(&prediction.critical_prob) {
            return Err(TriageError::Prediction(format!(
                "critical_prob out of range: {}",
                prediction.critical_prob
            )));
        }

        Ok(prediction)
    }
}
