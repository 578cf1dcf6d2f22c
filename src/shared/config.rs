use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub triage: TriageConfig,
    pub predictor: PredictorConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Business-rule knobs for the triage workflow. The defaults reproduce the
/// stock behavior; both thresholds are deployment-configurable.
#[derive(Debug, Clone, Deserialize)]
pub struct TriageConfig {
    /// Criticality probability at or above which a ticket is critical.
    pub critical_threshold: f64,
    /// Draft confidence below which human approval is forced.
    pub confidence_threshold: f64,
    /// Queue assigned when the classifier is unavailable.
    pub fallback_queue: String,
    /// Neighbors requested from the retriever.
    pub retrieval_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub qdrant_url: String,
    pub collection: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenv().ok();

        Ok(Self {
            database: DatabaseConfig {
                url: env_or(
                    "DATABASE_URL",
                    "postgres://triage:@localhost:5432/triageserver",
                ),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", "10").parse()?,
            },
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: env_or("SERVER_PORT", "8000").parse()?,
            },
            triage: TriageConfig {
                critical_threshold: env_or("CRITICAL_THRESHOLD", "0.5").parse()?,
                confidence_threshold: env_or("CONFIDENCE_THRESHOLD", "0.7").parse()?,
                fallback_queue: env_or("FALLBACK_QUEUE", "Technical Support"),
                retrieval_k: env_or("RETRIEVAL_K", "5").parse()?,
            },
            predictor: PredictorConfig {
                url: env_or("PREDICTOR_URL", "http://localhost:8500"),
                timeout_secs: env_or("PREDICT_TIMEOUT_SECS", "10").parse()?,
            },
            retrieval: RetrievalConfig {
                qdrant_url: env_or("QDRANT_URL", "http://localhost:6334"),
                collection: env_or("QDRANT_COLLECTION", "tickets"),
                timeout_secs: env_or("RETRIEVAL_TIMEOUT_SECS", "5").parse()?,
            },
            llm: LlmConfig {
                api_key: env_or("LLM_API_KEY", ""),
                base_url: env_or("LLM_BASE_URL", "https://api.openai.com/v1"),
                model: env_or("LLM_MODEL", "gpt-4o-mini"),
                timeout_secs: env_or("GENERATE_TIMEOUT_SECS", "60").parse()?,
            },
            smtp: SmtpConfig {
                enabled: env_or("SMTP_ENABLED", "false").to_lowercase() == "true",
                host: env_or("SMTP_HOST", "localhost"),
                port: env_or("SMTP_PORT", "587").parse()?,
                user: env::var("SMTP_USER").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
                from: env_or("SMTP_FROM", "noreply@itsupport.com"),
                timeout_secs: env_or("NOTIFY_TIMEOUT_SECS", "15").parse()?,
            },
        })
    }
}

impl PredictorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SmtpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
