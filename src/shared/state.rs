use crate::approval::ApprovalCoordinator;
use crate::shared::config::AppConfig;
use crate::shared::utils::DbPool;
use crate::triage::TriageOrchestrator;
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
    pub orchestrator: Arc<TriageOrchestrator>,
    pub coordinator: Arc<ApprovalCoordinator>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
            orchestrator: Arc::clone(&self.orchestrator),
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}
