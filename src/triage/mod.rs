pub mod plan;
pub mod policy;

use crate::audit::{self, AuditAction, SYSTEM_ACTOR};
use crate::llm::Generator;
use crate::ml::Predictor;
use crate::retrieval::{Retriever, SimilarTicket};
use crate::shared::config::{AppConfig, TriageConfig};
use crate::shared::error::TriageError;
use crate::shared::locks::TicketLocks;
use crate::shared::models::{Ticket, TicketResponse, TicketStatus};
use crate::shared::schema::{responses, tickets};
use crate::shared::utils::DbPool;
use chrono::Utc;
use diesel::prelude::*;
use log::{error, info, warn};
use plan::{Classification, DraftAttempt, TriagePlan};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TriageSummary {
    pub success: bool,
    pub message: String,
    pub ticket_id: Uuid,
    pub predicted_queue: String,
    pub queue_confidence: f64,
    pub critical_prob: f64,
    pub is_critical: bool,
    pub predicted_language: Option<String>,
    pub draft_generated: bool,
    pub needs_approval: bool,
    pub status: TicketStatus,
}

/// Drives a ticket from NEW through TRIAGED to DRAFTED or
/// PENDING_APPROVAL. Each collaborator call is bounded by a timeout and
/// has a fallback, so no downstream outage blocks the workflow; all
/// mutations of one invocation commit as a single transaction.
pub struct TriageOrchestrator {
    conn: DbPool,
    locks: TicketLocks,
    predictor: Arc<dyn Predictor>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    cfg: TriageConfig,
    predict_timeout: Duration,
    retrieval_timeout: Duration,
    generate_timeout: Duration,
}

impl TriageOrchestrator {
    pub fn new(
        conn: DbPool,
        locks: TicketLocks,
        predictor: Arc<dyn Predictor>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        config: &AppConfig,
    ) -> Self {
        Self {
            conn,
            locks,
            predictor,
            retriever,
            generator,
            cfg: config.triage.clone(),
            predict_timeout: config.predictor.timeout(),
            retrieval_timeout: config.retrieval.timeout(),
            generate_timeout: config.llm.timeout(),
        }
    }

    pub async fn triage(
        &self,
        ticket_id: Uuid,
        run_draft: bool,
    ) -> Result<TriageSummary, TriageError> {
        let _guard = self.locks.acquire(ticket_id).await;

        // The pool connection is released before the external calls and
        // re-acquired for the commit, so a slow collaborator never pins it.
        let ticket: Ticket = {
            let mut conn = self.conn.get()?;
            tickets::table
                .filter(tickets::id.eq(ticket_id))
                .first(&mut conn)
                .optional()?
                .ok_or_else(|| TriageError::NotFound(format!("Ticket {ticket_id} not found")))?
        };

        info!("starting triage for ticket {ticket_id}");

        // Step 1: classification. Failure applies safe defaults instead of
        // aborting, so the ticket always leaves this step routable.
        let text = format!("{}\n\n{}", ticket.subject, ticket.body);
        let prediction = match timeout(self.predict_timeout, self.predictor.predict(&text)).await {
            Ok(Ok(p)) => {
                info!(
                    "predicted {} (conf={:.2}, crit={:.2}) for ticket {ticket_id}",
                    p.predicted_queue, p.queue_confidence, p.critical_prob
                );
                Some(p)
            }
            Ok(Err(e)) => {
                error!("prediction failed for ticket {ticket_id}: {e}");
                None
            }
            Err(_) => {
                error!("prediction timed out for ticket {ticket_id}");
                None
            }
        };

        // Step 2: retrieval is advisory grounding, never a hard dependency.
        let neighbors = self.retrieve(ticket_id, prediction.as_ref().map(|p| &p.embedding[..])).await;

        let classification = plan::classify(prediction.as_ref(), &self.cfg);

        // Step 3: draft generation, degrading toward human oversight.
        let draft = if run_draft {
            self.generate(&ticket, &classification, &neighbors).await
        } else {
            DraftAttempt::NotRequested
        };

        let plan = TriagePlan::build(classification, draft, &neighbors, &self.cfg);

        let mut conn = self.conn.get()?;
        let summary = conn.transaction::<_, TriageError, _>(|conn| {
            self.apply(conn, &ticket, &plan, prediction.is_some())
        })?;

        info!(
            "triage complete for ticket {ticket_id} (status={})",
            summary.status.as_str()
        );

        Ok(summary)
    }

    async fn retrieve(&self, ticket_id: Uuid, embedding: Option<&[f32]>) -> Vec<SimilarTicket> {
        let Some(embedding) = embedding else {
            return Vec::new();
        };

        match timeout(
            self.retrieval_timeout,
            self.retriever.search(embedding, self.cfg.retrieval_k),
        )
        .await
        {
            Ok(Ok(neighbors)) => {
                info!("found {} similar tickets for {ticket_id}", neighbors.len());
                neighbors
            }
            Ok(Err(e)) => {
                warn!("retrieval failed for ticket {ticket_id}: {e} (continuing without context)");
                Vec::new()
            }
            Err(_) => {
                warn!("retrieval timed out for ticket {ticket_id} (continuing without context)");
                Vec::new()
            }
        }
    }

    async fn generate(
        &self,
        ticket: &Ticket,
        classification: &Classification,
        neighbors: &[SimilarTicket],
    ) -> DraftAttempt {
        match timeout(
            self.generate_timeout,
            self.generator.draft(
                &ticket.subject,
                &ticket.body,
                &classification.predicted_queue,
                classification.is_critical,
                neighbors,
            ),
        )
        .await
        {
            Ok(Ok(reply)) => DraftAttempt::Generated(reply),
            Ok(Err(e)) => {
                error!("draft generation failed for ticket {}: {e}", ticket.id);
                DraftAttempt::Failed(e.to_string())
            }
            Err(_) => {
                error!("draft generation timed out for ticket {}", ticket.id);
                DraftAttempt::Failed("generation timed out".to_string())
            }
        }
    }

    /// Persist one triage plan atomically: classification fields, status,
    /// the new Response row, and the audit entries.
    fn apply(
        &self,
        conn: &mut PgConnection,
        ticket: &Ticket,
        plan: &TriagePlan,
        prediction_succeeded: bool,
    ) -> Result<TriageSummary, TriageError> {
        let now = Utc::now();
        let c = &plan.classification;

        diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
            .set((
                tickets::predicted_queue.eq(Some(c.predicted_queue.clone())),
                tickets::queue_confidence.eq(Some(c.queue_confidence)),
                tickets::critical_prob.eq(Some(c.critical_prob)),
                tickets::is_critical.eq(c.is_critical),
                tickets::status.eq(plan.status),
                tickets::triaged_at.eq(Some(now)),
                tickets::updated_at.eq(now),
            ))
            .execute(conn)?;

        if let Some(language) = &plan.predicted_language {
            diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
                .set(tickets::predicted_language.eq(Some(language.clone())))
                .execute(conn)?;
        }

        if prediction_succeeded {
            audit::record(
                conn,
                ticket.id,
                AuditAction::MlPrediction,
                SYSTEM_ACTOR,
                serde_json::json!({
                    "queue": c.predicted_queue,
                    "confidence": c.queue_confidence,
                    "critical_prob": c.critical_prob,
                }),
            )?;
        }

        if let Some(planned) = &plan.response {
            let draft = &planned.draft;
            let response = TicketResponse {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                draft_language: Some(draft.language.clone()),
                draft_subject: Some(draft.subject.clone()),
                draft_body: Some(draft.body.clone()),
                draft_confidence: Some(draft.confidence),
                needs_human_approval: draft.needs_human_approval,
                suggested_tags: serde_json::json!(draft.suggested_tags),
                retrieval_context: planned.retrieval_context.clone(),
                final_subject: None,
                final_body: None,
                created_at: now,
                approved_at: None,
            };

            diesel::insert_into(responses::table)
                .values(&response)
                .execute(conn)?;

            audit::record(
                conn,
                ticket.id,
                AuditAction::DraftGenerated,
                SYSTEM_ACTOR,
                serde_json::json!({
                    "confidence": draft.confidence,
                    "needs_approval": plan.needs_approval,
                }),
            )?;
        }

        Ok(TriageSummary {
            success: true,
            message: format!(
                "Ticket triaged successfully. Status: {}",
                plan.status.as_str()
            ),
            ticket_id: ticket.id,
            predicted_queue: c.predicted_queue.clone(),
            queue_confidence: c.queue_confidence,
            critical_prob: c.critical_prob,
            is_critical: c.is_critical,
            predicted_language: plan.predicted_language.clone(),
            draft_generated: plan.draft_generated,
            needs_approval: plan.needs_approval,
            status: plan.status,
        })
    }
}
