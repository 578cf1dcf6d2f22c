use crate::llm::DraftReply;
use crate::ml::Prediction;
use crate::retrieval::{context_summaries, SimilarTicket};
use crate::shared::config::TriageConfig;
use crate::shared::models::TicketStatus;
use crate::triage::policy;

/// Classification fields to write onto the ticket. Populated together or
/// not at all; when the predictor fails the safe defaults route toward
/// caution (generic queue, unknown confidence, assumed critical).
#[derive(Debug, Clone)]
pub struct Classification {
    pub predicted_queue: String,
    pub queue_confidence: f64,
    pub critical_prob: f64,
    pub is_critical: bool,
    pub from_fallback: bool,
}

pub fn classify(prediction: Option<&Prediction>, cfg: &TriageConfig) -> Classification {
    match prediction {
        Some(p) => Classification {
            predicted_queue: p.predicted_queue.clone(),
            queue_confidence: p.queue_confidence,
            critical_prob: p.critical_prob,
            is_critical: policy::is_critical(p.critical_prob, cfg.critical_threshold),
            from_fallback: false,
        },
        None => Classification {
            predicted_queue: cfg.fallback_queue.clone(),
            queue_confidence: 0.0,
            critical_prob: 0.5,
            is_critical: true,
            from_fallback: true,
        },
    }
}

#[derive(Debug, Clone)]
pub enum DraftAttempt {
    NotRequested,
    Failed(String),
    Generated(DraftReply),
}

/// A Response row to insert: the draft with the approval flag already
/// overridden by policy, plus the retrieval context actually used.
#[derive(Debug, Clone)]
pub struct PlannedResponse {
    pub draft: DraftReply,
    pub retrieval_context: Option<serde_json::Value>,
}

/// Everything one triage invocation will commit, computed without side
/// effects so the whole state machine is testable in isolation.
#[derive(Debug, Clone)]
pub struct TriagePlan {
    pub classification: Classification,
    pub status: TicketStatus,
    pub response: Option<PlannedResponse>,
    pub predicted_language: Option<String>,
    pub needs_approval: bool,
    pub draft_generated: bool,
}

impl TriagePlan {
    pub fn build(
        classification: Classification,
        draft: DraftAttempt,
        neighbors: &[SimilarTicket],
        cfg: &TriageConfig,
    ) -> Self {
        let is_critical = classification.is_critical;

        match draft {
            DraftAttempt::NotRequested => Self {
                classification,
                status: TicketStatus::Triaged,
                response: None,
                predicted_language: None,
                needs_approval: is_critical,
                draft_generated: false,
            },
            DraftAttempt::Failed(_) => Self {
                classification,
                status: TicketStatus::PendingApproval,
                response: None,
                predicted_language: None,
                needs_approval: true,
                draft_generated: false,
            },
            DraftAttempt::Generated(mut reply) => {
                let needs_approval = policy::needs_approval(
                    reply.needs_human_approval,
                    is_critical,
                    reply.confidence,
                    cfg.confidence_threshold,
                );
                reply.needs_human_approval = needs_approval;

                let retrieval_context = if neighbors.is_empty() {
                    None
                } else {
                    Some(serde_json::Value::Array(context_summaries(neighbors)))
                };

                Self {
                    classification,
                    status: if needs_approval {
                        TicketStatus::PendingApproval
                    } else {
                        TicketStatus::Drafted
                    },
                    predicted_language: Some(reply.language.clone()),
                    response: Some(PlannedResponse {
                        draft: reply,
                        retrieval_context,
                    }),
                    needs_approval,
                    draft_generated: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TriageConfig {
        TriageConfig {
            critical_threshold: 0.5,
            confidence_threshold: 0.7,
            fallback_queue: "Technical Support".to_string(),
            retrieval_k: 5,
        }
    }

    fn prediction(critical_prob: f64) -> Prediction {
        Prediction {
            predicted_queue: "Network Operations".to_string(),
            queue_confidence: 0.91,
            critical_prob,
            embedding: vec![0.1, 0.2, 0.3],
        }
    }

    fn reply(confidence: f64, needs_human_approval: bool) -> DraftReply {
        DraftReply {
            language: "en".to_string(),
            subject: "Re: issue".to_string(),
            body: "We are on it.".to_string(),
            confidence,
            needs_human_approval,
            suggested_tags: vec!["network".to_string()],
        }
    }

    fn neighbor() -> SimilarTicket {
        SimilarTicket {
            subject: "VPN drops".to_string(),
            body: "VPN keeps dropping".to_string(),
            answer: "Reinstall the client".to_string(),
            queue: "Network Operations".to_string(),
            priority: "high".to_string(),
            language: "en".to_string(),
            score: 0.87,
        }
    }

    #[test]
    fn classification_flag_matches_probability() {
        let c = classify(Some(&prediction(0.5)), &cfg());
        assert!(c.is_critical);
        let c = classify(Some(&prediction(0.49)), &cfg());
        assert!(!c.is_critical);
    }

    #[test]
    fn predictor_failure_applies_safe_defaults() {
        let c = classify(None, &cfg());
        assert_eq!(c.predicted_queue, "Technical Support");
        assert_eq!(c.queue_confidence, 0.0);
        assert_eq!(c.critical_prob, 0.5);
        assert!(c.is_critical);
        assert!(c.from_fallback);
    }

    // Scenario: critical_prob=0.98 with a drafted reply must land in
    // PENDING_APPROVAL no matter what the generator reported.
    #[test]
    fn critical_ticket_never_ends_drafted() {
        let classification = classify(Some(&prediction(0.98)), &cfg());
        let plan = TriagePlan::build(
            classification,
            DraftAttempt::Generated(reply(0.95, false)),
            &[],
            &cfg(),
        );
        assert_eq!(plan.status, TicketStatus::PendingApproval);
        assert!(plan.needs_approval);
        assert!(plan.response.unwrap().draft.needs_human_approval);
    }

    // Scenario: non-critical, confident, generator says no approval.
    #[test]
    fn confident_non_critical_ticket_is_drafted() {
        let classification = classify(Some(&prediction(0.1)), &cfg());
        let plan = TriagePlan::build(
            classification,
            DraftAttempt::Generated(reply(0.95, false)),
            &[neighbor()],
            &cfg(),
        );
        assert_eq!(plan.status, TicketStatus::Drafted);
        assert!(!plan.needs_approval);
        assert!(plan.draft_generated);
        assert_eq!(plan.predicted_language.as_deref(), Some("en"));
    }

    #[test]
    fn low_confidence_forces_approval() {
        let classification = classify(Some(&prediction(0.1)), &cfg());
        let plan = TriagePlan::build(
            classification,
            DraftAttempt::Generated(reply(0.55, false)),
            &[],
            &cfg(),
        );
        assert_eq!(plan.status, TicketStatus::PendingApproval);
    }

    #[test]
    fn generation_failure_leaves_no_partial_response() {
        let classification = classify(Some(&prediction(0.1)), &cfg());
        let plan = TriagePlan::build(
            classification,
            DraftAttempt::Failed("no valid draft after 3 attempts".to_string()),
            &[neighbor()],
            &cfg(),
        );
        assert_eq!(plan.status, TicketStatus::PendingApproval);
        assert!(plan.needs_approval);
        assert!(plan.response.is_none());
        assert!(!plan.draft_generated);
    }

    #[test]
    fn triage_without_draft_stops_at_triaged() {
        let classification = classify(Some(&prediction(0.8)), &cfg());
        let plan = TriagePlan::build(classification, DraftAttempt::NotRequested, &[], &cfg());
        assert_eq!(plan.status, TicketStatus::Triaged);
        assert!(plan.needs_approval);
        assert!(plan.response.is_none());
    }

    #[test]
    fn retrieval_context_records_used_neighbors_only() {
        let classification = classify(Some(&prediction(0.1)), &cfg());
        let neighbors = vec![neighbor(), neighbor(), neighbor(), neighbor(), neighbor()];
        let plan = TriagePlan::build(
            classification,
            DraftAttempt::Generated(reply(0.9, false)),
            &neighbors,
            &cfg(),
        );
        let ctx = plan.response.unwrap().retrieval_context.unwrap();
        assert_eq!(ctx.as_array().unwrap().len(), 3);
    }

    #[test]
    fn all_collaborators_down_still_routes_to_a_human() {
        let classification = classify(None, &cfg());
        let plan = TriagePlan::build(
            classification,
            DraftAttempt::Failed("llm unreachable".to_string()),
            &[],
            &cfg(),
        );
        assert_eq!(plan.status, TicketStatus::PendingApproval);
        assert!(plan.classification.is_critical);
        assert_eq!(plan.classification.predicted_queue, "Technical Support");
    }
}
