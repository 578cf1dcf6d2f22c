//! End-to-end workflow tests driven through mock collaborators. The
//! classification, retrieval, drafting, and routing steps run exactly as
//! the orchestrator composes them, without a database or network.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;

use triageserver::email::{DeliveryResult, Notifier};
use triageserver::llm::{DraftReply, Generator};
use triageserver::ml::{Prediction, Predictor};
use triageserver::retrieval::{Retriever, SimilarTicket};
use triageserver::shared::config::TriageConfig;
use triageserver::shared::error::TriageError;
use triageserver::shared::locks::TicketLocks;
use triageserver::shared::models::TicketStatus;
use triageserver::triage::plan::{classify, DraftAttempt, TriagePlan};
use uuid::Uuid;

fn test_config() -> TriageConfig {
    TriageConfig {
        critical_threshold: 0.5,
        confidence_threshold: 0.7,
        fallback_queue: "Technical Support".to_string(),
        retrieval_k: 5,
    }
}

struct FixedPredictor {
    critical_prob: f64,
}

#[async_trait]
impl Predictor for FixedPredictor {
    async fn predict(&self, _text: &str) -> Result<Prediction, TriageError> {
        Ok(Prediction {
            predicted_queue: "Billing".to_string(),
            queue_confidence: 0.88,
            critical_prob: self.critical_prob,
            embedding: vec![0.5; 8],
        })
    }
}

struct DownPredictor;

#[async_trait]
impl Predictor for DownPredictor {
    async fn predict(&self, _text: &str) -> Result<Prediction, TriageError> {
        Err(TriageError::Prediction("connection refused".to_string()))
    }
}

struct SlowPredictor;

#[async_trait]
impl Predictor for SlowPredictor {
    async fn predict(&self, _text: &str) -> Result<Prediction, TriageError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("the call must be cut off by its timeout")
    }
}

struct FixedRetriever {
    neighbors: usize,
}

#[async_trait]
impl Retriever for FixedRetriever {
    async fn search(&self, _embedding: &[f32], k: usize) -> Result<Vec<SimilarTicket>, TriageError> {
        Ok((0..self.neighbors.min(k))
            .map(|i| SimilarTicket {
                subject: format!("Similar issue {i}"),
                body: "Printer offline after driver update".to_string(),
                answer: "Roll back the driver and reboot the print spooler".to_string(),
                queue: "Billing".to_string(),
                priority: "medium".to_string(),
                language: "en".to_string(),
                score: 0.9 - i as f32 * 0.05,
            })
            .collect())
    }
}

struct FixedGenerator {
    confidence: f64,
    needs_human_approval: bool,
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn draft(
        &self,
        subject: &str,
        _body: &str,
        _predicted_queue: &str,
        _is_critical: bool,
        _neighbors: &[SimilarTicket],
    ) -> Result<DraftReply, TriageError> {
        Ok(DraftReply {
            language: "en".to_string(),
            subject: format!("Re: {subject}"),
            body: "Thanks for reaching out. We are looking into it.".to_string(),
            confidence: self.confidence,
            needs_human_approval: self.needs_human_approval,
            suggested_tags: vec!["billing".to_string()],
        })
    }
}

struct BrokenGenerator;

#[async_trait]
impl Generator for BrokenGenerator {
    async fn draft(
        &self,
        _subject: &str,
        _body: &str,
        _predicted_queue: &str,
        _is_critical: bool,
        _neighbors: &[SimilarTicket],
    ) -> Result<DraftReply, TriageError> {
        Err(TriageError::Generation(
            "no valid draft after 3 attempts".to_string(),
        ))
    }
}

struct RecordingNotifier;

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        _to_email: &str,
        _to_name: &str,
        _subject: &str,
        _body: &str,
        _ticket_id: Uuid,
    ) -> DeliveryResult {
        DeliveryResult::delivered()
    }
}

/// Run the triage pipeline the way the orchestrator does, against mocks.
async fn run_pipeline(
    predictor: &dyn Predictor,
    retriever: &dyn Retriever,
    generator: &dyn Generator,
    cfg: &TriageConfig,
) -> TriagePlan {
    let prediction = timeout(Duration::from_millis(200), predictor.predict("subject\n\nbody"))
        .await
        .ok()
        .and_then(|r| r.ok());

    let neighbors = match prediction.as_ref() {
        Some(p) => retriever.search(&p.embedding, cfg.retrieval_k).await.unwrap_or_default(),
        None => Vec::new(),
    };

    let classification = classify(prediction.as_ref(), cfg);

    let draft = match generator
        .draft("subject", "body", &classification.predicted_queue, classification.is_critical, &neighbors)
        .await
    {
        Ok(reply) => DraftAttempt::Generated(reply),
        Err(e) => DraftAttempt::Failed(e.to_string()),
    };

    TriagePlan::build(classification, draft, &neighbors, cfg)
}

#[tokio::test]
async fn confident_non_critical_ticket_flows_to_drafted() {
    let plan = run_pipeline(
        &FixedPredictor { critical_prob: 0.1 },
        &FixedRetriever { neighbors: 5 },
        &FixedGenerator {
            confidence: 0.92,
            needs_human_approval: false,
        },
        &test_config(),
    )
    .await;

    assert_eq!(plan.status, TicketStatus::Drafted);
    assert!(!plan.needs_approval);
    let response = plan.response.expect("a drafted ticket has a response");
    assert!(!response.draft.needs_human_approval);
    assert!(response.retrieval_context.is_some());
}

#[tokio::test]
async fn critical_ticket_is_held_for_approval_despite_confident_draft() {
    let plan = run_pipeline(
        &FixedPredictor { critical_prob: 0.98 },
        &FixedRetriever { neighbors: 5 },
        &FixedGenerator {
            confidence: 0.95,
            needs_human_approval: false,
        },
        &test_config(),
    )
    .await;

    assert_eq!(plan.status, TicketStatus::PendingApproval);
    assert!(plan.needs_approval);
    // The stored flag reflects the routing decision, not the model's claim.
    assert!(plan.response.unwrap().draft.needs_human_approval);
}

#[tokio::test]
async fn generator_outage_routes_to_human_without_a_draft() {
    let plan = run_pipeline(
        &FixedPredictor { critical_prob: 0.1 },
        &FixedRetriever { neighbors: 5 },
        &BrokenGenerator,
        &test_config(),
    )
    .await;

    assert_eq!(plan.status, TicketStatus::PendingApproval);
    assert!(plan.response.is_none());
    // Classification survives the generation failure.
    assert_eq!(plan.classification.predicted_queue, "Billing");
    assert!(!plan.classification.from_fallback);
}

#[tokio::test]
async fn predictor_outage_applies_fallback_and_assumes_critical() {
    let plan = run_pipeline(
        &DownPredictor,
        &FixedRetriever { neighbors: 5 },
        &FixedGenerator {
            confidence: 0.95,
            needs_human_approval: false,
        },
        &test_config(),
    )
    .await;

    assert_eq!(plan.classification.predicted_queue, "Technical Support");
    assert!(plan.classification.is_critical);
    assert!(plan.classification.from_fallback);
    // Assumed criticality forces the approval gate.
    assert_eq!(plan.status, TicketStatus::PendingApproval);
}

#[tokio::test]
async fn hung_predictor_is_cut_off_and_treated_as_unavailable() {
    let plan = run_pipeline(
        &SlowPredictor,
        &FixedRetriever { neighbors: 5 },
        &FixedGenerator {
            confidence: 0.95,
            needs_human_approval: false,
        },
        &test_config(),
    )
    .await;

    assert!(plan.classification.from_fallback);
    assert_eq!(plan.status, TicketStatus::PendingApproval);
}

#[tokio::test]
async fn low_draft_confidence_forces_approval() {
    let plan = run_pipeline(
        &FixedPredictor { critical_prob: 0.1 },
        &FixedRetriever { neighbors: 0 },
        &FixedGenerator {
            confidence: 0.6,
            needs_human_approval: false,
        },
        &test_config(),
    )
    .await;

    assert_eq!(plan.status, TicketStatus::PendingApproval);
    assert!(plan.response.unwrap().retrieval_context.is_none());
}

#[tokio::test]
async fn concurrent_triage_of_one_ticket_is_serialized() {
    let locks = TicketLocks::new();
    let ticket_id = Uuid::new_v4();
    let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let locks = locks.clone();
        let counter = counter.clone();
        handles.push(tokio::spawn(async move {
            let _guard = locks.acquire(ticket_id).await;
            let in_flight = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            assert_eq!(in_flight, 0, "two workers entered the critical section");
            tokio::time::sleep(Duration::from_millis(5)).await;
            counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn reject_with_blank_notes_fails_before_touching_storage() {
    use diesel::r2d2::{ConnectionManager, Pool};
    use diesel::PgConnection;
    use triageserver::approval::ApprovalCoordinator;
    use triageserver::shared::config::AppConfig;

    // The pool points at nothing; notes validation must reject the call
    // before a connection is ever requested.
    let manager = ConnectionManager::<PgConnection>::new("postgres://localhost:1/void");
    let pool = Pool::builder().build_unchecked(manager);
    let coordinator = ApprovalCoordinator::new(
        pool,
        TicketLocks::new(),
        std::sync::Arc::new(RecordingNotifier),
        &AppConfig::load().unwrap(),
    );

    for notes in [None, Some("   ".to_string())] {
        let err = coordinator
            .reject(
                Uuid::new_v4(),
                "Alice Approver".to_string(),
                "alice@example.com".to_string(),
                notes,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::Validation(_)));
    }
}

#[tokio::test]
async fn notifier_failure_is_reported_not_raised() {
    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(
            &self,
            _to_email: &str,
            _to_name: &str,
            _subject: &str,
            _body: &str,
            _ticket_id: Uuid,
        ) -> DeliveryResult {
            DeliveryResult::failed("relay unreachable")
        }
    }

    let result = FailingNotifier
        .send("user@example.com", "User", "Re: issue", "body", Uuid::new_v4())
        .await;
    assert!(!result.delivered);
    assert_eq!(result.error.as_deref(), Some("relay unreachable"));

    let result = RecordingNotifier
        .send("user@example.com", "User", "Re: issue", "body", Uuid::new_v4())
        .await;
    assert!(result.delivered);
    assert!(result.error.is_none());
}
