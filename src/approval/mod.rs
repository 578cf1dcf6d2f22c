use crate::audit::{self, AuditAction, SYSTEM_ACTOR};
use crate::email::Notifier;
use crate::shared::config::AppConfig;
use crate::shared::error::TriageError;
use crate::shared::locks::TicketLocks;
use crate::shared::models::{Approval, ApprovalDecision, Ticket, TicketResponse, TicketStatus};
use crate::shared::schema::{approvals, responses, tickets};
use crate::shared::utils::DbPool;
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

pub const SYSTEM_APPROVER_NAME: &str = "System Auto-Send";
pub const SYSTEM_APPROVER_EMAIL: &str = "system@company.com";
const AUTO_SEND_NOTE: &str = "Auto-approved: Non-critical ticket";

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub approver_name: String,
    pub approver_email: String,
    pub edited_subject: Option<String>,
    pub edited_body: Option<String>,
    pub decision_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub success: bool,
    pub ticket_id: Uuid,
    pub status: TicketStatus,
    pub email_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectionOutcome {
    pub success: bool,
    pub ticket_id: Uuid,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoSendReport {
    pub processed: usize,
    pub sent: usize,
    pub results: Vec<AutoSendResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoSendResult {
    pub ticket_id: Uuid,
    pub approved: bool,
    pub email_sent: bool,
    pub error: Option<String>,
}

/// Resolves pending human decisions into terminal outcomes. The approval
/// decision commits before delivery is attempted; "approved" and "sent"
/// stay independently observable so a transient delivery failure can be
/// retried out-of-band.
pub struct ApprovalCoordinator {
    conn: DbPool,
    locks: TicketLocks,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl ApprovalCoordinator {
    pub fn new(
        conn: DbPool,
        locks: TicketLocks,
        notifier: Arc<dyn Notifier>,
        config: &AppConfig,
    ) -> Self {
        Self {
            conn,
            locks,
            notifier,
            notify_timeout: config.smtp.timeout(),
        }
    }

    pub async fn approve(
        &self,
        ticket_id: Uuid,
        request: ApprovalRequest,
    ) -> Result<ApprovalOutcome, TriageError> {
        let _guard = self.locks.acquire(ticket_id).await;

        let mut conn = self.conn.get()?;
        let ticket: Ticket = tickets::table
            .filter(tickets::id.eq(ticket_id))
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| TriageError::NotFound(format!("Ticket {ticket_id} not found")))?;

        // A ticket cannot be approved before it has been drafted.
        let response: TicketResponse = responses::table
            .filter(responses::ticket_id.eq(ticket_id))
            .order(responses::created_at.desc())
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| {
                TriageError::NotFound(format!("No response found for ticket {ticket_id}"))
            })?;

        info!("approving ticket {ticket_id}");

        let edited = request.edited_subject.is_some() || request.edited_body.is_some();
        let final_subject = request
            .edited_subject
            .or_else(|| response.draft_subject.clone())
            .unwrap_or_else(|| ticket.subject.clone());
        let final_body = request
            .edited_body
            .or_else(|| response.draft_body.clone())
            .unwrap_or_default();

        let decision = if edited {
            ApprovalDecision::EditedAndApproved
        } else {
            ApprovalDecision::Approved
        };

        let now = Utc::now();
        conn.transaction::<_, TriageError, _>(|conn| {
            diesel::update(responses::table.filter(responses::id.eq(response.id)))
                .set((
                    responses::final_subject.eq(Some(final_subject.clone())),
                    responses::final_body.eq(Some(final_body.clone())),
                    responses::approved_at.eq(Some(now)),
                ))
                .execute(conn)?;

            let approval = Approval {
                id: Uuid::new_v4(),
                ticket_id,
                approver_name: request.approver_name.clone(),
                approver_email: request.approver_email.clone(),
                decision,
                decision_notes: request.decision_notes.clone(),
                created_at: now,
            };
            diesel::insert_into(approvals::table)
                .values(&approval)
                .execute(conn)?;

            diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
                .set((
                    tickets::status.eq(TicketStatus::Approved),
                    tickets::updated_at.eq(now),
                ))
                .execute(conn)?;

            audit::record(
                conn,
                ticket_id,
                AuditAction::Approved,
                &request.approver_email,
                serde_json::json!({
                    "decision": decision.as_str(),
                    "edited": edited,
                }),
            )?;

            Ok(())
        })?;

        // Delivery happens after the approval committed. A failure here is
        // reported in the outcome, never raised.
        let delivery = match timeout(
            self.notify_timeout,
            self.notifier.send(
                &ticket.submitter_email,
                &ticket.submitter_name,
                &final_subject,
                &final_body,
                ticket_id,
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => crate::email::DeliveryResult::failed("delivery timed out"),
        };

        let status = if delivery.delivered {
            let sent_at = Utc::now();
            conn.transaction::<_, TriageError, _>(|conn| {
                diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
                    .set((
                        tickets::status.eq(TicketStatus::Sent),
                        tickets::sent_at.eq(Some(sent_at)),
                        tickets::updated_at.eq(sent_at),
                    ))
                    .execute(conn)?;

                audit::record(
                    conn,
                    ticket_id,
                    AuditAction::EmailSent,
                    SYSTEM_ACTOR,
                    serde_json::json!({ "to": ticket.submitter_email }),
                )?;

                Ok(())
            })?;
            info!("email sent to {} for ticket {ticket_id}", ticket.submitter_email);
            TicketStatus::Sent
        } else {
            warn!(
                "email sending failed for ticket {ticket_id}: {}",
                delivery.error.as_deref().unwrap_or("unknown")
            );
            TicketStatus::Approved
        };

        Ok(ApprovalOutcome {
            success: true,
            ticket_id,
            status,
            email_sent: delivery.delivered,
        })
    }

    pub async fn reject(
        &self,
        ticket_id: Uuid,
        approver_name: String,
        approver_email: String,
        decision_notes: Option<String>,
    ) -> Result<RejectionOutcome, TriageError> {
        // Rejection without a reason is a caller error; no state changes.
        let notes = decision_notes
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                TriageError::Validation("rejection requires decision notes".to_string())
            })?;

        let _guard = self.locks.acquire(ticket_id).await;

        let mut conn = self.conn.get()?;
        let exists: Option<Uuid> = tickets::table
            .filter(tickets::id.eq(ticket_id))
            .select(tickets::id)
            .first(&mut conn)
            .optional()?;
        if exists.is_none() {
            return Err(TriageError::NotFound(format!("Ticket {ticket_id} not found")));
        }

        info!("rejecting ticket {ticket_id}");

        let now = Utc::now();
        conn.transaction::<_, TriageError, _>(|conn| {
            let approval = Approval {
                id: Uuid::new_v4(),
                ticket_id,
                approver_name: approver_name.clone(),
                approver_email: approver_email.clone(),
                decision: ApprovalDecision::Rejected,
                decision_notes: Some(notes.clone()),
                created_at: now,
            };
            diesel::insert_into(approvals::table)
                .values(&approval)
                .execute(conn)?;

            diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
                .set((
                    tickets::status.eq(TicketStatus::Rejected),
                    tickets::updated_at.eq(now),
                ))
                .execute(conn)?;

            audit::record(
                conn,
                ticket_id,
                AuditAction::Rejected,
                &approver_email,
                serde_json::json!({ "reason": notes }),
            )?;

            Ok(())
        })?;

        Ok(RejectionOutcome {
            success: true,
            ticket_id,
            status: TicketStatus::Rejected,
        })
    }

    /// Approve and send every ticket sitting in DRAFTED. Tickets forced
    /// into PENDING_APPROVAL by the business rules are excluded by
    /// construction: they are never in DRAFTED.
    pub async fn bulk_auto_send(&self) -> Result<AutoSendReport, TriageError> {
        let drafted: Vec<Uuid> = {
            let mut conn = self.conn.get()?;
            tickets::table
                .filter(tickets::status.eq(TicketStatus::Drafted))
                .order(tickets::created_at.asc())
                .select(tickets::id)
                .load(&mut conn)?
        };

        info!("auto-send sweep: {} drafted tickets", drafted.len());

        let mut results = Vec::with_capacity(drafted.len());
        let mut sent = 0;
        for ticket_id in drafted {
            let request = ApprovalRequest {
                approver_name: SYSTEM_APPROVER_NAME.to_string(),
                approver_email: SYSTEM_APPROVER_EMAIL.to_string(),
                edited_subject: None,
                edited_body: None,
                decision_notes: Some(AUTO_SEND_NOTE.to_string()),
            };
            match self.approve(ticket_id, request).await {
                Ok(outcome) => {
                    if outcome.email_sent {
                        sent += 1;
                    }
                    results.push(AutoSendResult {
                        ticket_id,
                        approved: true,
                        email_sent: outcome.email_sent,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("auto-send failed for ticket {ticket_id}: {e}");
                    results.push(AutoSendResult {
                        ticket_id,
                        approved: false,
                        email_sent: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(AutoSendReport {
            processed: results.len(),
            sent,
            results,
        })
    }
}
