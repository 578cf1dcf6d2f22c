use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use diesel::dsl::count;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::approval::{ApprovalOutcome, ApprovalRequest, AutoSendReport, RejectionOutcome};
use crate::shared::error::TriageError;
use crate::shared::models::{Approval, Ticket, TicketResponse, TicketStatus};
use crate::shared::schema::{approvals, responses, tickets};
use crate::shared::state::AppState;
use crate::triage::TriageSummary;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub body: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub attachment_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<TicketStatus>,
    pub queue: Option<String>,
    pub is_critical: Option<bool>,
    pub submitter_email: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TriageRequest {
    #[serde(default = "default_run_draft")]
    pub run_draft: bool,
}

fn default_run_draft() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ApprovalCreate {
    pub approver_name: String,
    pub approver_email: String,
    pub edited_subject: Option<String>,
    pub edited_body: Option<String>,
    pub decision_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub responses: Vec<TicketResponse>,
    pub approvals: Vec<Approval>,
}

#[derive(Debug, Serialize)]
pub struct PendingApprovalItem {
    pub ticket_id: Uuid,
    pub subject: String,
    pub submitter_email: String,
    pub predicted_queue: String,
    pub critical_prob: f64,
    pub created_at: DateTime<Utc>,
    pub draft_subject: Option<String>,
    pub draft_body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_tickets: i64,
    pub open_tickets: i64,
    pub critical_count: i64,
    pub pending_approval_count: i64,
    pub avg_response_time_hours: Option<f64>,
    pub tickets_by_queue: HashMap<String, i64>,
    pub tickets_by_priority: HashMap<String, i64>,
    pub tickets_by_status: HashMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct TicketTimeSeriesPoint {
    pub date: String,
    pub count: i64,
    pub critical_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesQuery {
    pub days: Option<i64>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "Ticket Triage API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<Ticket>, TriageError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let ticket = Ticket {
        id: Uuid::new_v4(),
        subject: req.subject,
        body: req.body,
        submitter_name: req.submitter_name,
        submitter_email: req.submitter_email,
        attachment_path: req.attachment_path,
        predicted_queue: None,
        queue_confidence: None,
        critical_prob: None,
        is_critical: false,
        predicted_language: None,
        status: TicketStatus::New,
        created_at: now,
        updated_at: now,
        triaged_at: None,
        sent_at: None,
    };

    diesel::insert_into(tickets::table)
        .values(&ticket)
        .execute(&mut conn)?;

    info!("created ticket {}: {}", ticket.id, ticket.subject);
    Ok(Json(ticket))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Ticket>>, TriageError> {
    let mut conn = state.conn.get()?;
    let limit = query.limit.unwrap_or(100);
    let skip = query.skip.unwrap_or(0);

    let mut q = tickets::table.into_boxed();

    if let Some(status) = query.status {
        q = q.filter(tickets::status.eq(status));
    }
    if let Some(queue) = query.queue {
        q = q.filter(tickets::predicted_queue.eq(queue));
    }
    if let Some(is_critical) = query.is_critical {
        q = q.filter(tickets::is_critical.eq(is_critical));
    }
    if let Some(submitter_email) = query.submitter_email {
        q = q.filter(tickets::submitter_email.eq(submitter_email));
    }

    let result: Vec<Ticket> = q
        .order(tickets::created_at.desc())
        .offset(skip)
        .limit(limit)
        .load(&mut conn)?;

    Ok(Json(result))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDetail>, TriageError> {
    let mut conn = state.conn.get()?;

    let ticket: Ticket = tickets::table
        .filter(tickets::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| TriageError::NotFound(format!("Ticket {id} not found")))?;

    let ticket_responses: Vec<TicketResponse> = responses::table
        .filter(responses::ticket_id.eq(id))
        .order(responses::created_at.asc())
        .load(&mut conn)?;

    let ticket_approvals: Vec<Approval> = approvals::table
        .filter(approvals::ticket_id.eq(id))
        .order(approvals::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(TicketDetail {
        ticket,
        responses: ticket_responses,
        approvals: ticket_approvals,
    }))
}

pub async fn triage_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TriageRequest>,
) -> Result<Json<TriageSummary>, TriageError> {
    let summary = state.orchestrator.triage(id, req.run_draft).await?;
    Ok(Json(summary))
}

pub async fn approve_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApprovalCreate>,
) -> Result<Json<ApprovalOutcome>, TriageError> {
    let outcome = state
        .coordinator
        .approve(
            id,
            ApprovalRequest {
                approver_name: req.approver_name,
                approver_email: req.approver_email,
                edited_subject: req.edited_subject,
                edited_body: req.edited_body,
                decision_notes: req.decision_notes,
            },
        )
        .await?;
    Ok(Json(outcome))
}

pub async fn reject_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApprovalCreate>,
) -> Result<Json<RejectionOutcome>, TriageError> {
    let outcome = state
        .coordinator
        .reject(id, req.approver_name, req.approver_email, req.decision_notes)
        .await?;
    Ok(Json(outcome))
}

pub async fn pending_approvals(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PendingApprovalItem>>, TriageError> {
    let mut conn = state.conn.get()?;

    let pending: Vec<Ticket> = tickets::table
        .filter(tickets::status.eq(TicketStatus::PendingApproval))
        .order(tickets::created_at.desc())
        .load(&mut conn)?;

    let mut items = Vec::with_capacity(pending.len());
    for ticket in pending {
        let response: Option<TicketResponse> = responses::table
            .filter(responses::ticket_id.eq(ticket.id))
            .order(responses::created_at.desc())
            .first(&mut conn)
            .optional()?;

        items.push(PendingApprovalItem {
            ticket_id: ticket.id,
            subject: ticket.subject,
            submitter_email: ticket.submitter_email,
            predicted_queue: ticket
                .predicted_queue
                .unwrap_or_else(|| "Unknown".to_string()),
            critical_prob: ticket.critical_prob.unwrap_or(0.0),
            created_at: ticket.created_at,
            draft_subject: response.as_ref().and_then(|r| r.draft_subject.clone()),
            draft_body: response.and_then(|r| r.draft_body),
        });
    }

    Ok(Json(items))
}

pub async fn auto_send(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AutoSendReport>, TriageError> {
    let report = state.coordinator.bulk_auto_send().await?;
    Ok(Json(report))
}

pub async fn dashboard_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardSummary>, TriageError> {
    let mut conn = state.conn.get()?;

    let total_tickets: i64 = tickets::table.count().get_result(&mut conn)?;
    let open_tickets: i64 = tickets::table
        .filter(tickets::status.ne(TicketStatus::Sent))
        .count()
        .get_result(&mut conn)?;
    let critical_count: i64 = tickets::table
        .filter(tickets::is_critical.eq(true))
        .count()
        .get_result(&mut conn)?;
    let pending_approval_count: i64 = tickets::table
        .filter(tickets::status.eq(TicketStatus::PendingApproval))
        .count()
        .get_result(&mut conn)?;

    let sent_pairs: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)> = tickets::table
        .filter(tickets::sent_at.is_not_null())
        .select((tickets::created_at, tickets::sent_at))
        .load(&mut conn)?;
    let response_hours: Vec<f64> = sent_pairs
        .iter()
        .filter_map(|(created, sent)| {
            sent.map(|s| (s - *created).num_seconds() as f64 / 3600.0)
        })
        .collect();
    let avg_response_time_hours = if response_hours.is_empty() {
        None
    } else {
        Some(response_hours.iter().sum::<f64>() / response_hours.len() as f64)
    };

    let queue_counts: Vec<(Option<String>, i64)> = tickets::table
        .filter(tickets::predicted_queue.is_not_null())
        .group_by(tickets::predicted_queue)
        .select((tickets::predicted_queue, count(tickets::id)))
        .load(&mut conn)?;
    let tickets_by_queue = queue_counts
        .into_iter()
        .filter_map(|(queue, n)| queue.map(|q| (q, n)))
        .collect();

    let non_critical_count = total_tickets - critical_count;
    let tickets_by_priority = HashMap::from([
        ("high".to_string(), critical_count),
        ("medium".to_string(), non_critical_count),
    ]);

    let status_counts: Vec<(TicketStatus, i64)> = tickets::table
        .group_by(tickets::status)
        .select((tickets::status, count(tickets::id)))
        .load(&mut conn)?;
    let tickets_by_status = status_counts
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();

    Ok(Json(DashboardSummary {
        total_tickets,
        open_tickets,
        critical_count,
        pending_approval_count,
        avg_response_time_hours,
        tickets_by_queue,
        tickets_by_priority,
        tickets_by_status,
    }))
}

pub async fn dashboard_timeseries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeSeriesQuery>,
) -> Result<Json<Vec<TicketTimeSeriesPoint>>, TriageError> {
    let mut conn = state.conn.get()?;
    let days = query.days.unwrap_or(30);
    let cutoff = Utc::now() - Duration::days(days);

    let rows: Vec<(DateTime<Utc>, bool)> = tickets::table
        .filter(tickets::created_at.ge(cutoff))
        .select((tickets::created_at, tickets::is_critical))
        .load(&mut conn)?;

    let mut date_counts: HashMap<String, (i64, i64)> = HashMap::new();
    for (created_at, is_critical) in rows {
        let entry = date_counts
            .entry(created_at.format("%Y-%m-%d").to_string())
            .or_insert((0, 0));
        entry.0 += 1;
        if is_critical {
            entry.1 += 1;
        }
    }

    let mut points: Vec<TicketTimeSeriesPoint> = date_counts
        .into_iter()
        .map(|(date, (count, critical_count))| TicketTimeSeriesPoint {
            date,
            count,
            critical_count,
        })
        .collect();
    points.sort_by(|a, b| a.date.cmp(&b.date));

    Ok(Json(points))
}

pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health))
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/auto-send", post(auto_send))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/triage", post(triage_ticket))
        .route("/api/tickets/:id/approve", post(approve_ticket))
        .route("/api/tickets/:id/reject", post(reject_ticket))
        .route("/api/approvals/pending", get(pending_approvals))
        .route("/api/dashboard/summary", get(dashboard_summary))
        .route("/api/dashboard/timeseries", get(dashboard_timeseries))
}
