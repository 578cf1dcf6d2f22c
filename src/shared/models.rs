use crate::shared::schema::{approvals, audit_logs, responses, tickets};
use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Ticket lifecycle. Every transition site matches exhaustively, so an
/// unhandled status is a compile error rather than a silent no-op.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    New,
    Triaged,
    Drafted,
    PendingApproval,
    Approved,
    Sent,
    Rejected,
    NeedsInfo,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Triaged => "TRIAGED",
            Self::Drafted => "DRAFTED",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Approved => "APPROVED",
            Self::Sent => "SENT",
            Self::Rejected => "REJECTED",
            Self::NeedsInfo => "NEEDS_INFO",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "TRIAGED" => Ok(Self::Triaged),
            "DRAFTED" => Ok(Self::Drafted),
            "PENDING_APPROVAL" => Ok(Self::PendingApproval),
            "APPROVED" => Ok(Self::Approved),
            "SENT" => Ok(Self::Sent),
            "REJECTED" => Ok(Self::Rejected),
            "NEEDS_INFO" => Ok(Self::NeedsInfo),
            other => Err(format!("unrecognized ticket status: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for TicketStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for TicketStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        s.parse().map_err(|e: String| e.into())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    EditedAndApproved,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::EditedAndApproved => "EDITED_AND_APPROVED",
        }
    }
}

impl FromStr for ApprovalDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "EDITED_AND_APPROVED" => Ok(Self::EditedAndApproved),
            other => Err(format!("unrecognized approval decision: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for ApprovalDecision {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for ApprovalDecision {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
        s.parse().map_err(|e: String| e.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub subject: String,
    pub body: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub attachment_path: Option<String>,
    pub predicted_queue: Option<String>,
    pub queue_confidence: Option<f64>,
    pub critical_prob: Option<f64>,
    pub is_critical: bool,
    pub predicted_language: Option<String>,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub triaged_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = responses)]
pub struct TicketResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub draft_language: Option<String>,
    pub draft_subject: Option<String>,
    pub draft_body: Option<String>,
    pub draft_confidence: Option<f64>,
    pub needs_human_approval: bool,
    pub suggested_tags: serde_json::Value,
    pub retrieval_context: Option<serde_json::Value>,
    pub final_subject: Option<String>,
    pub final_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = approvals)]
pub struct Approval {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub approver_name: String,
    pub approver_email: String,
    pub decision: ApprovalDecision,
    pub decision_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct AuditLog {
    pub id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub action: String,
    pub actor: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
