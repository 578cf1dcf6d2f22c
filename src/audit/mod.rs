use crate::shared::models::AuditLog;
use crate::shared::schema::audit_logs;
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

/// State-changing actions recorded in the audit trail. The trail is
/// append-only and write-only from the workflow's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    MlPrediction,
    DraftGenerated,
    Approved,
    Rejected,
    EmailSent,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MlPrediction => "ML_PREDICTION",
            Self::DraftGenerated => "DRAFT_GENERATED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::EmailSent => "EMAIL_SENT",
        }
    }
}

pub const SYSTEM_ACTOR: &str = "system";

pub fn record(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    action: AuditAction,
    actor: &str,
    details: serde_json::Value,
) -> QueryResult<()> {
    let entry = AuditLog {
        id: Uuid::new_v4(),
        ticket_id: Some(ticket_id),
        action: action.as_str().to_string(),
        actor: Some(actor.to_string()),
        details: Some(details),
        created_at: Utc::now(),
    };

    diesel::insert_into(audit_logs::table)
        .values(&entry)
        .execute(conn)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_match_trail_format() {
        assert_eq!(AuditAction::MlPrediction.as_str(), "ML_PREDICTION");
        assert_eq!(AuditAction::DraftGenerated.as_str(), "DRAFT_GENERATED");
        assert_eq!(AuditAction::EmailSent.as_str(), "EMAIL_SENT");
    }
}
