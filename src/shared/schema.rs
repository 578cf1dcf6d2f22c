diesel::table! {
    tickets (id) {
        id -> Uuid,
        subject -> Varchar,
        body -> Text,
        submitter_name -> Varchar,
        submitter_email -> Varchar,
        attachment_path -> Nullable<Varchar>,
        predicted_queue -> Nullable<Varchar>,
        queue_confidence -> Nullable<Float8>,
        critical_prob -> Nullable<Float8>,
        is_critical -> Bool,
        predicted_language -> Nullable<Varchar>,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        triaged_at -> Nullable<Timestamptz>,
        sent_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    responses (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        draft_language -> Nullable<Varchar>,
        draft_subject -> Nullable<Varchar>,
        draft_body -> Nullable<Text>,
        draft_confidence -> Nullable<Float8>,
        needs_human_approval -> Bool,
        suggested_tags -> Jsonb,
        retrieval_context -> Nullable<Jsonb>,
        final_subject -> Nullable<Varchar>,
        final_body -> Nullable<Text>,
        created_at -> Timestamptz,
        approved_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    approvals (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        approver_name -> Varchar,
        approver_email -> Varchar,
        decision -> Text,
        decision_notes -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    audit_logs (id) {
        id -> Uuid,
        ticket_id -> Nullable<Uuid>,
        action -> Varchar,
        actor -> Nullable<Varchar>,
        details -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(responses -> tickets (ticket_id));
diesel::joinable!(approvals -> tickets (ticket_id));
diesel::joinable!(audit_logs -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(tickets, responses, approvals, audit_logs);
