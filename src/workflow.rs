use rusqlite::{params, Connection};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::ledger;
use crate::store::{self, now_iso, RecordBody, Status, WorkflowRecord};

/// Editable fields of a draft/rejected record. Anything omitted is kept.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default)]
    pub body: Option<RecordBody>,
    #[serde(default)]
    pub academic_session: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
}

fn validate_body(body: &RecordBody) -> CoreResult<()> {
    match body {
        RecordBody::ExpenditureRequest {
            amount,
            category,
            priority,
        } => {
            if *amount <= 0 {
                return Err(CoreError::validation(
                    "amount must be a positive integer in the smallest currency unit",
                ));
            }
            if category.trim().is_empty() {
                return Err(CoreError::validation("missing category"));
            }
            if !matches!(priority.as_str(), "low" | "medium" | "high") {
                return Err(CoreError::validation(
                    "priority must be one of low, medium, high",
                ));
            }
        }
        RecordBody::FinancialReport { content, .. }
        | RecordBody::ExamOfficerReport { content } => {
            if content.trim().is_empty() {
                return Err(CoreError::validation("content must not be empty"));
            }
        }
    }
    Ok(())
}

/// Financial reports carry the period's revenue summary as it stood when the
/// report was last written; the caller never supplies it.
fn attach_snapshot(
    conn: &Connection,
    session: &str,
    term: &str,
    body: RecordBody,
) -> CoreResult<RecordBody> {
    match body {
        RecordBody::FinancialReport { content, .. } => {
            let snapshot = ledger::financial_overview(conn, session, term)?;
            Ok(RecordBody::FinancialReport {
                content,
                snapshot: Some(snapshot),
            })
        }
        other => Ok(other),
    }
}

pub fn create(
    conn: &Connection,
    owner_id: &str,
    owner_name: &str,
    session: &str,
    term: &str,
    body: RecordBody,
) -> CoreResult<WorkflowRecord> {
    for (field, value) in [
        ("ownerId", owner_id),
        ("ownerName", owner_name),
        ("academicSession", session),
        ("term", term),
    ] {
        if value.trim().is_empty() {
            return Err(CoreError::validation(format!("missing {field}")));
        }
    }
    validate_body(&body)?;
    let body = attach_snapshot(conn, session, term, body)?;

    let now = now_iso();
    let record = WorkflowRecord {
        id: Uuid::new_v4().to_string(),
        kind: body.kind(),
        status: Status::Draft,
        owner_id: owner_id.to_string(),
        owner_name: owner_name.to_string(),
        academic_session: session.to_string(),
        term: term.to_string(),
        body,
        reviewer_id: None,
        reviewer_name: None,
        reviewed_at: None,
        review_comment: None,
        submitted_at: None,
        completed_at: None,
        created_at: now.clone(),
        updated_at: now,
    };
    store::insert_record(conn, &record)?;
    Ok(record)
}

fn fetch(conn: &Connection, id: &str) -> CoreResult<WorkflowRecord> {
    store::get_record(conn, id)?.ok_or(CoreError::NotFound)
}

/// Explains a transition whose compare-and-swap matched zero rows: either
/// the record is gone, or it sits in a state the transition does not permit.
fn transition_blocked(conn: &Connection, id: &str, action: &'static str) -> CoreError {
    match store::record_status(conn, id) {
        Ok(Some(status)) => CoreError::IllegalTransition { action, status },
        Ok(None) => CoreError::NotFound,
        Err(e) => e,
    }
}

fn edit_blocked(conn: &Connection, id: &str, action: &str) -> CoreError {
    match store::record_status(conn, id) {
        Ok(Some(status)) => {
            CoreError::validation(format!("cannot {action} a record in status '{status}'"))
        }
        Ok(None) => CoreError::NotFound,
        Err(e) => e,
    }
}

pub fn submit(conn: &Connection, id: &str) -> CoreResult<WorkflowRecord> {
    let now = now_iso();
    let n = conn.execute(
        "UPDATE workflow_records
         SET status = 'submitted', submitted_at = ?1, updated_at = ?1
         WHERE id = ?2 AND status = 'draft'",
        params![now, id],
    )?;
    if n == 0 {
        return Err(transition_blocked(conn, id, "submit"));
    }
    fetch(conn, id)
}

pub fn approve(
    conn: &Connection,
    id: &str,
    reviewer_id: &str,
    reviewer_name: &str,
    comment: Option<&str>,
) -> CoreResult<WorkflowRecord> {
    if reviewer_id.trim().is_empty() || reviewer_name.trim().is_empty() {
        return Err(CoreError::validation("missing reviewer identity"));
    }
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    let now = now_iso();
    let n = conn.execute(
        "UPDATE workflow_records
         SET status = 'approved', reviewer_id = ?1, reviewer_name = ?2,
             reviewed_at = ?3, review_comment = ?4, updated_at = ?3
         WHERE id = ?5 AND status = 'submitted'",
        params![reviewer_id, reviewer_name, now, comment, id],
    )?;
    if n == 0 {
        return Err(transition_blocked(conn, id, "approve"));
    }
    fetch(conn, id)
}

pub fn reject(
    conn: &Connection,
    id: &str,
    reviewer_id: &str,
    reviewer_name: &str,
    comment: &str,
) -> CoreResult<WorkflowRecord> {
    if reviewer_id.trim().is_empty() || reviewer_name.trim().is_empty() {
        return Err(CoreError::validation("missing reviewer identity"));
    }
    let comment = comment.trim();
    if comment.is_empty() {
        return Err(CoreError::validation("a rejection comment is required"));
    }
    let now = now_iso();
    let n = conn.execute(
        "UPDATE workflow_records
         SET status = 'rejected', reviewer_id = ?1, reviewer_name = ?2,
             reviewed_at = ?3, review_comment = ?4, updated_at = ?3
         WHERE id = ?5 AND status = 'submitted'",
        params![reviewer_id, reviewer_name, now, comment, id],
    )?;
    if n == 0 {
        return Err(transition_blocked(conn, id, "reject"));
    }
    fetch(conn, id)
}

pub fn complete(conn: &Connection, id: &str) -> CoreResult<WorkflowRecord> {
    let record = fetch(conn, id)?;
    if !record.kind.can_complete() {
        return Err(CoreError::validation(
            "only expenditure requests can be completed",
        ));
    }
    let now = now_iso();
    let n = conn.execute(
        "UPDATE workflow_records
         SET status = 'completed', completed_at = ?1, updated_at = ?1
         WHERE id = ?2 AND status = 'approved'",
        params![now, id],
    )?;
    if n == 0 {
        return Err(transition_blocked(conn, id, "complete"));
    }
    fetch(conn, id)
}

/// Re-opens a draft or rejected record with the patched payload. The record
/// returns to `draft` and sheds any reviewer stamps so it can flow through
/// the one legal submit path again.
pub fn edit(conn: &Connection, id: &str, patch: RecordPatch) -> CoreResult<WorkflowRecord> {
    let record = fetch(conn, id)?;
    if !record.status.editable() {
        return Err(CoreError::validation(format!(
            "cannot edit a record in status '{}'",
            record.status.as_str()
        )));
    }

    let session = patch
        .academic_session
        .unwrap_or_else(|| record.academic_session.clone());
    let term = patch.term.unwrap_or_else(|| record.term.clone());
    if session.trim().is_empty() || term.trim().is_empty() {
        return Err(CoreError::validation("academicSession and term must not be empty"));
    }

    let body = match patch.body {
        Some(b) => {
            if b.kind() != record.kind {
                return Err(CoreError::validation(
                    "payload kind does not match the record",
                ));
            }
            b
        }
        None => record.body.clone(),
    };
    validate_body(&body)?;
    let body = attach_snapshot(conn, &session, &term, body)?;
    let body_json =
        serde_json::to_string(&body).map_err(|e| CoreError::validation(e.to_string()))?;

    let now = now_iso();
    let n = conn.execute(
        "UPDATE workflow_records
         SET status = 'draft', academic_session = ?1, term = ?2, amount = ?3, body = ?4,
             reviewer_id = NULL, reviewer_name = NULL, reviewed_at = NULL,
             review_comment = NULL, submitted_at = NULL, updated_at = ?5
         WHERE id = ?6 AND status IN ('draft', 'rejected')",
        params![session, term, body.amount(), body_json, now, id],
    )?;
    if n == 0 {
        // Lost a race with a concurrent transition since the read above.
        return Err(edit_blocked(conn, id, "edit"));
    }
    fetch(conn, id)
}

pub fn delete(conn: &Connection, id: &str) -> CoreResult<()> {
    let n = conn.execute(
        "DELETE FROM workflow_records WHERE id = ? AND status IN ('draft', 'rejected')",
        [id],
    )?;
    if n == 0 {
        return Err(edit_blocked(conn, id, "delete"));
    }
    Ok(())
}
