use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::ledger::FinancialOverview;

/// UTC timestamp in the same shape SQLite's `strftime('%Y-%m-%dT%H:%M:%SZ')`
/// produces, so stored values sort lexically.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    ExpenditureRequest,
    FinancialReport,
    ExamOfficerReport,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::ExpenditureRequest => "expenditure_request",
            RecordKind::FinancialReport => "financial_report",
            RecordKind::ExamOfficerReport => "exam_officer_report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "expenditure_request" => Some(RecordKind::ExpenditureRequest),
            "financial_report" => Some(RecordKind::FinancialReport),
            "exam_officer_report" => Some(RecordKind::ExamOfficerReport),
            _ => None,
        }
    }

    /// Only expenditure requests carry the terminal `completed` state.
    pub fn can_complete(self) -> bool {
        matches!(self, RecordKind::ExpenditureRequest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Submitted => "submitted",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
            Status::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Status::Draft),
            "submitted" => Some(Status::Submitted),
            "approved" => Some(Status::Approved),
            "rejected" => Some(Status::Rejected),
            "completed" => Some(Status::Completed),
            _ => None,
        }
    }

    /// Payload edits and deletes are only legal in these two states.
    pub fn editable(self) -> bool {
        matches!(self, Status::Draft | Status::Rejected)
    }
}

/// Kind-specific payload as a closed union, so each kind's mandatory fields
/// are checked by the type rather than a dynamic bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RecordBody {
    #[serde(rename_all = "camelCase")]
    ExpenditureRequest {
        amount: i64,
        category: String,
        priority: String,
    },
    #[serde(rename_all = "camelCase")]
    FinancialReport {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<FinancialOverview>,
    },
    #[serde(rename_all = "camelCase")]
    ExamOfficerReport { content: String },
}

impl RecordBody {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBody::ExpenditureRequest { .. } => RecordKind::ExpenditureRequest,
            RecordBody::FinancialReport { .. } => RecordKind::FinancialReport,
            RecordBody::ExamOfficerReport { .. } => RecordKind::ExamOfficerReport,
        }
    }

    /// Monetary amount mirrored into its own column for SQL aggregation.
    pub fn amount(&self) -> Option<i64> {
        match self {
            RecordBody::ExpenditureRequest { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub id: String,
    pub kind: RecordKind,
    pub status: Status,
    pub owner_id: String,
    pub owner_name: String,
    pub academic_session: String,
    pub term: String,
    pub body: RecordBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const RECORD_COLS: &str = "id, kind, status, owner_id, owner_name, academic_session, term, body,
     reviewer_id, reviewer_name, reviewed_at, review_comment,
     submitted_at, completed_at, created_at, updated_at";

fn bad_column<E>(idx: usize) -> impl FnOnce(E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn map_record(row: &Row) -> rusqlite::Result<WorkflowRecord> {
    let kind_raw: String = row.get(1)?;
    let kind = RecordKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown record kind '{kind_raw}'").into(),
        )
    })?;
    let status_raw: String = row.get(2)?;
    let status = Status::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown status '{status_raw}'").into(),
        )
    })?;
    let body_raw: String = row.get(7)?;
    let body: RecordBody = serde_json::from_str(&body_raw).map_err(bad_column(7))?;

    Ok(WorkflowRecord {
        id: row.get(0)?,
        kind,
        status,
        owner_id: row.get(3)?,
        owner_name: row.get(4)?,
        academic_session: row.get(5)?,
        term: row.get(6)?,
        body,
        reviewer_id: row.get(8)?,
        reviewer_name: row.get(9)?,
        reviewed_at: row.get(10)?,
        review_comment: row.get(11)?,
        submitted_at: row.get(12)?,
        completed_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

pub fn insert_record(conn: &Connection, record: &WorkflowRecord) -> CoreResult<()> {
    let body_json = serde_json::to_string(&record.body)
        .map_err(|e| crate::error::CoreError::validation(e.to_string()))?;
    conn.execute(
        "INSERT INTO workflow_records(
            id, kind, status, owner_id, owner_name, academic_session, term,
            amount, body, created_at, updated_at
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            record.id,
            record.kind.as_str(),
            record.status.as_str(),
            record.owner_id,
            record.owner_name,
            record.academic_session,
            record.term,
            record.body.amount(),
            body_json,
            record.created_at,
            record.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_record(conn: &Connection, id: &str) -> CoreResult<Option<WorkflowRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {RECORD_COLS} FROM workflow_records WHERE id = ?"),
            [id],
            map_record,
        )
        .optional()?;
    Ok(record)
}

/// Raw status lookup used by the workflow engine to explain a failed
/// compare-and-swap without re-reading the whole row.
pub fn record_status(conn: &Connection, id: &str) -> CoreResult<Option<String>> {
    let status = conn
        .query_row(
            "SELECT status FROM workflow_records WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(status)
}

pub fn list_by_owner(
    conn: &Connection,
    kind: RecordKind,
    owner_id: &str,
) -> CoreResult<Vec<WorkflowRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLS} FROM workflow_records
         WHERE kind = ? AND owner_id = ?
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt
        .query_map(params![kind.as_str(), owner_id], map_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_by_period(
    conn: &Connection,
    kind: RecordKind,
    session: &str,
    term: &str,
) -> CoreResult<Vec<WorkflowRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLS} FROM workflow_records
         WHERE kind = ? AND academic_session = ? AND term = ?
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt
        .query_map(params![kind.as_str(), session, term], map_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
