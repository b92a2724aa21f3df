use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::store::now_iso;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub admission_number: String,
    pub subject_id: String,
    pub subject_name: String,
    pub academic_session: String,
    pub term: String,
    pub ca1: i64,
    pub ca2: i64,
    pub exam: i64,
    pub total: i64,
    pub grade: String,
    pub remark: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeInput {
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub admission_number: String,
    pub subject_id: String,
    pub subject_name: String,
    pub academic_session: String,
    pub term: String,
    pub ca1: i64,
    pub ca2: i64,
    pub exam: i64,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub admission_number: String,
    pub receipt_number: String,
    pub amount: i64,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    pub transaction_id: String,
    pub description: String,
    pub academic_session: String,
    pub term: String,
    pub date_issued: String,
    pub confirmed_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub admission_number: String,
    pub receipt_number: String,
    pub amount: i64,
    pub payment_method: String,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub description: String,
    pub academic_session: String,
    pub term: String,
    #[serde(default)]
    pub date_issued: Option<String>,
    #[serde(default)]
    pub confirmed_by: String,
}

/// Per-period revenue summary. Also embedded into financial reports as the
/// snapshot captured at the time the report was written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinancialOverview {
    pub academic_session: String,
    pub term: String,
    pub total_revenue: i64,
    pub payment_count: i64,
    pub average_payment: f64,
    pub by_method: BTreeMap<String, i64>,
    pub by_description: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetPosition {
    pub academic_session: String,
    pub term: String,
    pub total_revenue: i64,
    pub approved_expenditure: i64,
    pub net_position: i64,
}

/// 70/60/50/45/40 banding used on report cards.
pub fn letter_grade(total: i64) -> (&'static str, &'static str) {
    match total {
        t if t >= 70 => ("A", "Excellent"),
        t if t >= 60 => ("B", "Very Good"),
        t if t >= 50 => ("C", "Good"),
        t if t >= 45 => ("D", "Fair"),
        t if t >= 40 => ("E", "Pass"),
        _ => ("F", "Fail"),
    }
}

pub fn record_grade(conn: &Connection, input: &GradeInput) -> CoreResult<GradeRecord> {
    for (field, value) in [
        ("studentId", &input.student_id),
        ("studentName", &input.student_name),
        ("subjectId", &input.subject_id),
        ("subjectName", &input.subject_name),
        ("academicSession", &input.academic_session),
        ("term", &input.term),
    ] {
        if value.trim().is_empty() {
            return Err(CoreError::validation(format!("missing {field}")));
        }
    }
    if input.ca1 < 0 || input.ca2 < 0 || input.exam < 0 {
        return Err(CoreError::validation("scores must not be negative"));
    }
    let total = input.ca1 + input.ca2 + input.exam;
    if total > 100 {
        return Err(CoreError::validation(format!(
            "total score {total} exceeds the 100-mark scale"
        )));
    }

    let dup_key = format!(
        "grade for {} in {} ({} {})",
        input.student_id, input.subject_id, input.academic_session, input.term
    );
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM grades
             WHERE student_id = ? AND subject_id = ? AND academic_session = ? AND term = ?",
            params![
                input.student_id,
                input.subject_id,
                input.academic_session,
                input.term
            ],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(CoreError::DuplicateKey(dup_key));
    }

    let (grade, default_remark) = letter_grade(total);
    let remark = match input.remark.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => default_remark.to_string(),
    };

    let record = GradeRecord {
        id: Uuid::new_v4().to_string(),
        student_id: input.student_id.clone(),
        student_name: input.student_name.clone(),
        admission_number: input.admission_number.clone(),
        subject_id: input.subject_id.clone(),
        subject_name: input.subject_name.clone(),
        academic_session: input.academic_session.clone(),
        term: input.term.clone(),
        ca1: input.ca1,
        ca2: input.ca2,
        exam: input.exam,
        total,
        grade: grade.to_string(),
        remark,
        position: input.position,
        created_at: now_iso(),
    };

    conn.execute(
        "INSERT INTO grades(
            id, student_id, student_name, admission_number,
            subject_id, subject_name, academic_session, term,
            ca1, ca2, exam, total, grade, remark, position, created_at
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        params![
            record.id,
            record.student_id,
            record.student_name,
            record.admission_number,
            record.subject_id,
            record.subject_name,
            record.academic_session,
            record.term,
            record.ca1,
            record.ca2,
            record.exam,
            record.total,
            record.grade,
            record.remark,
            record.position,
            record.created_at,
        ],
    )
    .map_err(|e| CoreError::from_insert(e, &dup_key))?;

    Ok(record)
}

pub fn record_payment(conn: &Connection, input: &PaymentInput) -> CoreResult<PaymentRecord> {
    for (field, value) in [
        ("studentId", &input.student_id),
        ("studentName", &input.student_name),
        ("receiptNumber", &input.receipt_number),
        ("paymentMethod", &input.payment_method),
        ("academicSession", &input.academic_session),
        ("term", &input.term),
    ] {
        if value.trim().is_empty() {
            return Err(CoreError::validation(format!("missing {field}")));
        }
    }
    if input.amount <= 0 {
        return Err(CoreError::validation(
            "amount must be a positive integer in the smallest currency unit",
        ));
    }

    let dup_key = format!("receipt number {}", input.receipt_number);
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM payments WHERE receipt_number = ?",
            [&input.receipt_number],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(CoreError::DuplicateKey(dup_key));
    }

    let now = now_iso();
    let record = PaymentRecord {
        id: Uuid::new_v4().to_string(),
        student_id: input.student_id.clone(),
        student_name: input.student_name.clone(),
        admission_number: input.admission_number.clone(),
        receipt_number: input.receipt_number.clone(),
        amount: input.amount,
        payment_method: input.payment_method.clone(),
        bank_name: input.bank_name.clone(),
        account_number: input.account_number.clone(),
        transaction_id: input.transaction_id.clone(),
        description: input.description.clone(),
        academic_session: input.academic_session.clone(),
        term: input.term.clone(),
        date_issued: input.date_issued.clone().unwrap_or_else(|| now.clone()),
        confirmed_by: input.confirmed_by.clone(),
        created_at: now,
    };

    conn.execute(
        "INSERT INTO payments(
            id, student_id, student_name, admission_number, receipt_number,
            amount, payment_method, bank_name, account_number, transaction_id,
            description, academic_session, term, date_issued, confirmed_by, created_at
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        params![
            record.id,
            record.student_id,
            record.student_name,
            record.admission_number,
            record.receipt_number,
            record.amount,
            record.payment_method,
            record.bank_name,
            record.account_number,
            record.transaction_id,
            record.description,
            record.academic_session,
            record.term,
            record.date_issued,
            record.confirmed_by,
            record.created_at,
        ],
    )
    .map_err(|e| CoreError::from_insert(e, &dup_key))?;

    Ok(record)
}

const GRADE_COLS: &str = "id, student_id, student_name, admission_number, subject_id, subject_name,
     academic_session, term, ca1, ca2, exam, total, grade, remark, position, created_at";

fn map_grade(row: &Row) -> rusqlite::Result<GradeRecord> {
    Ok(GradeRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        student_name: row.get(2)?,
        admission_number: row.get(3)?,
        subject_id: row.get(4)?,
        subject_name: row.get(5)?,
        academic_session: row.get(6)?,
        term: row.get(7)?,
        ca1: row.get(8)?,
        ca2: row.get(9)?,
        exam: row.get(10)?,
        total: row.get(11)?,
        grade: row.get(12)?,
        remark: row.get(13)?,
        position: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn grades_where(
    conn: &Connection,
    key_column: &str,
    key: &str,
    session: Option<&str>,
    term: Option<&str>,
) -> CoreResult<Vec<GradeRecord>> {
    let mut sql = format!("SELECT {GRADE_COLS} FROM grades WHERE {key_column} = ?");
    let mut args: Vec<Value> = vec![Value::from(key.to_string())];
    if let Some(s) = session {
        sql.push_str(" AND academic_session = ?");
        args.push(Value::from(s.to_string()));
    }
    if let Some(t) = term {
        sql.push_str(" AND term = ?");
        args.push(Value::from(t.to_string()));
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args), map_grade)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn grades_for_student(
    conn: &Connection,
    student_id: &str,
    session: Option<&str>,
    term: Option<&str>,
) -> CoreResult<Vec<GradeRecord>> {
    grades_where(conn, "student_id", student_id, session, term)
}

/// Exact full-name match; the identity resolver's last tier.
pub fn grades_by_student_name(
    conn: &Connection,
    student_name: &str,
    session: Option<&str>,
    term: Option<&str>,
) -> CoreResult<Vec<GradeRecord>> {
    grades_where(conn, "student_name", student_name, session, term)
}

/// Mean of `total` over the set; 0.0 for an empty set so the caller can
/// always render a percentage.
pub fn average_score(grades: &[GradeRecord]) -> f64 {
    if grades.is_empty() {
        return 0.0;
    }
    let sum: i64 = grades.iter().map(|g| g.total).sum();
    sum as f64 / grades.len() as f64
}

fn map_payment(row: &Row) -> rusqlite::Result<PaymentRecord> {
    Ok(PaymentRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        student_name: row.get(2)?,
        admission_number: row.get(3)?,
        receipt_number: row.get(4)?,
        amount: row.get(5)?,
        payment_method: row.get(6)?,
        bank_name: row.get(7)?,
        account_number: row.get(8)?,
        transaction_id: row.get(9)?,
        description: row.get(10)?,
        academic_session: row.get(11)?,
        term: row.get(12)?,
        date_issued: row.get(13)?,
        confirmed_by: row.get(14)?,
        created_at: row.get(15)?,
    })
}

pub fn payments_for_period(
    conn: &Connection,
    session: &str,
    term: &str,
) -> CoreResult<Vec<PaymentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, student_name, admission_number, receipt_number,
                amount, payment_method, bank_name, account_number, transaction_id,
                description, academic_session, term, date_issued, confirmed_by, created_at
         FROM payments
         WHERE academic_session = ? AND term = ?
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![session, term], map_payment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn financial_overview(
    conn: &Connection,
    session: &str,
    term: &str,
) -> CoreResult<FinancialOverview> {
    let payments = payments_for_period(conn, session, term)?;

    let mut total_revenue: i64 = 0;
    let mut by_method: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_description: BTreeMap<String, i64> = BTreeMap::new();
    for p in &payments {
        total_revenue += p.amount;
        *by_method.entry(p.payment_method.clone()).or_insert(0) += p.amount;
        *by_description.entry(p.description.clone()).or_insert(0) += p.amount;
    }

    let payment_count = payments.len() as i64;
    let average_payment = if payment_count > 0 {
        total_revenue as f64 / payment_count as f64
    } else {
        0.0
    };

    Ok(FinancialOverview {
        academic_session: session.to_string(),
        term: term.to_string(),
        total_revenue,
        payment_count,
        average_payment,
        by_method,
        by_description,
    })
}

/// Revenue minus approved/completed expenditure for the period. The one
/// place where the payment ledger and the workflow records compose.
pub fn net_position(conn: &Connection, session: &str, term: &str) -> CoreResult<NetPosition> {
    let total_revenue: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments
         WHERE academic_session = ? AND term = ?",
        params![session, term],
        |r| r.get(0),
    )?;
    let approved_expenditure: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM workflow_records
         WHERE kind = 'expenditure_request'
           AND status IN ('approved', 'completed')
           AND academic_session = ? AND term = ?",
        params![session, term],
        |r| r.get(0),
    )?;
    Ok(NetPosition {
        academic_session: session.to_string(),
        term: term.to_string(),
        total_revenue,
        approved_expenditure,
        net_position: total_revenue - approved_expenditure,
    })
}
