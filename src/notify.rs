use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::store::now_iso;

pub const TERMS: [&str; 3] = ["First Term", "Second Term", "Third Term"];
pub const DEFAULT_SESSION_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Result,
    Payment,
    Both,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Result => "result",
            Category::Payment => "payment",
            Category::Both => "both",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "result" => Some(Category::Result),
            "payment" => Some(Category::Payment),
            "both" => Some(Category::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub student_id: String,
    pub category: Category,
    pub academic_session: String,
    pub term: String,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

fn map_notification(row: &Row) -> rusqlite::Result<Notification> {
    let category_raw: String = row.get(2)?;
    let category = Category::parse(&category_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown notification category '{category_raw}'").into(),
        )
    })?;
    Ok(Notification {
        id: row.get(0)?,
        student_id: row.get(1)?,
        category,
        academic_session: row.get(3)?,
        term: row.get(4)?,
        message: row.get(5)?,
        read: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

fn message_for(category: Category, session: &str, term: &str) -> String {
    match category {
        Category::Both => format!(
            "Your results and payment records for {term}, {session} are now available."
        ),
        Category::Result => format!("Your results for {term}, {session} are now available."),
        Category::Payment => {
            format!("Your payment for {term}, {session} has been confirmed and receipted.")
        }
    }
}

/// The N most recent sessions seen in either ledger. Session names like
/// `2024/2025` sort chronologically as text.
fn recent_sessions(conn: &Connection, window: usize) -> CoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT academic_session FROM (
            SELECT academic_session FROM grades
            UNION
            SELECT academic_session FROM payments
         ) ORDER BY academic_session DESC LIMIT ?",
    )?;
    let rows = stmt
        .query_map([window as i64], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn has_ledger_rows(
    conn: &Connection,
    table: &str,
    student_id: &str,
    session: &str,
    term: &str,
) -> CoreResult<bool> {
    let sql = format!(
        "SELECT 1 FROM {table}
         WHERE student_id = ? AND academic_session = ? AND term = ? LIMIT 1"
    );
    let found: Option<i64> = conn
        .query_row(&sql, params![student_id, session, term], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn cell_has_notification(
    conn: &Connection,
    student_id: &str,
    session: &str,
    term: &str,
) -> CoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM notifications
             WHERE student_id = ? AND academic_session = ? AND term = ? LIMIT 1",
            params![student_id, session, term],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Derives notifications for a student from the two ledgers and returns the
/// student's full list, newest first. Safe to call any number of times: a
/// (student, session, term) cell that already carries a notification is left
/// untouched, whatever its category — an early `result`-only notification is
/// deliberately not upgraded to `both` when payment data arrives later.
pub fn refresh(
    conn: &Connection,
    student_id: &str,
    session_window: Option<usize>,
) -> CoreResult<Vec<Notification>> {
    if student_id.trim().is_empty() {
        return Err(CoreError::validation("missing studentId"));
    }
    let window = session_window.unwrap_or(DEFAULT_SESSION_WINDOW);

    for session in recent_sessions(conn, window)? {
        for term in TERMS {
            let has_grades = has_ledger_rows(conn, "grades", student_id, &session, term)?;
            let has_payments = has_ledger_rows(conn, "payments", student_id, &session, term)?;
            let category = match (has_grades, has_payments) {
                (true, true) => Category::Both,
                (true, false) => Category::Result,
                (false, true) => Category::Payment,
                (false, false) => continue,
            };
            if cell_has_notification(conn, student_id, &session, term)? {
                continue;
            }

            let dup_key = format!("notification for {student_id} ({session} {term})");
            conn.execute(
                "INSERT INTO notifications(
                    id, student_id, category, academic_session, term, message, read, created_at
                 ) VALUES (?1,?2,?3,?4,?5,?6,0,?7)",
                params![
                    Uuid::new_v4().to_string(),
                    student_id,
                    category.as_str(),
                    session,
                    term,
                    message_for(category, &session, term),
                    now_iso(),
                ],
            )
            .map_err(|e| CoreError::from_insert(e, &dup_key))?;
        }
    }

    list_for_student(conn, student_id)
}

pub fn list_for_student(conn: &Connection, student_id: &str) -> CoreResult<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, category, academic_session, term, message, read, created_at
         FROM notifications
         WHERE student_id = ?
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([student_id], map_notification)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Idempotent: re-marking an already-read notification is a no-op.
pub fn mark_read(conn: &Connection, id: &str) -> CoreResult<Notification> {
    let n = conn.execute("UPDATE notifications SET read = 1 WHERE id = ?", [id])?;
    if n == 0 {
        return Err(CoreError::NotFound);
    }
    conn.query_row(
        "SELECT id, student_id, category, academic_session, term, message, read, created_at
         FROM notifications WHERE id = ?",
        [id],
        map_notification,
    )
    .optional()?
    .ok_or(CoreError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::ledger::{record_grade, record_payment, GradeInput, PaymentInput};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init_schema(&conn).expect("init schema");
        conn
    }

    fn grade(conn: &Connection, student: &str, subject: &str, session: &str, term: &str) {
        record_grade(
            conn,
            &GradeInput {
                student_id: student.to_string(),
                student_name: format!("Student {student}"),
                admission_number: format!("ADM/{student}"),
                subject_id: subject.to_string(),
                subject_name: subject.to_uppercase(),
                academic_session: session.to_string(),
                term: term.to_string(),
                ca1: 15,
                ca2: 15,
                exam: 50,
                remark: None,
                position: None,
            },
        )
        .expect("record grade");
    }

    fn payment(conn: &Connection, student: &str, receipt: &str, session: &str, term: &str) {
        record_payment(
            conn,
            &PaymentInput {
                student_id: student.to_string(),
                student_name: format!("Student {student}"),
                admission_number: format!("ADM/{student}"),
                receipt_number: receipt.to_string(),
                amount: 50_000,
                payment_method: "cash".to_string(),
                bank_name: None,
                account_number: None,
                transaction_id: format!("tx-{receipt}"),
                description: "Tuition".to_string(),
                academic_session: session.to_string(),
                term: term.to_string(),
                date_issued: None,
                confirmed_by: "accountant-1".to_string(),
            },
        )
        .expect("record payment");
    }

    #[test]
    fn grades_and_payment_derive_a_single_both_notification() {
        let conn = test_conn();
        grade(&conn, "s1", "mat", "2024/2025", "First Term");
        payment(&conn, "s1", "RCP-001", "2024/2025", "First Term");

        let first = refresh(&conn, "s1", None).expect("refresh");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].category, Category::Both);
        assert!(!first[0].read);

        // Re-running with no new ledger data must not duplicate.
        let second = refresh(&conn, "s1", None).expect("refresh again");
        assert_eq!(second, first);
    }

    #[test]
    fn grades_only_and_payment_only_categories() {
        let conn = test_conn();
        grade(&conn, "s1", "mat", "2024/2025", "First Term");
        payment(&conn, "s1", "RCP-002", "2024/2025", "Second Term");

        let list = refresh(&conn, "s1", None).expect("refresh");
        assert_eq!(list.len(), 2);
        let by_term = |t: &str| list.iter().find(|n| n.term == t).expect("term cell");
        assert_eq!(by_term("First Term").category, Category::Result);
        assert_eq!(by_term("Second Term").category, Category::Payment);
    }

    #[test]
    fn partial_data_notification_is_not_upgraded_later() {
        let conn = test_conn();
        grade(&conn, "s1", "mat", "2024/2025", "First Term");
        let list = refresh(&conn, "s1", None).expect("refresh");
        assert_eq!(list[0].category, Category::Result);

        payment(&conn, "s1", "RCP-003", "2024/2025", "First Term");
        let list = refresh(&conn, "s1", None).expect("refresh after payment");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].category, Category::Result);
    }

    #[test]
    fn session_window_bounds_derivation() {
        let conn = test_conn();
        for session in ["2021/2022", "2022/2023", "2023/2024", "2024/2025"] {
            payment(
                &conn,
                "s1",
                &format!("RCP-{session}"),
                session,
                "First Term",
            );
        }

        // Default window keeps the three most recent sessions.
        let list = refresh(&conn, "s1", None).expect("refresh");
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|n| n.academic_session != "2021/2022"));

        // A wider window picks up the older session too.
        let list = refresh(&conn, "s1", Some(10)).expect("refresh wide");
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn other_students_data_does_not_leak() {
        let conn = test_conn();
        grade(&conn, "s2", "mat", "2024/2025", "First Term");
        let list = refresh(&conn, "s1", None).expect("refresh");
        assert!(list.is_empty());
    }

    #[test]
    fn mark_read_is_idempotent_and_checks_existence() {
        let conn = test_conn();
        grade(&conn, "s1", "mat", "2024/2025", "First Term");
        let list = refresh(&conn, "s1", None).expect("refresh");
        let id = list[0].id.clone();

        let n = mark_read(&conn, &id).expect("mark read");
        assert!(n.read);
        let n = mark_read(&conn, &id).expect("mark read again");
        assert!(n.read);

        assert!(matches!(
            mark_read(&conn, "missing").unwrap_err(),
            CoreError::NotFound
        ));
    }
}
