use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("schoolcore.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Idempotent schema setup. Split out of `open_db` so tests can run the same
/// schema against an in-memory connection.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workflow_records(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            owner_name TEXT NOT NULL,
            academic_session TEXT NOT NULL,
            term TEXT NOT NULL,
            amount INTEGER,
            body TEXT NOT NULL,
            reviewer_id TEXT,
            reviewer_name TEXT,
            reviewed_at TEXT,
            review_comment TEXT,
            submitted_at TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workflow_owner ON workflow_records(kind, owner_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workflow_period ON workflow_records(academic_session, term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            admission_number TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            academic_session TEXT NOT NULL,
            term TEXT NOT NULL,
            ca1 INTEGER NOT NULL,
            ca2 INTEGER NOT NULL,
            exam INTEGER NOT NULL,
            total INTEGER NOT NULL,
            grade TEXT NOT NULL,
            remark TEXT NOT NULL,
            position INTEGER,
            created_at TEXT NOT NULL,
            UNIQUE(student_id, subject_id, academic_session, term)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_period ON grades(academic_session, term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            admission_number TEXT NOT NULL,
            receipt_number TEXT NOT NULL UNIQUE,
            amount INTEGER NOT NULL,
            payment_method TEXT NOT NULL,
            bank_name TEXT,
            account_number TEXT,
            transaction_id TEXT NOT NULL,
            description TEXT NOT NULL,
            academic_session TEXT NOT NULL,
            term TEXT NOT NULL,
            date_issued TEXT NOT NULL,
            confirmed_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_period ON payments(academic_session, term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            category TEXT NOT NULL,
            academic_session TEXT NOT NULL,
            term TEXT NOT NULL,
            message TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE(student_id, academic_session, term, category)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_student ON notifications(student_id)",
        [],
    )?;

    Ok(())
}
