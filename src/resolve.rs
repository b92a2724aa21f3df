use rusqlite::Connection;
use serde::Serialize;

use crate::error::CoreResult;
use crate::ledger::{self, GradeRecord};

/// Which lookup tier produced the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchTier {
    Id,
    AdmissionNumber,
    Name,
    None,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedGrades {
    pub matched_by: MatchTier,
    pub grades: Vec<GradeRecord>,
}

/// Ledger rows are written by different roles at different times and are not
/// always keyed by the student's internal id: some are keyed by admission
/// number, a few only carry the display name. This chain tries the stable id
/// first, then the admission number, then an exact full-name match, and
/// stops at the first tier that returns anything — tiers are never merged.
pub fn resolve_grades(
    conn: &Connection,
    raw_id: &str,
    admission_number: &str,
    full_name: &str,
    session: Option<&str>,
    term: Option<&str>,
) -> CoreResult<ResolvedGrades> {
    if !raw_id.trim().is_empty() {
        let grades = ledger::grades_for_student(conn, raw_id, session, term)?;
        if !grades.is_empty() {
            return Ok(ResolvedGrades {
                matched_by: MatchTier::Id,
                grades,
            });
        }
    }

    if !admission_number.trim().is_empty() {
        let grades = ledger::grades_for_student(conn, admission_number, session, term)?;
        if !grades.is_empty() {
            return Ok(ResolvedGrades {
                matched_by: MatchTier::AdmissionNumber,
                grades,
            });
        }
    }

    if !full_name.trim().is_empty() {
        let grades = ledger::grades_by_student_name(conn, full_name, session, term)?;
        if !grades.is_empty() {
            return Ok(ResolvedGrades {
                matched_by: MatchTier::Name,
                grades,
            });
        }
    }

    Ok(ResolvedGrades {
        matched_by: MatchTier::None,
        grades: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::ledger::{record_grade, GradeInput};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init_schema(&conn).expect("init schema");
        conn
    }

    fn grade_keyed_by(conn: &Connection, key: &str, name: &str, subject: &str) {
        record_grade(
            conn,
            &GradeInput {
                student_id: key.to_string(),
                student_name: name.to_string(),
                admission_number: String::new(),
                subject_id: subject.to_string(),
                subject_name: subject.to_uppercase(),
                academic_session: "2024/2025".to_string(),
                term: "First Term".to_string(),
                ca1: 10,
                ca2: 10,
                exam: 50,
                remark: None,
                position: None,
            },
        )
        .expect("record grade");
    }

    #[test]
    fn falls_back_to_admission_number() {
        let conn = test_conn();
        // Teacher keyed the row by admission number, not the internal id.
        grade_keyed_by(&conn, "ADM/042", "Ada Obi", "mat");

        let resolved = resolve_grades(
            &conn,
            "student-42",
            "ADM/042",
            "Ada Obi",
            Some("2024/2025"),
            Some("First Term"),
        )
        .expect("resolve");
        assert_eq!(resolved.matched_by, MatchTier::AdmissionNumber);
        assert_eq!(resolved.grades.len(), 1);
    }

    #[test]
    fn prefers_id_tier_when_both_match() {
        let conn = test_conn();
        grade_keyed_by(&conn, "student-42", "Ada Obi", "mat");
        grade_keyed_by(&conn, "ADM/042", "Ada Obi", "eng");

        let resolved =
            resolve_grades(&conn, "student-42", "ADM/042", "Ada Obi", None, None).expect("resolve");
        assert_eq!(resolved.matched_by, MatchTier::Id);
        // First tier only; the admission-number rows are not merged in.
        assert_eq!(resolved.grades.len(), 1);
        assert_eq!(resolved.grades[0].subject_id, "mat");
    }

    #[test]
    fn last_tier_matches_exact_name() {
        let conn = test_conn();
        grade_keyed_by(&conn, "legacy-row-1", "Ada Obi", "mat");

        let resolved =
            resolve_grades(&conn, "student-42", "ADM/042", "Ada Obi", None, None).expect("resolve");
        assert_eq!(resolved.matched_by, MatchTier::Name);
        assert_eq!(resolved.grades.len(), 1);

        let miss =
            resolve_grades(&conn, "student-42", "ADM/042", "Ada O.", None, None).expect("resolve");
        assert_eq!(miss.matched_by, MatchTier::None);
        assert!(miss.grades.is_empty());
    }
}
