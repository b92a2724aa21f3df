use serde_json::json;

use crate::ipc::error::{core_err, err, ok};
use crate::ipc::types::{str_param, AppState, Request};
use crate::ledger::{self, GradeInput, PaymentInput};
use crate::resolve;

fn handle_record_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let input: GradeInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid grade: {e}"), None),
    };
    match ledger::record_grade(conn, &input) {
        Ok(grade) => ok(&req.id, json!({ "grade": grade })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_record_payment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let input: PaymentInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid payment: {e}"), None),
    };
    match ledger::record_payment(conn, &input) {
        Ok(payment) => ok(&req.id, json!({ "payment": payment })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_grades_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = str_param(req, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let session = str_param(req, "academicSession");
    let term = str_param(req, "term");
    match ledger::grades_for_student(conn, student_id, session, term) {
        Ok(grades) => {
            let average_score = ledger::average_score(&grades);
            ok(
                &req.id,
                json!({ "grades": grades, "averageScore": average_score }),
            )
        }
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_payments_for_period(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(session), Some(term)) = (str_param(req, "academicSession"), str_param(req, "term"))
    else {
        return err(&req.id, "bad_params", "missing academicSession/term", None);
    };
    match ledger::payments_for_period(conn, session, term) {
        Ok(payments) => ok(&req.id, json!({ "payments": payments })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_financial_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(session), Some(term)) = (str_param(req, "academicSession"), str_param(req, "term"))
    else {
        return err(&req.id, "bad_params", "missing academicSession/term", None);
    };
    match ledger::financial_overview(conn, session, term) {
        Ok(overview) => ok(&req.id, json!({ "overview": overview })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_net_position(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(session), Some(term)) = (str_param(req, "academicSession"), str_param(req, "term"))
    else {
        return err(&req.id, "bad_params", "missing academicSession/term", None);
    };
    match ledger::net_position(conn, session, term) {
        Ok(position) => ok(&req.id, json!({ "position": position })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_resolve_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = str_param(req, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let admission_number = str_param(req, "admissionNumber").unwrap_or("");
    let full_name = str_param(req, "fullName").unwrap_or("");
    let session = str_param(req, "academicSession");
    let term = str_param(req, "term");
    match resolve::resolve_grades(conn, student_id, admission_number, full_name, session, term) {
        Ok(resolved) => {
            let average_score = ledger::average_score(&resolved.grades);
            ok(
                &req.id,
                json!({
                    "matchedBy": resolved.matched_by,
                    "grades": resolved.grades,
                    "averageScore": average_score
                }),
            )
        }
        Err(e) => core_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ledger.recordGrade" => Some(handle_record_grade(state, req)),
        "ledger.recordPayment" => Some(handle_record_payment(state, req)),
        "ledger.gradesForStudent" => Some(handle_grades_for_student(state, req)),
        "ledger.paymentsForPeriod" => Some(handle_payments_for_period(state, req)),
        "ledger.financialOverview" => Some(handle_financial_overview(state, req)),
        "ledger.netPosition" => Some(handle_net_position(state, req)),
        "ledger.resolveGrades" => Some(handle_resolve_grades(state, req)),
        _ => None,
    }
}
