use serde_json::json;

use crate::ipc::error::{core_err, err, ok};
use crate::ipc::types::{str_param, AppState, Request};
use crate::notify;

fn handle_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = str_param(req, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let session_window = req
        .params
        .get("sessionWindow")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize);
    match notify::refresh(conn, student_id, session_window) {
        Ok(notifications) => ok(&req.id, json!({ "notifications": notifications })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = str_param(req, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    match notify::list_for_student(conn, student_id) {
        Ok(notifications) => ok(&req.id, json!({ "notifications": notifications })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_mark_read(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = str_param(req, "notificationId") else {
        return err(&req.id, "bad_params", "missing notificationId", None);
    };
    match notify::mark_read(conn, id) {
        Ok(notification) => ok(&req.id, json!({ "notification": notification })),
        Err(e) => core_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.refresh" => Some(handle_refresh(state, req)),
        "notifications.list" => Some(handle_list(state, req)),
        "notifications.markRead" => Some(handle_mark_read(state, req)),
        _ => None,
    }
}
