use serde_json::json;

use crate::ipc::error::{core_err, err, ok};
use crate::ipc::types::{str_param, AppState, Request};
use crate::store::{self, RecordBody, RecordKind};
use crate::workflow::{self, RecordPatch};

fn kind_param(req: &Request) -> Option<RecordKind> {
    req.params
        .get("kind")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(owner_id), Some(owner_name), Some(session), Some(term)) = (
        str_param(req, "ownerId"),
        str_param(req, "ownerName"),
        str_param(req, "academicSession"),
        str_param(req, "term"),
    ) else {
        return err(
            &req.id,
            "bad_params",
            "missing ownerId/ownerName/academicSession/term",
            None,
        );
    };
    let body: RecordBody = match req.params.get("body") {
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(b) => b,
            Err(e) => return err(&req.id, "bad_params", format!("invalid body: {e}"), None),
        },
        None => return err(&req.id, "bad_params", "missing body", None),
    };

    match workflow::create(conn, owner_id, owner_name, session, term, body) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = str_param(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    // Absence is a null sentinel, not an error: callers branch explicitly.
    match store::get_record(conn, id) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_list_by_owner(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(kind) = kind_param(req) else {
        return err(&req.id, "bad_params", "missing or unknown kind", None);
    };
    let Some(owner_id) = str_param(req, "ownerId") else {
        return err(&req.id, "bad_params", "missing ownerId", None);
    };
    match store::list_by_owner(conn, kind, owner_id) {
        Ok(records) => ok(&req.id, json!({ "records": records })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_list_by_period(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(kind) = kind_param(req) else {
        return err(&req.id, "bad_params", "missing or unknown kind", None);
    };
    let (Some(session), Some(term)) = (str_param(req, "academicSession"), str_param(req, "term"))
    else {
        return err(&req.id, "bad_params", "missing academicSession/term", None);
    };
    match store::list_by_period(conn, kind, session, term) {
        Ok(records) => ok(&req.id, json!({ "records": records })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = str_param(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let patch: RecordPatch = match req.params.get("patch") {
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(p) => p,
            Err(e) => return err(&req.id, "bad_params", format!("invalid patch: {e}"), None),
        },
        None => return err(&req.id, "bad_params", "missing patch", None),
    };
    match workflow::edit(conn, id, patch) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = str_param(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    match workflow::submit(conn, id) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_approve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = str_param(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let (Some(reviewer_id), Some(reviewer_name)) =
        (str_param(req, "reviewerId"), str_param(req, "reviewerName"))
    else {
        return err(&req.id, "bad_params", "missing reviewerId/reviewerName", None);
    };
    let comment = str_param(req, "comment");
    match workflow::approve(conn, id, reviewer_id, reviewer_name, comment) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_reject(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = str_param(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let (Some(reviewer_id), Some(reviewer_name)) =
        (str_param(req, "reviewerId"), str_param(req, "reviewerName"))
    else {
        return err(&req.id, "bad_params", "missing reviewerId/reviewerName", None);
    };
    // Comment mandatoriness is the engine's rule, so it surfaces as
    // validation_error rather than bad_params.
    let comment = str_param(req, "comment").unwrap_or("");
    match workflow::reject(conn, id, reviewer_id, reviewer_name, comment) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_complete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = str_param(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    match workflow::complete(conn, id) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => core_err(&req.id, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = str_param(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    match workflow::delete(conn, id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => core_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "workflow.create" => Some(handle_create(state, req)),
        "workflow.get" => Some(handle_get(state, req)),
        "workflow.listByOwner" => Some(handle_list_by_owner(state, req)),
        "workflow.listByPeriod" => Some(handle_list_by_period(state, req)),
        "workflow.update" => Some(handle_update(state, req)),
        "workflow.submit" => Some(handle_submit(state, req)),
        "workflow.approve" => Some(handle_approve(state, req)),
        "workflow.reject" => Some(handle_reject(state, req)),
        "workflow.complete" => Some(handle_complete(state, req)),
        "workflow.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
