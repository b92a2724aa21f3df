use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolcored");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolcored");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn result(value: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok response, got {value}"
    );
    value.get("result").expect("result")
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected error response, got {value}"
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

fn record_field<'a>(value: &'a serde_json::Value, field: &str) -> &'a serde_json::Value {
    result(value)
        .get("record")
        .and_then(|r| r.get(field))
        .unwrap_or(&serde_json::Value::Null)
}

#[test]
fn expenditure_request_walks_the_full_state_machine() {
    let workspace = temp_dir("schoolcore-workflow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "2",
        "workflow.create",
        json!({
            "ownerId": "bursar-1",
            "ownerName": "Bursar",
            "academicSession": "2024/2025",
            "term": "First Term",
            "body": {
                "kind": "expenditureRequest",
                "amount": 450000,
                "category": "laboratory equipment",
                "priority": "high"
            }
        }),
    );
    assert_eq!(record_field(&created, "status"), "draft");
    let id = record_field(&created, "id").as_str().expect("id").to_string();

    // Approving a draft is illegal and changes nothing.
    let early = request(
        &mut stdin,
        &mut reader,
        "3",
        "workflow.approve",
        json!({ "id": id, "reviewerId": "admin-1", "reviewerName": "Administrator" }),
    );
    assert_eq!(error_code(&early), "illegal_transition");

    let submitted = request(
        &mut stdin,
        &mut reader,
        "4",
        "workflow.submit",
        json!({ "id": id }),
    );
    assert_eq!(record_field(&submitted, "status"), "submitted");
    assert!(record_field(&submitted, "submittedAt").is_string());

    // Once submitted the payload is frozen.
    let frozen = request(
        &mut stdin,
        &mut reader,
        "5",
        "workflow.update",
        json!({
            "id": id,
            "patch": {
                "body": {
                    "kind": "expenditureRequest",
                    "amount": 1,
                    "category": "laboratory equipment",
                    "priority": "high"
                }
            }
        }),
    );
    assert_eq!(error_code(&frozen), "validation_error");
    let unchanged = request(
        &mut stdin,
        &mut reader,
        "6",
        "workflow.get",
        json!({ "id": id }),
    );
    assert_eq!(
        result(&unchanged)
            .get("record")
            .and_then(|r| r.get("body"))
            .and_then(|b| b.get("amount"))
            .and_then(|v| v.as_i64()),
        Some(450000)
    );

    let approved = request(
        &mut stdin,
        &mut reader,
        "7",
        "workflow.approve",
        json!({
            "id": id,
            "reviewerId": "admin-1",
            "reviewerName": "Administrator",
            "comment": "within budget"
        }),
    );
    assert_eq!(record_field(&approved, "status"), "approved");
    assert_eq!(record_field(&approved, "reviewerId"), "admin-1");
    assert_eq!(record_field(&approved, "reviewComment"), "within budget");

    let completed = request(
        &mut stdin,
        &mut reader,
        "8",
        "workflow.complete",
        json!({ "id": id }),
    );
    assert_eq!(record_field(&completed, "status"), "completed");
    assert!(record_field(&completed, "completedAt").is_string());

    // Terminal: nothing further is legal.
    let resubmit = request(
        &mut stdin,
        &mut reader,
        "9",
        "workflow.submit",
        json!({ "id": id }),
    );
    assert_eq!(error_code(&resubmit), "illegal_transition");
    let delete = request(
        &mut stdin,
        &mut reader,
        "10",
        "workflow.delete",
        json!({ "id": id }),
    );
    assert_eq!(error_code(&delete), "validation_error");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn rejection_needs_a_comment_and_reopens_the_editing_window() {
    let workspace = temp_dir("schoolcore-reject");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "2",
        "workflow.create",
        json!({
            "ownerId": "officer-1",
            "ownerName": "Exam Officer",
            "academicSession": "2024/2025",
            "term": "Second Term",
            "body": {
                "kind": "examOfficerReport",
                "content": "Mid-term examinations held as scheduled."
            }
        }),
    );
    let id = record_field(&created, "id").as_str().expect("id").to_string();

    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "workflow.submit",
        json!({ "id": id }),
    );

    let no_comment = request(
        &mut stdin,
        &mut reader,
        "4",
        "workflow.reject",
        json!({ "id": id, "reviewerId": "admin-1", "reviewerName": "Administrator" }),
    );
    assert_eq!(error_code(&no_comment), "validation_error");

    let rejected = request(
        &mut stdin,
        &mut reader,
        "5",
        "workflow.reject",
        json!({
            "id": id,
            "reviewerId": "admin-1",
            "reviewerName": "Administrator",
            "comment": "please include absentee figures"
        }),
    );
    assert_eq!(record_field(&rejected, "status"), "rejected");

    // Exam-officer reports never complete, even after approval elsewhere.
    let complete = request(
        &mut stdin,
        &mut reader,
        "6",
        "workflow.complete",
        json!({ "id": id }),
    );
    assert_eq!(error_code(&complete), "validation_error");

    let edited = request(
        &mut stdin,
        &mut reader,
        "7",
        "workflow.update",
        json!({
            "id": id,
            "patch": {
                "body": {
                    "kind": "examOfficerReport",
                    "content": "Mid-term examinations held as scheduled; 12 absentees recorded."
                }
            }
        }),
    );
    assert_eq!(record_field(&edited, "status"), "draft");
    assert!(record_field(&edited, "reviewerId").is_null());
    assert!(record_field(&edited, "submittedAt").is_null());

    let resubmitted = request(
        &mut stdin,
        &mut reader,
        "8",
        "workflow.submit",
        json!({ "id": id }),
    );
    assert_eq!(record_field(&resubmitted, "status"), "submitted");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn missing_records_are_a_null_sentinel_on_get_and_not_found_on_transitions() {
    let workspace = temp_dir("schoolcore-missing");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let get = request(
        &mut stdin,
        &mut reader,
        "2",
        "workflow.get",
        json!({ "id": "no-such-record" }),
    );
    assert!(result(&get).get("record").expect("record key").is_null());

    let submit = request(
        &mut stdin,
        &mut reader,
        "3",
        "workflow.submit",
        json!({ "id": "no-such-record" }),
    );
    assert_eq!(error_code(&submit), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
