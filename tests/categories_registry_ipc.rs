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
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[test]
fn storage_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").is_some());

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "categories.seedDefaults",
        json!({ "tenantId": "t" }),
    );
    assert_eq!(error_code(&resp), "no_workspace");

    let resp = request(&mut stdin, &mut reader, "3", "nope.method", json!({}));
    assert_eq!(error_code(&resp), "not_implemented");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn seed_defaults_twice_leaves_one_scale() {
    let workspace = temp_dir("gradebook-seed");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "categories.seedDefaults",
        json!({ "tenantId": "north" }),
    );
    assert_eq!(first["seeded"], true);
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "categories.seedDefaults",
        json!({ "tenantId": "north" }),
    );
    assert_eq!(second["seeded"], false);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "categories.list",
        json!({ "tenantId": "north" }),
    );
    let names: Vec<&str> = listed["categories"]
        .as_array()
        .expect("categories")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["A+", "A", "B+", "B", "C", "D", "F"]);

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "categories.list",
        json!({ "tenantId": "south" }),
    );
    assert_eq!(other["categories"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn overlapping_bands_are_rejected_with_the_conflict_named() {
    let workspace = temp_dir("gradebook-overlap");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let low = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "categories.create",
        json!({
            "name": "Below",
            "minPercentage": 0,
            "maxPercentage": 50,
            "gradePoint": 0,
            "isPassing": false,
            "order": 1
        }),
    );
    let low_id = low["category"]["id"].as_str().expect("id").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "categories.create",
        json!({
            "name": "Meets",
            "minPercentage": 50,
            "maxPercentage": 100,
            "gradePoint": 3,
            "isPassing": true,
            "order": 2
        }),
    );

    let overlap = request(
        &mut stdin,
        &mut reader,
        "4",
        "categories.update",
        json!({ "categoryId": low_id, "maxPercentage": 60 }),
    );
    assert_eq!(error_code(&overlap), "overlapping_range");
    assert_eq!(overlap["error"]["details"]["conflicting"], "Meets");

    let inverted = request(
        &mut stdin,
        &mut reader,
        "5",
        "categories.create",
        json!({
            "name": "Odd",
            "minPercentage": 80,
            "maxPercentage": 70,
            "gradePoint": 1,
            "order": 3
        }),
    );
    assert_eq!(error_code(&inverted), "invalid_range");

    // 50 sits on the shared boundary and goes to the higher-order band.
    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "calc.resolveCategory",
        json!({ "percentage": 50 }),
    );
    assert_eq!(resolved["category"]["name"], "Meets");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn deleting_a_band_in_use_is_blocked() {
    let workspace = temp_dir("gradebook-delete-policy");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seeded = request_ok(&mut stdin, &mut reader, "2", "categories.seedDefaults", json!({}));
    let id_of = |name: &str| -> String {
        seeded["categories"]
            .as_array()
            .expect("categories")
            .iter()
            .find(|c| c["name"] == name)
            .and_then(|c| c["id"].as_str())
            .expect("band id")
            .to_string()
    };

    let recorded = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.record",
        json!({
            "studentId": "s1",
            "examId": "term1",
            "subjectId": "science",
            "classId": "8B",
            "academicYear": "2025-26",
            "marksObtained": 38,
            "maxMarks": 100
        }),
    );
    assert_eq!(recorded["computed"]["category"]["name"], "F");

    let blocked = request(
        &mut stdin,
        &mut reader,
        "4",
        "categories.delete",
        json!({ "categoryId": id_of("F") }),
    );
    assert_eq!(error_code(&blocked), "category_in_use");
    assert_eq!(blocked["error"]["details"]["entries"], 1);

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "categories.delete",
        json!({ "categoryId": id_of("A+") }),
    );

    let grade_id = recorded["grade"]["id"].as_str().expect("grade id").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.delete",
        json!({ "gradeId": grade_id }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "categories.delete",
        json!({ "categoryId": id_of("F") }),
    );

    drop(stdin);
    let _ = child.wait();
}
