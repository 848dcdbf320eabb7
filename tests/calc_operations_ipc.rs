use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

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

fn scale() -> serde_json::Value {
    json!([
        { "name": "Pass", "minPercentage": 40, "maxPercentage": 100, "gradePoint": 2.0, "isPassing": true, "order": 2 },
        { "name": "Fail", "minPercentage": 0, "maxPercentage": 40, "gradePoint": 0.0, "isPassing": false, "order": 1 }
    ])
}

#[test]
fn pure_operations_work_without_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let boundary = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.resolveCategory",
        json!({ "percentage": 40, "categories": scale() }),
    );
    assert_eq!(boundary["category"]["name"], "Pass");

    let out_of_range = request(
        &mut stdin,
        &mut reader,
        "2",
        "calc.resolveCategory",
        json!({ "percentage": 101, "categories": scale() }),
    );
    assert_eq!(error_code(&out_of_range), "invalid_percentage");

    let gap = request(
        &mut stdin,
        &mut reader,
        "3",
        "calc.resolveCategory",
        json!({ "percentage": 20, "categories": [scale()[0].clone()] }),
    );
    assert_eq!(error_code(&gap), "no_matching_category");

    let full = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calc.subjectGrade",
        json!({ "marksObtained": 25, "maxMarks": 25, "categories": scale() }),
    );
    assert_eq!(full["subjectGrade"]["percentage"].as_f64(), Some(100.0));
    assert_eq!(full["subjectGrade"]["passed"], true);

    let missing_scale = request(
        &mut stdin,
        &mut reader,
        "5",
        "calc.subjectGrade",
        json!({ "marksObtained": 25, "maxMarks": 25 }),
    );
    assert_eq!(error_code(&missing_scale), "no_workspace");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn summarize_and_report_card_from_explicit_inputs() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.summarizeExam",
        json!({ "subjectGrades": [] }),
    );
    assert_eq!(empty["summary"]["insufficientData"], true);
    assert_eq!(empty["summary"]["overallPercentage"].as_f64(), Some(0.0));

    let a = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calc.subjectGrade",
        json!({ "marksObtained": 100, "maxMarks": 100, "categories": scale() }),
    );
    let b = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calc.subjectGrade",
        json!({ "marksObtained": 0, "maxMarks": 100, "categories": scale() }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calc.summarizeExam",
        json!({
            "subjectGrades": [a["subjectGrade"].clone(), b["subjectGrade"].clone()],
            "categories": scale()
        }),
    );
    assert_eq!(summary["summary"]["overallPercentage"].as_f64(), Some(50.0));
    assert_eq!(summary["summary"]["overallGrade"]["name"], "Pass");
    assert_eq!(summary["summary"]["result"], "Fail");

    let card = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calc.reportCard",
        json!({
            "examSummaries": [
                { "examId": "e2", "totalMarksObtained": 50, "totalMaxMarks": 100,
                  "overallPercentage": 50.0, "overallGrade": null, "gpa": 2.0, "result": "Pass" },
                { "examId": "e1", "totalMarksObtained": 80, "totalMaxMarks": 100,
                  "overallPercentage": 80.0, "overallGrade": null, "gpa": 3.5, "result": "Fail" }
            ]
        }),
    );
    let card = &card["reportCard"];
    assert_eq!(card["cumulativeGpa"].as_f64(), Some(2.75));
    assert_eq!(card["cumulativePercentage"].as_f64(), Some(65.0));
    assert_eq!(card["overallResult"], "Fail");
    assert_eq!(card["exams"][0]["examId"], "e1");

    let bad = request(
        &mut stdin,
        &mut reader,
        "6",
        "calc.reportCard",
        json!({ "examSummaries": "nope" }),
    );
    assert_eq!(error_code(&bad), "bad_params");

    drop(stdin);
    let _ = child.wait();
}
