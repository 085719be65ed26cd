#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rekapd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rekapd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

/// Sends one request and returns the whole envelope, success or not.
pub fn request(
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

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Error code of a failed response; panics if the call succeeded.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

pub fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
        .to_string()
}

/// A class with two teachers: `homeroom` teaches `math`, `other` teaches
/// `science`. Students are created in non-alphabetical order.
pub struct School {
    pub homeroom: String,
    pub other: String,
    pub class_id: String,
    pub math: String,
    pub science: String,
    /// (full name, id) in creation order: Zulkifli, Çağla, Ahmad.
    pub students: Vec<(String, String)>,
}

impl School {
    pub fn student(&self, name: &str) -> &str {
        self.students
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| id.as_str())
            .unwrap_or_else(|| panic!("no student {}", name))
    }
}

pub fn seed_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) -> School {
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let homeroom = str_field(
        &request_ok(
            stdin,
            reader,
            "seed-t1",
            "teachers.create",
            json!({ "fullName": "Bu Sari", "employeeNo": "197001" }),
        ),
        "teacherId",
    );
    let other = str_field(
        &request_ok(
            stdin,
            reader,
            "seed-t2",
            "teachers.create",
            json!({ "fullName": "Pak Budi" }),
        ),
        "teacherId",
    );
    let class_id = str_field(
        &request_ok(
            stdin,
            reader,
            "seed-class",
            "classes.create",
            json!({ "name": "7A", "homeroomTeacherId": homeroom }),
        ),
        "classId",
    );
    let math = str_field(
        &request_ok(
            stdin,
            reader,
            "seed-math",
            "subjects.create",
            json!({ "name": "Matematika", "classId": class_id, "teacherId": homeroom }),
        ),
        "subjectId",
    );
    let science = str_field(
        &request_ok(
            stdin,
            reader,
            "seed-science",
            "subjects.create",
            json!({ "name": "IPA", "classId": class_id, "teacherId": other }),
        ),
        "subjectId",
    );
    let mut students = Vec::new();
    for (i, name) in ["Zulkifli", "Çağla", "Ahmad"].iter().enumerate() {
        let id = str_field(
            &request_ok(
                stdin,
                reader,
                &format!("seed-student-{}", i),
                "students.create",
                json!({
                    "classId": class_id,
                    "fullName": name,
                    "studentNumber": format!("24{:03}", i + 1)
                }),
            ),
            "studentId",
        );
        students.push((name.to_string(), id));
    }
    School {
        homeroom,
        other,
        class_id,
        math,
        science,
        students,
    }
}

/// Names of the pivot rows in display order.
pub fn row_names(view: &serde_json::Value) -> Vec<String> {
    view.get("rows")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|r| {
            r.get("student")
                .and_then(|s| s.get("fullName"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        })
        .collect()
}

pub fn row_for<'a>(view: &'a serde_json::Value, name: &str) -> &'a serde_json::Value {
    view.get("rows")
        .and_then(|v| v.as_array())
        .and_then(|rows| {
            rows.iter().find(|r| {
                r.get("student")
                    .and_then(|s| s.get("fullName"))
                    .and_then(|v| v.as_str())
                    == Some(name)
            })
        })
        .unwrap_or_else(|| panic!("no row for {}", name))
}
