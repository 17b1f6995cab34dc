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
    let exe = env!("CARGO_BIN_EXE_academyd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn academyd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request_raw(
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

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request_raw(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// Asserts failure and returns the error code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request_raw(stdin, reader, id, method, params);
    assert!(
        !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .expect("error code")
        .to_string()
}

pub struct StudentFixture {
    pub id: String,
    pub actor: serde_json::Value,
    pub username: String,
}

pub struct Classroom {
    pub admin_actor: serde_json::Value,
    pub teacher_actor: serde_json::Value,
    pub teacher_id: String,
    pub course_id: String,
    pub evaluation_id: String,
    pub students: Vec<StudentFixture>,
}

pub const CLASSROOM_GRADE: i64 = 3;
pub const EVALUATION_DATE: &str = "2026-03-02T09:00:00";

/// Standard fixture: a seeded workspace, one teacher with a grade-3
/// Mathematics course holding one evaluation, and `student_count`
/// grade-3 students.
pub fn setup_classroom(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace_prefix: &str,
    student_count: usize,
) -> Classroom {
    let workspace = temp_dir(workspace_prefix);
    let mut seq = 0;
    let mut next_id = move || {
        seq += 1;
        format!("setup-{}", seq)
    };

    let _ = request_ok(
        stdin,
        reader,
        &next_id(),
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(stdin, reader, &next_id(), "setup.seedDefaults", json!({}));
    let login = request_ok(
        stdin,
        reader,
        &next_id(),
        "auth.login",
        json!({ "role": "admin", "username": "admin", "password": "admin123" }),
    );
    let admin_actor = login.get("actor").cloned().expect("admin actor");

    let teacher = request_ok(
        stdin,
        reader,
        &next_id(),
        "setup.users.create",
        json!({
            "actor": admin_actor,
            "role": "teacher",
            "username": "tmendoza",
            "firstName": "Teresa",
            "lastName": "Mendoza",
            "documentNo": "T-100",
            "email": "tmendoza@teacher.edu",
            "password": "passw0rd",
        }),
    );
    let teacher_actor = teacher.get("actor").cloned().expect("teacher actor");
    let teacher_id = teacher_actor
        .get("id")
        .and_then(|v| v.as_str())
        .expect("teacher id")
        .to_string();

    let course = request_ok(
        stdin,
        reader,
        &next_id(),
        "setup.courses.create",
        json!({
            "actor": admin_actor,
            "name": "Mathematics",
            "gradeLevel": CLASSROOM_GRADE,
            "teacherId": teacher_id,
        }),
    );
    let course_id = course
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("course id")
        .to_string();

    let evaluation = request_ok(
        stdin,
        reader,
        &next_id(),
        "evaluations.create",
        json!({
            "actor": teacher_actor,
            "courseId": course_id,
            "subject": "Algebra",
            "kind": "exam",
            "date": EVALUATION_DATE,
        }),
    );
    let evaluation_id = evaluation
        .get("evaluation")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("evaluation id")
        .to_string();

    let mut students = Vec::with_capacity(student_count);
    for i in 0..student_count {
        let username = format!("student{:02}", i);
        let created = request_ok(
            stdin,
            reader,
            &next_id(),
            "setup.users.create",
            json!({
                "actor": admin_actor,
                "role": "student",
                "username": username,
                "firstName": "Ana",
                "lastName": format!("Fuentes{:02}", i),
                "documentNo": format!("S-{:03}", i),
                "email": format!("{}@example.edu", username),
                "password": "passw0rd",
                "gradeLevel": CLASSROOM_GRADE,
            }),
        );
        let actor = created.get("actor").cloned().expect("student actor");
        let id = actor
            .get("id")
            .and_then(|v| v.as_str())
            .expect("student id")
            .to_string();
        students.push(StudentFixture {
            id,
            actor,
            username,
        });
    }

    Classroom {
        admin_actor,
        teacher_actor,
        teacher_id,
        course_id,
        evaluation_id,
        students,
    }
}
