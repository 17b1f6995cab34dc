mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, setup_classroom, spawn_sidecar};

#[test]
fn malformed_and_out_of_range_values_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = setup_classroom(&mut stdin, &mut reader, "academy-validation", 1);
    let student = &classroom.students[0];

    for (id, value) in [
        ("1", json!("not a number")),
        ("2", json!(25.0)),
        ("3", json!(-1.0)),
        ("4", json!(true)),
    ] {
        let code = request_err(
            &mut stdin,
            &mut reader,
            id,
            "scores.submit",
            json!({
                "actor": classroom.teacher_actor,
                "evaluationId": classroom.evaluation_id,
                "entries": [{ "studentId": student.id, "value": value }],
            }),
        );
        assert_eq!(code, "validation_failed", "value {:?}", value);
    }

    // Nothing invalid may have reached the store.
    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "evaluations.gradingSheet",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
        }),
    );
    assert_eq!(sheet["students"][0]["currentScore"], serde_json::Value::Null);
    assert_eq!(sheet["pendingCount"], 1);
}

#[test]
fn blank_entries_are_skipped_not_zeroed() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = setup_classroom(&mut stdin, &mut reader, "academy-blank", 2);

    let submit = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scores.submit",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
            "entries": [
                { "studentId": classroom.students[0].id, "value": null },
                { "studentId": classroom.students[1].id, "value": "  " },
            ],
        }),
    );
    assert_eq!(submit["updatedCount"], 0);
    assert_eq!(submit["skippedCount"], 2);
    assert_eq!(submit["pendingCount"], 2);
}

#[test]
fn students_outside_the_grade_level_are_not_eligible() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = setup_classroom(&mut stdin, &mut reader, "academy-eligibility", 1);

    let outsider = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.users.create",
        json!({
            "actor": classroom.admin_actor,
            "role": "student",
            "username": "transfer",
            "firstName": "Tomas",
            "lastName": "Quintero",
            "documentNo": "S-900",
            "email": "transfer@example.edu",
            "password": "passw0rd",
            "gradeLevel": 4,
        }),
    );
    let outsider_id = outsider["actor"]["id"].as_str().expect("id");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "scores.submit",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
            "entries": [{ "studentId": outsider_id, "value": 12.0 }],
        }),
    );
    assert_eq!(code, "validation_failed");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "scores.submit",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
            "entries": [{ "studentId": "no-such-student", "value": 12.0 }],
        }),
    );
    assert_eq!(code, "not_found");

    // The grade-4 student never shows up on the grading sheet either.
    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "evaluations.gradingSheet",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
        }),
    );
    assert_eq!(sheet["students"].as_array().map(|s| s.len()), Some(1));
}
