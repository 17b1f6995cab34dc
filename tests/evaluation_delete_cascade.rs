mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, setup_classroom, spawn_sidecar};

#[test]
fn deleting_an_evaluation_removes_its_scores() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = setup_classroom(&mut stdin, &mut reader, "academy-cascade", 1);
    let student = &classroom.students[0];

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "scores.submit",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
            "entries": [{ "studentId": student.id, "value": 17.0 }],
        }),
    );
    let card = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.reportCard",
        json!({ "actor": classroom.teacher_actor, "studentId": student.id }),
    );
    assert_eq!(card["reportCard"]["rows"].as_array().map(|r| r.len()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "evaluations.delete",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
        }),
    );

    // The score went with the evaluation; the report card is empty again.
    let card = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.reportCard",
        json!({ "actor": classroom.teacher_actor, "studentId": student.id }),
    );
    assert_eq!(card["reportCard"]["rows"].as_array().map(|r| r.len()), Some(0));
    assert_eq!(card["reportCard"]["overallAverage"], 0.0);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "evaluations.gradingSheet",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
        }),
    );
    assert_eq!(code, "not_found");

    let work = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "evaluations.pending",
        json!({ "actor": classroom.teacher_actor }),
    );
    assert_eq!(work["pending"].as_array().map(|p| p.len()), Some(0));
}

#[test]
fn teachers_cannot_touch_each_others_evaluations() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = setup_classroom(&mut stdin, &mut reader, "academy-ownership", 1);

    let rival = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.users.create",
        json!({
            "actor": classroom.admin_actor,
            "role": "teacher",
            "username": "rival",
            "firstName": "Rita",
            "lastName": "Valdez",
            "documentNo": "T-200",
            "email": "rival@teacher.edu",
            "password": "passw0rd",
        }),
    );
    let rival_actor = rival["actor"].clone();

    // Reads as missing rather than forbidden: foreign evaluations are
    // simply not visible through another teacher's courses.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "evaluations.delete",
        json!({ "actor": rival_actor, "evaluationId": classroom.evaluation_id }),
    );
    assert_eq!(code, "not_found");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "scores.submit",
        json!({
            "actor": rival_actor,
            "evaluationId": classroom.evaluation_id,
            "entries": [{ "studentId": classroom.students[0].id, "value": 20.0 }],
        }),
    );
    assert_eq!(code, "not_found");
}
