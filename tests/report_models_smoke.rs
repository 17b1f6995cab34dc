mod test_support;

use serde_json::json;
use test_support::{request_ok, setup_classroom, spawn_sidecar};

// Grade 3 carries Mathematics and Science; the student is scored 12 and
// 16 in Mathematics and nothing in Science. The subject summary keeps
// the empty course, the report card drops it.
#[test]
fn subject_summary_and_report_card_shapes() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = setup_classroom(&mut stdin, &mut reader, "academy-report-models", 2);
    let student = &classroom.students[0];
    let other = &classroom.students[1];

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.courses.create",
        json!({
            "actor": classroom.admin_actor,
            "name": "Science",
            "gradeLevel": 3,
            "teacherId": classroom.teacher_id,
        }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "evaluations.create",
        json!({
            "actor": classroom.teacher_actor,
            "courseId": classroom.course_id,
            "subject": "Geometry",
            "kind": "quiz",
            "date": "2026-03-20T09:00:00",
        }),
    );
    let second_eval = second["evaluation"]["id"].as_str().expect("eval id");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "scores.submit",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
            "entries": [
                { "studentId": student.id, "value": 12.0 },
                { "studentId": other.id, "value": 8.0 },
            ],
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scores.submit",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": second_eval,
            "entries": [{ "studentId": student.id, "value": 16.0 }],
        }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.subjectSummary",
        json!({ "actor": student.actor }),
    );
    let subjects = summary["summary"]["subjects"]
        .as_array()
        .expect("subjects");
    assert_eq!(subjects.len(), 2);

    // Course-name order: Mathematics, then Science.
    let math = &subjects[0];
    assert_eq!(math["courseName"], "Mathematics");
    assert_eq!(math["evaluationsCount"], 2);
    assert_eq!(math["average"], 14.0);
    assert_eq!(math["hasScores"], true);

    let science = &subjects[1];
    assert_eq!(science["courseName"], "Science");
    assert_eq!(science["evaluationsCount"], 0);
    assert_eq!(science["hasScores"], false);
    assert!(
        science.get("average").is_none(),
        "empty course must carry no average, got {}",
        science
    );

    let card = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.reportCard",
        json!({ "actor": classroom.teacher_actor, "studentId": student.id }),
    );
    let rows = card["reportCard"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1, "Science has no scores and must be excluded");
    assert_eq!(rows[0]["courseName"], "Mathematics");
    assert_eq!(rows[0]["average"], 14.0);
    assert_eq!(rows[0]["standing"], "pass");
    assert_eq!(rows[0]["band"], "Good");
    assert_eq!(card["reportCard"]["overallAverage"], 14.0);

    // The weaker student fails the same course.
    let other_card = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "reports.reportCard",
        json!({ "actor": classroom.admin_actor, "studentId": other.id }),
    );
    let other_rows = other_card["reportCard"]["rows"].as_array().expect("rows");
    assert_eq!(other_rows[0]["standing"], "fail");
    assert_eq!(other_rows[0]["band"], "Deficient");
    assert_eq!(other_card["reportCard"]["overallAverage"], 8.0);

    let ranking = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "reports.classroomRanking",
        json!({ "actor": student.actor }),
    );
    let ranked = ranking["students"].as_array().expect("ranking rows");
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0]["studentId"].as_str(), Some(student.id.as_str()));
    assert_eq!(ranked[0]["average"], 14.0);
    assert_eq!(ranked[1]["studentId"].as_str(), Some(other.id.as_str()));
}

#[test]
fn unscored_student_has_empty_report_card() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = setup_classroom(&mut stdin, &mut reader, "academy-empty-card", 1);
    let student = &classroom.students[0];

    let card = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.reportCard",
        json!({ "actor": classroom.teacher_actor, "studentId": student.id }),
    );
    assert_eq!(
        card["reportCard"]["rows"].as_array().map(|r| r.len()),
        Some(0)
    );
    assert_eq!(card["reportCard"]["overallAverage"], 0.0);

    // The subject summary still lists the course, flagged as unscored.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.subjectSummary",
        json!({ "actor": student.actor }),
    );
    let subjects = summary["summary"]["subjects"].as_array().expect("subjects");
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0]["hasScores"], false);
}
