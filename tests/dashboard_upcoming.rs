mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, setup_classroom, spawn_sidecar};

// The present moment is always a request parameter, so "upcoming" is
// fully deterministic under test.
#[test]
fn dashboards_filter_upcoming_evaluations_against_injected_now() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let classroom = setup_classroom(&mut stdin, &mut reader, "academy-dashboard", 2);
    let student = &classroom.students[0];

    let mut create = |id: &str, subject: &str, date: &str| -> String {
        let resp = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "evaluations.create",
            json!({
                "actor": classroom.teacher_actor,
                "courseId": classroom.course_id,
                "subject": subject,
                "kind": "exam",
                "date": date,
            }),
        );
        resp["evaluation"]["id"].as_str().expect("id").to_string()
    };
    let past_id = create("1", "Fractions", "2026-02-10T09:00:00");
    let near_id = create("2", "Statistics", "2026-05-18T09:00:00");
    let far_id = create("3", "Probability", "2026-06-01T09:00:00");
    drop(create);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "scores.submit",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": classroom.evaluation_id,
            "entries": [{ "studentId": student.id, "value": 12.0 }],
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "scores.submit",
        json!({
            "actor": classroom.teacher_actor,
            "evaluationId": past_id,
            "entries": [{ "studentId": student.id, "value": 8.0 }],
        }),
    );

    let now = "2026-04-01T00:00:00";
    let dash = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "dashboard.open",
        json!({ "actor": student.actor, "now": now }),
    );
    assert_eq!(dash["role"], "student");
    assert_eq!(dash["approvedCount"], 1);
    assert_eq!(dash["coursesCount"], 1);
    // Both scores sit in the one course: mean(12, 8) = 10.
    assert_eq!(dash["overallAverage"], 10.0);
    let upcoming: Vec<&str> = dash["upcomingEvaluations"]
        .as_array()
        .expect("upcoming")
        .iter()
        .map(|e| e["id"].as_str().expect("id"))
        .collect();
    assert_eq!(upcoming, vec![near_id.as_str(), far_id.as_str()]);
    // Scored history runs newest first.
    let scored = dash["scoredEvaluations"].as_array().expect("scored");
    assert_eq!(scored.len(), 2);
    assert_eq!(scored[0]["value"], 12.0);
    assert_eq!(scored[1]["value"], 8.0);

    let dash = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "dashboard.open",
        json!({ "actor": classroom.teacher_actor, "now": now }),
    );
    assert_eq!(dash["role"], "teacher");
    assert_eq!(dash["coursesCount"], 1);
    assert_eq!(dash["evaluationsCount"], 4);
    assert_eq!(dash["totalStudents"], 2);
    assert_eq!(
        dash["upcomingEvaluations"].as_array().map(|u| u.len()),
        Some(2)
    );

    let overview = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "reports.courseOverview",
        json!({ "actor": classroom.teacher_actor, "now": now }),
    );
    let course = &overview["courses"][0];
    assert_eq!(course["evaluationsCount"], 4);
    assert_eq!(course["studentsCount"], 2);
    assert_eq!(
        course["nextEvaluation"]["id"].as_str(),
        Some(near_id.as_str())
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "dashboard.open",
        json!({ "actor": student.actor, "now": "04/01/2026" }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "10",
        "dashboard.open",
        json!({ "actor": student.actor }),
    );
    assert_eq!(code, "bad_params");
}
