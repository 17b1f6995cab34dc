use crate::calc;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    actor_display_name, calc_err, db_conn, required_datetime, required_str, staff_actor,
    student_actor, teacher_actor,
};
use crate::ipc::types::{AppState, Request};
use crate::session::Actor;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn log_view(conn: &Connection, actor: &Actor, description: &str) {
    let Some(id) = actor.id() else {
        return;
    };
    let name = actor_display_name(conn, actor);
    db::log_activity(conn, actor.role_str(), id, &name, "VIEW", description);
}

fn handle_subject_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match student_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match calc::build_subject_summary(conn, &student_id) {
        Ok(summary) => {
            log_view(
                conn,
                &Actor::Student(student_id),
                &format!("viewed subject summary, grade {}", summary.student.grade_level),
            );
            ok(&req.id, json!({ "summary": summary }))
        }
        Err(e) => calc_err(req, e),
    }
}

fn handle_subject_detail(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match student_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student = match calc::student_ref(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    // Only courses of the student's own grade-level resolve.
    let course_name: Option<String> = match conn
        .query_row(
            "SELECT name FROM courses WHERE id = ? AND grade_level = ?",
            (&course_id, student.grade_level),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(course_name) = course_name else {
        return err(&req.id, "not_found", "course not found", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT e.id, e.subject, e.kind, e.date, sc.value
         FROM scores sc
         JOIN evaluations e ON e.id = sc.evaluation_id
         WHERE sc.student_id = ? AND e.course_id = ?
         ORDER BY e.date",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let entries = stmt
        .query_map((&student_id, &course_id), |r| {
            Ok(json!({
                "evaluationId": r.get::<_, String>(0)?,
                "subject": r.get::<_, String>(1)?,
                "kind": r.get::<_, String>(2)?,
                "date": r.get::<_, String>(3)?,
                "value": r.get::<_, f64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let entries = match entries {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let average = match calc::average_for_student_in_course(conn, &student_id, &course_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    log_view(
        conn,
        &Actor::Student(student_id),
        &format!("viewed scores for course: {}", course_name),
    );
    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "courseName": course_name,
            "entries": entries,
            "average": average.map(calc::round_to_2),
            "hasScores": average.is_some(),
        }),
    )
}

fn handle_report_card(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let actor = match staff_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match calc::build_report_card(conn, &student_id) {
        Ok(card) => {
            log_view(
                conn,
                &actor,
                &format!("generated report card for {}", card.student.display_name),
            );
            ok(&req.id, json!({ "reportCard": card }))
        }
        Err(e) => calc_err(req, e),
    }
}

fn handle_classroom_ranking(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match student_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student = match calc::student_ref(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    let ranking = match calc::grade_ranking(conn, student.grade_level) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    log_view(
        conn,
        &Actor::Student(student_id),
        &format!("viewed ranking for grade {}", student.grade_level),
    );
    ok(
        &req.id,
        json!({ "gradeLevel": student.grade_level, "students": ranking }),
    )
}

fn handle_course_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match teacher_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match required_datetime(req, "now") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, grade_level FROM courses WHERE teacher_id = ?
         ORDER BY grade_level, name",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let courses: Vec<(String, String, i64)> = match stmt
        .query_map([&teacher_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut out = Vec::with_capacity(courses.len());
    for (course_id, name, grade_level) in courses {
        let students_count: i64 = match conn.query_row(
            "SELECT COUNT(*) FROM students WHERE grade_level = ?",
            [grade_level],
            |r| r.get(0),
        ) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let evaluations_count: i64 = match conn.query_row(
            "SELECT COUNT(*) FROM evaluations WHERE course_id = ?",
            [&course_id],
            |r| r.get(0),
        ) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let average = match calc::average_for_course(conn, &course_id) {
            Ok(v) => v,
            Err(e) => return calc_err(req, e),
        };
        let next_evaluation: Option<(String, String, String)> = match conn
            .query_row(
                "SELECT id, subject, date FROM evaluations
                 WHERE course_id = ? AND date > ?
                 ORDER BY date LIMIT 1",
                (&course_id, &now),
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };

        out.push(json!({
            "courseId": course_id,
            "courseName": name,
            "gradeLevel": grade_level,
            "studentsCount": students_count,
            "evaluationsCount": evaluations_count,
            "averageScore": calc::round_to_2(average),
            "nextEvaluation": next_evaluation.map(|(id, subject, date)| json!({
                "id": id,
                "subject": subject,
                "date": date,
            })),
        }));
    }

    ok(&req.id, json!({ "courses": out }))
}

fn student_dashboard(
    conn: &Connection,
    req: &Request,
    student_id: String,
    now: &str,
) -> serde_json::Value {
    let student = match calc::student_ref(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    let mut stmt = match conn.prepare(
        "SELECT sc.value, e.id, e.subject, e.kind, e.date, c.name
         FROM scores sc
         JOIN evaluations e ON e.id = sc.evaluation_id
         JOIN courses c ON c.id = e.course_id
         WHERE sc.student_id = ?
         ORDER BY e.date DESC",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let scored = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "value": r.get::<_, f64>(0)?,
                "evaluationId": r.get::<_, String>(1)?,
                "subject": r.get::<_, String>(2)?,
                "kind": r.get::<_, String>(3)?,
                "date": r.get::<_, String>(4)?,
                "courseName": r.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let scored = match scored {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let approved: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM scores WHERE student_id = ? AND value >= ?",
        (&student_id, calc::PASS_MARK),
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let courses_count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM courses WHERE grade_level = ?",
        [student.grade_level],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let overall = match calc::average_for_student_overall(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    let mut stmt = match conn.prepare(
        "SELECT e.id, e.subject, e.kind, e.date, c.name
         FROM evaluations e
         JOIN courses c ON c.id = e.course_id
         WHERE c.grade_level = ? AND e.date > ?
         ORDER BY e.date LIMIT 5",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let upcoming = stmt
        .query_map((student.grade_level, now), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "subject": r.get::<_, String>(1)?,
                "kind": r.get::<_, String>(2)?,
                "date": r.get::<_, String>(3)?,
                "courseName": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let upcoming = match upcoming {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "role": "student",
            "student": student,
            "scoredEvaluations": scored,
            "approvedCount": approved,
            "coursesCount": courses_count,
            "overallAverage": calc::round_to_2(overall),
            "upcomingEvaluations": upcoming,
        }),
    )
}

fn teacher_dashboard(
    conn: &Connection,
    req: &Request,
    teacher_id: String,
    now: &str,
) -> serde_json::Value {
    let known: Option<i64> = match conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [&teacher_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if known.is_none() {
        return err(&req.id, "not_found", "teacher not found", None);
    }

    let courses_count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM courses WHERE teacher_id = ?",
        [&teacher_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let evaluations_count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM evaluations e JOIN courses c ON c.id = e.course_id
         WHERE c.teacher_id = ?",
        [&teacher_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // Students counted once even when the teacher covers several
    // courses of the same grade.
    let total_students: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM students WHERE grade_level IN
           (SELECT DISTINCT grade_level FROM courses WHERE teacher_id = ?)",
        [&teacher_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT e.id, e.subject, e.kind, e.date, c.name
         FROM evaluations e
         JOIN courses c ON c.id = e.course_id
         WHERE c.teacher_id = ? AND e.date > ?
         ORDER BY e.date LIMIT 5",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let upcoming = stmt
        .query_map((&teacher_id, now), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "subject": r.get::<_, String>(1)?,
                "kind": r.get::<_, String>(2)?,
                "date": r.get::<_, String>(3)?,
                "courseName": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let upcoming = match upcoming {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "role": "teacher",
            "coursesCount": courses_count,
            "evaluationsCount": evaluations_count,
            "totalStudents": total_students,
            "upcomingEvaluations": upcoming,
        }),
    )
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match required_datetime(req, "now") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match crate::ipc::helpers::actor(req) {
        Actor::Student(id) => student_dashboard(conn, req, id, &now),
        Actor::Teacher(id) => teacher_dashboard(conn, req, id, &now),
        other => err(
            &req.id,
            "not_authorized",
            "student or teacher account required",
            Some(json!({ "role": other.role_str() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.subjectSummary" => Some(handle_subject_summary(state, req)),
        "reports.subjectDetail" => Some(handle_subject_detail(state, req)),
        "reports.reportCard" => Some(handle_report_card(state, req)),
        "reports.classroomRanking" => Some(handle_classroom_ranking(state, req)),
        "reports.courseOverview" => Some(handle_course_overview(state, req)),
        "dashboard.open" => Some(handle_dashboard(state, req)),
        _ => None,
    }
}
