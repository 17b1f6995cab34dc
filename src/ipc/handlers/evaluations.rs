use crate::calc;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    actor_display_name, calc_err, db_conn, required_datetime, required_str, teacher_actor,
};
use crate::ipc::types::{AppState, Request};
use crate::session::Actor;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct EvaluationInfo {
    id: String,
    subject: String,
    kind: String,
    date: String,
    course_id: String,
    course_name: String,
    grade_level: i64,
}

/// An evaluation is visible to a teacher only through a course they own;
/// anything else reads as missing, exactly like an unknown id.
fn owned_evaluation(
    conn: &Connection,
    evaluation_id: &str,
    teacher_id: &str,
) -> Result<Option<EvaluationInfo>, rusqlite::Error> {
    conn.query_row(
        "SELECT e.id, e.subject, e.kind, e.date, c.id, c.name, c.grade_level
         FROM evaluations e
         JOIN courses c ON c.id = e.course_id
         WHERE e.id = ? AND c.teacher_id = ?",
        (evaluation_id, teacher_id),
        |r| {
            Ok(EvaluationInfo {
                id: r.get(0)?,
                subject: r.get(1)?,
                kind: r.get(2)?,
                date: r.get(3)?,
                course_id: r.get(4)?,
                course_name: r.get(5)?,
                grade_level: r.get(6)?,
            })
        },
    )
    .optional()
}

fn log_teacher(conn: &Connection, teacher_id: &str, action: &str, description: &str) {
    let name = actor_display_name(conn, &Actor::Teacher(teacher_id.to_string()));
    db::log_activity(conn, "teacher", teacher_id, &name, action, description);
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match teacher_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let kind = match required_str(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match required_datetime(req, "date") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let owned: Option<String> = match conn
        .query_row(
            "SELECT name FROM courses WHERE id = ? AND teacher_id = ?",
            (&course_id, &teacher_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(course_name) = owned else {
        return err(&req.id, "not_found", "course not found", None);
    };

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO evaluations(id, course_id, subject, kind, date) VALUES(?, ?, ?, ?, ?)",
        (&id, &course_id, &subject, &kind, &date),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    log_teacher(
        conn,
        &teacher_id,
        "CREATE",
        &format!("created evaluation {} for {}", subject, course_name),
    );
    ok(
        &req.id,
        json!({
            "evaluation": {
                "id": id,
                "courseId": course_id,
                "courseName": course_name,
                "subject": subject,
                "kind": kind,
                "date": date,
            }
        }),
    )
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match teacher_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let evaluation_id = match required_str(req, "evaluationId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let info = match owned_evaluation(conn, &evaluation_id, &teacher_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(info) = info else {
        return err(&req.id, "not_found", "evaluation not found", None);
    };

    // Scores go with the evaluation.
    if let Err(e) = conn.execute("DELETE FROM evaluations WHERE id = ?", [&evaluation_id]) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    log_teacher(
        conn,
        &teacher_id,
        "DELETE",
        &format!("deleted evaluation {}", info.subject),
    );
    ok(&req.id, json!({ "deleted": true }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match teacher_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn.prepare(
        "SELECT e.id, e.subject, e.kind, e.date, c.id, c.name
         FROM evaluations e
         JOIN courses c ON c.id = e.course_id
         WHERE c.teacher_id = ?
         ORDER BY e.date DESC",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&teacher_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "subject": r.get::<_, String>(1)?,
                "kind": r.get::<_, String>(2)?,
                "date": r.get::<_, String>(3)?,
                "courseId": r.get::<_, String>(4)?,
                "courseName": r.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(evaluations) => ok(&req.id, json!({ "evaluations": evaluations })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_pending(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match teacher_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match calc::pending_evaluations(conn, &teacher_id) {
        Ok(pending) => ok(&req.id, json!({ "pending": pending })),
        Err(e) => calc_err(req, e),
    }
}

fn handle_grading_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match teacher_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let evaluation_id = match required_str(req, "evaluationId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let info = match owned_evaluation(conn, &evaluation_id, &teacher_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(info) = info else {
        return err(&req.id, "not_found", "evaluation not found", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.first_name, s.last_name, sc.value
         FROM students s
         LEFT JOIN scores sc ON sc.student_id = s.id AND sc.evaluation_id = ?
         WHERE s.grade_level = ?
         ORDER BY s.last_name, s.first_name",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = stmt
        .query_map((&evaluation_id, info.grade_level), |r| {
            let first: String = r.get(1)?;
            let last: String = r.get(2)?;
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "displayName": format!("{}, {}", last, first),
                "currentScore": r.get::<_, Option<f64>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let students = match students {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let pending = match calc::pending_count(conn, &evaluation_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };
    let fully_graded = match calc::is_fully_graded(conn, &evaluation_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    ok(
        &req.id,
        json!({
            "evaluation": {
                "id": info.id,
                "subject": info.subject,
                "kind": info.kind,
                "date": info.date,
                "courseId": info.course_id,
                "courseName": info.course_name,
                "gradeLevel": info.grade_level,
            },
            "students": students,
            "pendingCount": pending,
            "fullyGraded": fully_graded,
        }),
    )
}

/// One entry per student; `value` may arrive as a JSON number or a
/// form-style numeric string. Null/blank entries are skipped, anything
/// non-numeric or out of range is rejected before it reaches storage.
fn parse_entry_value(raw: &serde_json::Value) -> Result<Option<f64>, String> {
    if raw.is_null() {
        return Ok(None);
    }
    let value = if let Some(v) = raw.as_f64() {
        v
    } else if let Some(s) = raw.as_str() {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match trimmed.parse::<f64>() {
            Ok(v) => v,
            Err(_) => return Err(format!("not a number: {:?}", trimmed)),
        }
    } else {
        return Err("value must be a number".to_string());
    };
    if !value.is_finite() {
        return Err("value must be finite".to_string());
    }
    if !(0.0..=calc::MAX_SCORE).contains(&value) {
        return Err(format!("value must be between 0 and {}", calc::MAX_SCORE));
    }
    Ok(Some(value))
}

fn handle_scores_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match teacher_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let evaluation_id = match required_str(req, "evaluationId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing entries", None);
    };

    let info = match owned_evaluation(conn, &evaluation_id, &teacher_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(info) = info else {
        return err(&req.id, "not_found", "evaluation not found", None);
    };

    let mut updated = 0;
    let mut skipped = 0;
    for entry in entries {
        let Some(student_id) = entry.get("studentId").and_then(|v| v.as_str()) else {
            return err(&req.id, "bad_params", "entry missing studentId", None);
        };
        let value = match parse_entry_value(entry.get("value").unwrap_or(&serde_json::Value::Null))
        {
            Ok(Some(v)) => v,
            Ok(None) => {
                skipped += 1;
                continue;
            }
            Err(msg) => {
                return err(
                    &req.id,
                    "validation_failed",
                    msg,
                    Some(json!({ "studentId": student_id })),
                );
            }
        };

        let grade_level: Option<i64> = match conn
            .query_row(
                "SELECT grade_level FROM students WHERE id = ?",
                [student_id],
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let Some(grade_level) = grade_level else {
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": student_id })),
            );
        };
        if grade_level != info.grade_level {
            return err(
                &req.id,
                "validation_failed",
                "student is not eligible for this evaluation",
                Some(json!({ "studentId": student_id, "reason": "not_eligible" })),
            );
        }

        // Stored at two decimals; resubmission replaces, never duplicates.
        let stored = calc::round_to_2(value);
        if let Err(e) = conn.execute(
            "INSERT INTO scores(id, evaluation_id, student_id, value)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(evaluation_id, student_id) DO UPDATE SET
               value = excluded.value",
            (
                Uuid::new_v4().to_string(),
                &evaluation_id,
                student_id,
                stored,
            ),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "scores" })),
            );
        }
        updated += 1;
    }

    let pending = match calc::pending_count(conn, &evaluation_id) {
        Ok(v) => v,
        Err(e) => return calc_err(req, e),
    };

    if updated > 0 {
        log_teacher(
            conn,
            &teacher_id,
            "UPDATE",
            &format!("recorded {} scores for evaluation {}", updated, info.subject),
        );
    }
    ok(
        &req.id,
        json!({
            "updatedCount": updated,
            "skippedCount": skipped,
            "pendingCount": pending,
            "fullyGraded": pending == 0,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "evaluations.create" => Some(handle_create(state, req)),
        "evaluations.delete" => Some(handle_delete(state, req)),
        "evaluations.list" => Some(handle_list(state, req)),
        "evaluations.pending" => Some(handle_pending(state, req)),
        "evaluations.gradingSheet" => Some(handle_grading_sheet(state, req)),
        "scores.submit" => Some(handle_scores_submit(state, req)),
        _ => None,
    }
}
