use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    actor_display_name, admin_actor, db_conn, optional_str, required_i64, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{self, Actor};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

const DEFAULT_GRADE_LEVELS: [(&str, i64, &str); 6] = [
    ("First Grade", 1, "First year of primary school"),
    ("Second Grade", 2, "Second year of primary school"),
    ("Third Grade", 3, "Third year of primary school"),
    ("Fourth Grade", 4, "Fourth year of primary school"),
    ("Fifth Grade", 5, "Fifth year of primary school"),
    ("Sixth Grade", 6, "Sixth year of primary school"),
];

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn log_admin(conn: &Connection, admin_id: &str, action: &str, description: &str) {
    let name = actor_display_name(conn, &Actor::Admin(admin_id.to_string()));
    db::log_activity(conn, "admin", admin_id, &name, action, description);
}

/// Bootstrap: create the stock grade levels and the default
/// administrator account. Idempotent, so deliberately not role-gated --
/// it is what creates the first admin.
fn handle_seed_defaults(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut created_levels = 0;
    for (name, level, description) in DEFAULT_GRADE_LEVELS {
        let exists: Option<i64> = match conn
            .query_row(
                "SELECT 1 FROM grade_levels WHERE level = ?",
                [level],
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if exists.is_some() {
            continue;
        }
        if let Err(e) = conn.execute(
            "INSERT INTO grade_levels(id, name, level, description) VALUES(?, ?, ?, ?)",
            (Uuid::new_v4().to_string(), name, level, description),
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        created_levels += 1;
    }

    let admin_exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM admins WHERE username = 'admin'",
            [],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut created_admin = false;
    if admin_exists.is_none() {
        let password_hash = match session::hash_password("admin123") {
            Ok(v) => v,
            Err(e) => return err(&req.id, "hash_failed", e.to_string(), None),
        };
        if let Err(e) = conn.execute(
            "INSERT INTO admins(id, username, first_name, last_name, position, staff_no, email, password_hash)
             VALUES(?, 'admin', 'System', 'Administrator', 'General Administrator', 'ADM-001', 'admin@academy.edu', ?)",
            (Uuid::new_v4().to_string(), &password_hash),
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
        created_admin = true;
    }

    ok(
        &req.id,
        json!({
            "createdGradeLevels": created_levels,
            "createdAdmin": created_admin,
        }),
    )
}

fn handle_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = admin_actor(req) {
        return e;
    }

    let count = |table: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
    };
    let totals = (|| -> Result<(i64, i64, i64, i64), rusqlite::Error> {
        Ok((
            count("students")?,
            count("teachers")?,
            count("courses")?,
            count("grade_levels")?,
        ))
    })();
    let (students, teachers, courses, grade_levels) = match totals {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let recent = |sql: &str| -> Result<Vec<serde_json::Value>, rusqlite::Error> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |r| {
                let id: String = r.get(0)?;
                let first: String = r.get(1)?;
                let last: String = r.get(2)?;
                Ok(json!({ "id": id, "displayName": format!("{}, {}", last, first) }))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    };
    let recent_students = match recent(
        "SELECT id, first_name, last_name FROM students ORDER BY rowid DESC LIMIT 5",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let recent_teachers = match recent(
        "SELECT id, first_name, last_name FROM teachers ORDER BY rowid DESC LIMIT 5",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "totalStudents": students,
            "totalTeachers": teachers,
            "totalCourses": courses,
            "totalGradeLevels": grade_levels,
            "recentStudents": recent_students,
            "recentTeachers": recent_teachers,
        }),
    )
}

fn handle_grade_levels_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = admin_actor(req) {
        return e;
    }

    let mut stmt = match conn
        .prepare("SELECT id, name, level, description FROM grade_levels ORDER BY level")
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "level": r.get::<_, i64>(2)?,
                "description": r.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(levels) => ok(&req.id, json!({ "gradeLevels": levels })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_grade_levels_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let admin_id = match admin_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = match required_i64(req, "level") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let description = optional_str(req, "description");

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO grade_levels(id, name, level, description) VALUES(?, ?, ?, ?)",
        (&id, &name, level, &description),
    ) {
        if is_unique_violation(&e) {
            return err(
                &req.id,
                "conflict",
                "a grade level with that name or level already exists",
                Some(json!({ "name": name, "level": level })),
            );
        }
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    log_admin(conn, &admin_id, "CREATE", &format!("created grade level: {}", name));
    ok(&req.id, json!({ "gradeLevelId": id }))
}

fn handle_grade_levels_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let admin_id = match admin_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade_level_id = match required_str(req, "gradeLevelId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute("DELETE FROM grade_levels WHERE id = ?", [&grade_level_id]) {
        Ok(0) => err(&req.id, "not_found", "grade level not found", None),
        Ok(_) => {
            log_admin(conn, &admin_id, "DELETE", "deleted a grade level");
            ok(&req.id, json!({ "deleted": true }))
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = admin_actor(req) {
        return e;
    }

    let mut stmt = match conn.prepare(
        "SELECT c.id, c.name, c.description, c.grade_level, c.teacher_id,
                t.first_name, t.last_name
         FROM courses c
         LEFT JOIN teachers t ON t.id = c.teacher_id
         ORDER BY c.grade_level, c.name",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            let teacher_first: Option<String> = r.get(5)?;
            let teacher_last: Option<String> = r.get(6)?;
            let teacher_name = match (teacher_last, teacher_first) {
                (Some(last), Some(first)) => Some(format!("{}, {}", last, first)),
                _ => None,
            };
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "description": r.get::<_, Option<String>>(2)?,
                "gradeLevel": r.get::<_, i64>(3)?,
                "teacherId": r.get::<_, Option<String>>(4)?,
                "teacherName": teacher_name,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let admin_id = match admin_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade_level = match required_i64(req, "gradeLevel") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let description = optional_str(req, "description");
    let teacher_id = optional_str(req, "teacherId");

    let level_known: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM grade_levels WHERE level = ?",
            [grade_level],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if level_known.is_none() {
        return err(
            &req.id,
            "not_found",
            "grade level not found",
            Some(json!({ "gradeLevel": grade_level })),
        );
    }

    if let Some(tid) = &teacher_id {
        let known: Option<i64> = match conn
            .query_row("SELECT 1 FROM teachers WHERE id = ?", [tid], |r| r.get(0))
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if known.is_none() {
            return err(&req.id, "not_found", "teacher not found", None);
        }
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, name, description, grade_level, teacher_id)
         VALUES(?, ?, ?, ?, ?)",
        (&id, &name, &description, grade_level, &teacher_id),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    log_admin(conn, &admin_id, "CREATE", &format!("created course: {}", name));
    ok(&req.id, json!({ "courseId": id }))
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let admin_id = match admin_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Evaluations and their scores go with the course.
    match conn.execute("DELETE FROM courses WHERE id = ?", [&course_id]) {
        Ok(0) => err(&req.id, "not_found", "course not found", None),
        Ok(_) => {
            log_admin(conn, &admin_id, "DELETE", "deleted a course");
            ok(&req.id, json!({ "deleted": true }))
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = admin_actor(req) {
        return e;
    }

    let students = {
        let mut stmt = match conn.prepare(
            "SELECT id, username, first_name, last_name, student_no, email, grade_level
             FROM students ORDER BY last_name, first_name",
        ) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        match stmt
            .query_map([], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "username": r.get::<_, String>(1)?,
                    "firstName": r.get::<_, String>(2)?,
                    "lastName": r.get::<_, String>(3)?,
                    "studentNo": r.get::<_, String>(4)?,
                    "email": r.get::<_, String>(5)?,
                    "gradeLevel": r.get::<_, i64>(6)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let teachers = {
        let mut stmt = match conn.prepare(
            "SELECT id, username, first_name, last_name, staff_no, email
             FROM teachers ORDER BY last_name, first_name",
        ) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        match stmt
            .query_map([], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "username": r.get::<_, String>(1)?,
                    "firstName": r.get::<_, String>(2)?,
                    "lastName": r.get::<_, String>(3)?,
                    "staffNo": r.get::<_, String>(4)?,
                    "email": r.get::<_, String>(5)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    ok(&req.id, json!({ "students": students, "teachers": teachers }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let admin_id = match admin_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role = match required_str(req, "role") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !matches!(role.as_str(), "student" | "teacher") {
        return err(
            &req.id,
            "bad_params",
            "role must be one of: student, teacher",
            Some(json!({ "role": role })),
        );
    }
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let document_no = match required_str(req, "documentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if password.len() < MIN_PASSWORD_LEN {
        return err(
            &req.id,
            "validation_failed",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
            None,
        );
    }

    let password_hash = match session::hash_password(&password) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "hash_failed", e.to_string(), None),
    };

    let id = Uuid::new_v4().to_string();
    let inserted = if role == "student" {
        let grade_level = req
            .params
            .get("gradeLevel")
            .and_then(|v| v.as_i64())
            .unwrap_or(1);
        conn.execute(
            "INSERT INTO students(id, username, first_name, last_name, student_no, email, password_hash, grade_level)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &username,
                &first_name,
                &last_name,
                &document_no,
                &email,
                &password_hash,
                grade_level,
            ),
        )
    } else {
        conn.execute(
            "INSERT INTO teachers(id, username, first_name, last_name, staff_no, email, password_hash)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &username,
                &first_name,
                &last_name,
                &document_no,
                &email,
                &password_hash,
            ),
        )
    };
    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return err(
                &req.id,
                "conflict",
                "username, email or document number already in use",
                None,
            );
        }
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    log_admin(
        conn,
        &admin_id,
        "CREATE",
        &format!("created {}: {}, {}", role, last_name, first_name),
    );
    ok(&req.id, json!({ "actor": { "role": role, "id": id } }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let admin_id = match admin_actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role = match required_str(req, "role") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sql = match role.as_str() {
        "student" => "DELETE FROM students WHERE id = ?",
        "teacher" => "DELETE FROM teachers WHERE id = ?",
        _ => {
            return err(
                &req.id,
                "bad_params",
                "role must be one of: student, teacher",
                Some(json!({ "role": role })),
            )
        }
    };
    match conn.execute(sql, [&user_id]) {
        Ok(0) => err(&req.id, "not_found", "user not found", None),
        Ok(_) => {
            log_admin(conn, &admin_id, "DELETE", &format!("deleted a {}", role));
            ok(&req.id, json!({ "deleted": true }))
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.seedDefaults" => Some(handle_seed_defaults(state, req)),
        "setup.stats" => Some(handle_stats(state, req)),
        "setup.gradeLevels.list" => Some(handle_grade_levels_list(state, req)),
        "setup.gradeLevels.create" => Some(handle_grade_levels_create(state, req)),
        "setup.gradeLevels.delete" => Some(handle_grade_levels_delete(state, req)),
        "setup.courses.list" => Some(handle_courses_list(state, req)),
        "setup.courses.create" => Some(handle_courses_create(state, req)),
        "setup.courses.delete" => Some(handle_courses_delete(state, req)),
        "setup.users.list" => Some(handle_users_list(state, req)),
        "setup.users.create" => Some(handle_users_create(state, req)),
        "setup.users.delete" => Some(handle_users_delete(state, req)),
        _ => None,
    }
}
