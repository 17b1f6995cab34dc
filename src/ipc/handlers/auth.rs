use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::session;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

struct AccountRow {
    id: String,
    first_name: String,
    last_name: String,
    password_hash: String,
}

fn login_sql(role: &str) -> Option<&'static str> {
    match role {
        "student" => Some(
            "SELECT id, first_name, last_name, password_hash FROM students WHERE username = ?",
        ),
        "teacher" => Some(
            "SELECT id, first_name, last_name, password_hash FROM teachers WHERE username = ?",
        ),
        "admin" => {
            Some("SELECT id, first_name, last_name, password_hash FROM admins WHERE username = ?")
        }
        _ => None,
    }
}

fn find_by_username(
    conn: &Connection,
    sql: &str,
    username: &str,
) -> Result<Option<AccountRow>, rusqlite::Error> {
    conn.query_row(sql, [username], |r| {
        Ok(AccountRow {
            id: r.get(0)?,
            first_name: r.get(1)?,
            last_name: r.get(2)?,
            password_hash: r.get(3)?,
        })
    })
    .optional()
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role = match required_str(req, "role") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(sql) = login_sql(&role) else {
        return err(
            &req.id,
            "bad_params",
            "role must be one of: student, teacher, admin",
            Some(json!({ "role": role })),
        );
    };
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let row = match find_by_username(conn, sql, &username) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // Same answer for unknown user and wrong password.
    let Some(account) = row else {
        return err(&req.id, "bad_credentials", "invalid username or password", None);
    };
    if !session::verify_password(&password, &account.password_hash) {
        return err(&req.id, "bad_credentials", "invalid username or password", None);
    }

    let display_name = format!("{}, {}", account.last_name, account.first_name);
    db::log_activity(conn, &role, &account.id, &display_name, "LOGIN", "signed in");

    ok(
        &req.id,
        json!({
            "actor": { "role": role, "id": account.id },
            "displayName": display_name,
        }),
    )
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let document_no = match required_str(req, "documentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let confirm = match required_str(req, "confirmPassword") {
        Ok(v) => v,
        Err(e) => return e,
    };

    if password != confirm {
        return err(&req.id, "validation_failed", "passwords do not match", None);
    }
    if password.len() < MIN_PASSWORD_LEN {
        return err(
            &req.id,
            "validation_failed",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
            None,
        );
    }

    // Role is inferred from the email, matching the enrollment policy:
    // faculty addresses register as teachers, everyone else as students.
    let lowered = email.to_ascii_lowercase();
    let is_teacher = lowered.ends_with("@profesor.edu")
        || lowered.ends_with("@teacher.edu")
        || lowered.contains("profesor");

    let password_hash = match session::hash_password(&password) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "hash_failed", e.to_string(), None),
    };

    let id = Uuid::new_v4().to_string();
    let inserted = if is_teacher {
        conn.execute(
            "INSERT INTO teachers(id, username, first_name, last_name, staff_no, email, password_hash)
             VALUES(?, ?, ?, '', ?, ?, ?)",
            (&id, &username, &username, &document_no, &email, &password_hash),
        )
    } else {
        conn.execute(
            "INSERT INTO students(id, username, first_name, last_name, student_no, email, password_hash, grade_level)
             VALUES(?, ?, ?, '', ?, ?, ?, 1)",
            (&id, &username, &username, &document_no, &email, &password_hash),
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

    let role = if is_teacher { "teacher" } else { "student" };
    ok(&req.id, json!({ "actor": { "role": role, "id": id } }))
}

fn handle_reset_password(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let document_no = match required_str(req, "documentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let new_password = match required_str(req, "newPassword") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let confirm = match optional_str(req, "confirmPassword") {
        Some(v) => v,
        None => new_password.clone(),
    };

    if new_password != confirm {
        return err(&req.id, "validation_failed", "passwords do not match", None);
    }
    if new_password.len() < MIN_PASSWORD_LEN {
        return err(
            &req.id,
            "validation_failed",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
            None,
        );
    }

    let password_hash = match session::hash_password(&new_password) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "hash_failed", e.to_string(), None),
    };

    // The username/document pair identifies the account across all
    // three role tables; first match wins, student first.
    let updates = [
        (
            "student",
            "UPDATE students SET password_hash = ?1 WHERE username = ?2 AND student_no = ?3",
        ),
        (
            "teacher",
            "UPDATE teachers SET password_hash = ?1 WHERE username = ?2 AND staff_no = ?3",
        ),
        (
            "admin",
            "UPDATE admins SET password_hash = ?1 WHERE username = ?2 AND staff_no = ?3",
        ),
    ];
    for (role, sql) in updates {
        match conn.execute(sql, (&password_hash, &username, &document_no)) {
            Ok(0) => continue,
            Ok(_) => return ok(&req.id, json!({ "role": role })),
            Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
        }
    }

    err(
        &req.id,
        "not_found",
        "no account matches that username and document number",
        None,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.register" => Some(handle_register(state, req)),
        "auth.resetPassword" => Some(handle_reset_password(state, req)),
        _ => None,
    }
}
