use crate::calc;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::session::{self, Actor};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde_json::json;

pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn calc_err(req: &Request, e: calc::CalcError) -> serde_json::Value {
    err(
        &req.id,
        &e.code,
        e.message,
        e.details.map(|d| json!(d)).or(None),
    )
}

/// Valid `DATE_FORMAT` text, returned as-is: the fixed-width layout makes
/// stored dates compare correctly as strings.
pub fn required_datetime(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let raw = required_str(req, key)?;
    match NaiveDateTime::parse_from_str(&raw, DATE_FORMAT) {
        Ok(_) => Ok(raw),
        Err(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a YYYY-MM-DDTHH:MM:SS datetime", key),
            Some(json!({ key: raw })),
        )),
    }
}

pub fn actor(req: &Request) -> Actor {
    session::actor_from_params(&req.params)
}

fn role_denied(req: &Request, needed: &str, got: &Actor) -> serde_json::Value {
    err(
        &req.id,
        "not_authorized",
        format!("{} account required", needed),
        Some(json!({ "role": got.role_str() })),
    )
}

pub fn student_actor(req: &Request) -> Result<String, serde_json::Value> {
    match actor(req) {
        Actor::Student(id) => Ok(id),
        other => Err(role_denied(req, "student", &other)),
    }
}

pub fn teacher_actor(req: &Request) -> Result<String, serde_json::Value> {
    match actor(req) {
        Actor::Teacher(id) => Ok(id),
        other => Err(role_denied(req, "teacher", &other)),
    }
}

pub fn admin_actor(req: &Request) -> Result<String, serde_json::Value> {
    match actor(req) {
        Actor::Admin(id) => Ok(id),
        other => Err(role_denied(req, "admin", &other)),
    }
}

/// Teacher or admin; report pages are shared between the two roles.
pub fn staff_actor(req: &Request) -> Result<Actor, serde_json::Value> {
    match actor(req) {
        a @ (Actor::Teacher(_) | Actor::Admin(_)) => Ok(a),
        other => Err(role_denied(req, "teacher or admin", &other)),
    }
}

/// Resolve the actor's display name for the activity log; never fails
/// the surrounding request.
pub fn actor_display_name(conn: &Connection, actor: &Actor) -> String {
    let (sql, id) = match actor {
        Actor::Student(id) => (
            "SELECT last_name || ', ' || first_name FROM students WHERE id = ?",
            id,
        ),
        Actor::Teacher(id) => (
            "SELECT last_name || ', ' || first_name FROM teachers WHERE id = ?",
            id,
        ),
        Actor::Admin(id) => (
            "SELECT last_name || ', ' || first_name FROM admins WHERE id = ?",
            id,
        ),
        Actor::Anonymous => return "unknown user".to_string(),
    };
    conn.query_row(sql, [id], |r| r.get::<_, String>(0))
        .unwrap_or_else(|_| "unknown user".to_string())
}
