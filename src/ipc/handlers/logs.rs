use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{admin_actor, db_conn, optional_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value};
use serde_json::json;

const LOGS_DEFAULT_LIMIT: i64 = 100;
const LOGS_MAX_LIMIT: i64 = 500;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = admin_actor(req) {
        return e;
    }

    let role_filter = optional_str(req, "role");
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_i64())
        .unwrap_or(LOGS_DEFAULT_LIMIT)
        .clamp(1, LOGS_MAX_LIMIT);

    let mut sql = String::from(
        "SELECT actor_role, actor_id, actor_name, action, description, at
         FROM activity_log",
    );
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(role) = &role_filter {
        sql.push_str(" WHERE actor_role = ?");
        bind_values.push(Value::Text(role.clone()));
    }
    sql.push_str(" ORDER BY at DESC, rowid DESC LIMIT ?");
    bind_values.push(Value::Integer(limit));

    let mut stmt = match conn.prepare(&sql) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(params_from_iter(bind_values), |r| {
            Ok(json!({
                "actorRole": r.get::<_, String>(0)?,
                "actorId": r.get::<_, String>(1)?,
                "actorName": r.get::<_, String>(2)?,
                "action": r.get::<_, String>(3)?,
                "description": r.get::<_, String>(4)?,
                "at": r.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "logs.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
