use bcrypt::{hash, verify, DEFAULT_COST};

/// Caller identity, resolved once per request from `params.actor` and
/// passed down explicitly. Core operations never consult session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Student(String),
    Teacher(String),
    Admin(String),
    Anonymous,
}

impl Actor {
    pub fn role_str(&self) -> &'static str {
        match self {
            Actor::Student(_) => "student",
            Actor::Teacher(_) => "teacher",
            Actor::Admin(_) => "admin",
            Actor::Anonymous => "anonymous",
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Actor::Student(id) | Actor::Teacher(id) | Actor::Admin(id) => Some(id),
            Actor::Anonymous => None,
        }
    }
}

/// Anything missing or malformed resolves to Anonymous; role checks
/// downstream reject it.
pub fn actor_from_params(params: &serde_json::Value) -> Actor {
    let Some(obj) = params.get("actor") else {
        return Actor::Anonymous;
    };
    let role = obj.get("role").and_then(|v| v.as_str());
    let id = obj
        .get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());
    match (role, id) {
        (Some("student"), Some(id)) => Actor::Student(id.to_string()),
        (Some("teacher"), Some(id)) => Actor::Teacher(id.to_string()),
        (Some("admin"), Some(id)) => Actor::Admin(id.to_string()),
        _ => Actor::Anonymous,
    }
}

pub fn hash_password(plain: &str) -> bcrypt::BcryptResult<String> {
    hash(plain, DEFAULT_COST)
}

pub fn verify_password(plain: &str, password_hash: &str) -> bool {
    verify(plain, password_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn actor_resolves_from_role_and_id() {
        let params = json!({ "actor": { "role": "teacher", "id": "t-1" } });
        assert_eq!(actor_from_params(&params), Actor::Teacher("t-1".to_string()));
    }

    #[test]
    fn missing_or_malformed_actor_is_anonymous() {
        assert_eq!(actor_from_params(&json!({})), Actor::Anonymous);
        assert_eq!(
            actor_from_params(&json!({ "actor": { "role": "wizard", "id": "x" } })),
            Actor::Anonymous
        );
        assert_eq!(
            actor_from_params(&json!({ "actor": { "role": "student", "id": "  " } })),
            Actor::Anonymous
        );
    }

    #[test]
    fn password_hash_round_trip() {
        let h = hash_password("hunter2!").expect("hash");
        assert!(verify_password("hunter2!", &h));
        assert!(!verify_password("hunter3!", &h));
    }
}
