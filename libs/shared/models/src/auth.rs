use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Clinic role carried by an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Pharmacist,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Pharmacist => "pharmacist",
            Role::Patient => "patient",
        }
    }
}

impl User {
    pub fn role(&self) -> Option<Role> {
        match self.role.as_deref()? {
            "admin" => Some(Role::Admin),
            "doctor" => Some(Role::Doctor),
            "pharmacist" => Some(Role::Pharmacist),
            "patient" => Some(Role::Patient),
            _ => None,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }

    /// True when the user is the given person.
    pub fn is(&self, id: Uuid) -> bool {
        self.user_id() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            email: None,
            role: Some(role.to_string()),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn parses_known_roles() {
        assert_eq!(user("doctor").role(), Some(Role::Doctor));
        assert_eq!(user("pharmacist").role(), Some(Role::Pharmacist));
        assert!(user("admin").is_admin());
        assert_eq!(user("authenticated").role(), None);
    }

    #[test]
    fn identity_check_requires_uuid() {
        let mut u = user("patient");
        let id = u.user_id().unwrap();
        assert!(u.is(id));

        u.id = "not-a-uuid".into();
        assert!(!u.is(id));
    }
}
