use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the authenticated user. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        &self.username
    }

    pub fn is_admin(&self) -> bool {
        self.is_superuser
    }
}

/// Username and password submitted to the login endpoint.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub(crate) fn form(&self) -> Vec<(String, String)> {
        vec![
            ("username".to_string(), self.username.clone()),
            ("password".to_string(), self.password.clone()),
        ]
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: UserProfile,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Clone, Serialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}
