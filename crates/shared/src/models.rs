//! Request and response models for the auth endpoints the client talks to.

use serde::{Deserialize, Serialize};

// --- Identity ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

/// Identity returned by the session probe (`GET /auth/me`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl CurrentUser {
    /// Name to show in logs: full name when set, otherwise the username.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

// --- Auth requests ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Google Identity Services credential exchanged for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleLoginRequest {
    pub credential: String,
}

/// Token pair returned by login/refresh. The server also sets them as
/// cookies, which is what the realtime transport relies on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "bearer".to_string()
}
