//! Request/response bodies for the `/auth` endpoints.

use serde::{Deserialize, Serialize};

use super::{Role, UserProfile};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "usuario")]
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    #[serde(rename = "nombre")]
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    #[serde(rename = "mensaje", default)]
    pub message: String,
    #[serde(rename = "usuario")]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `/auth/refresh` response. Rotation is optional: the server may send a new refresh token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleChangeRequest {
    #[serde(rename = "rol")]
    pub role: Role,
}

/// Identity provider sign-in URL returned by `GET /auth/google`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUrl {
    pub url: String,
}

/// Plain acknowledgement (`{"mensaje": "..."}`) returned by mutating endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(rename = "mensaje", default)]
    pub message: String,
}
