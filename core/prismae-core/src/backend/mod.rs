//! Hosted backend access.
//!
//! [`SupabaseBackend`] speaks to the hosted auth service, the row API and the
//! edge functions over blocking HTTP. It implements the session collaborator
//! traits, so the reconciler never sees a URL or status code.
//!
//! # Error Mapping
//!
//! The auth service reports failures with a status code and a JSON body whose
//! shape varies between versions:
//!
//! ```json
//! {"code": 400, "error_code": "invalid_credentials", "msg": "Invalid login credentials"}
//! {"error": "invalid_grant", "error_description": "Email not confirmed"}
//! ```
//!
//! [`map_auth_error`] folds both into the closed [`AuthError`] set.

mod rows;
mod supabase;

pub use supabase::SupabaseBackend;

use serde::Deserialize;

use crate::error::AuthError;

#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a failed auth response to the user-facing error taxonomy.
pub fn map_auth_error(status: u16, body: &str) -> AuthError {
    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_code
        .or(parsed.error)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .unwrap_or_else(|| body.trim().to_string());
    let lower = message.to_ascii_lowercase();

    if code == "email_not_confirmed" || lower.contains("email not confirmed") {
        return AuthError::EmailNotConfirmed;
    }
    if matches!(code.as_str(), "user_already_exists" | "email_exists")
        || lower.contains("already registered")
    {
        return AuthError::EmailAlreadyRegistered;
    }
    if code == "weak_password" || lower.contains("password should") {
        return AuthError::WeakPassword;
    }
    if status == 429 || code.starts_with("over_") {
        return AuthError::RateLimited;
    }
    if matches!(
        code.as_str(),
        "session_not_found" | "refresh_token_not_found" | "refresh_token_already_used"
    ) || lower.contains("refresh token")
    {
        return AuthError::SessionMissing;
    }
    if lower.contains("id token") || lower.contains("id_token") || code == "provider_disabled" {
        return AuthError::InvalidIdToken;
    }
    if matches!(code.as_str(), "invalid_credentials" | "invalid_grant") {
        return AuthError::InvalidCredentials;
    }
    if matches!(status, 401 | 403) {
        return AuthError::SessionMissing;
    }

    tracing::debug!(status, code = %code, "Unmapped auth error");
    AuthError::Server {
        message: if message.is_empty() {
            format!("HTTP {}", status)
        } else {
            message
        },
    }
}
