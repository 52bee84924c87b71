//! Blocking client for the hosted auth, row and function APIs.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, Response};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

use super::map_auth_error;
use super::rows::{ProfileRow, SubscriptionRow};
use crate::config::CoreConfig;
use crate::error::{AuthError, CoreError, Result};
use crate::local_store::{atomic_write_json, read_json_lenient, remove_file_if_exists};
use crate::session::{AccountService, AuthService, ProfileRepository, SignUpResponse};
use crate::storage::StorageConfig;
use crate::types::{
    AuthSession, AuthUser, OAuthProvider, Profile, ProfilePatch, SubscriptionRecord,
};

const APIKEY_HEADER: &str = "apikey";
const PREFER_HEADER: &str = "Prefer";
const PREFER_INSERT_IF_MISSING: &str = "resolution=ignore-duplicates,return=minimal";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=minimal";

const PROFILES_TABLE: &str = "profiles";
const SUBSCRIPTIONS_TABLE: &str = "subscription_status";
const DELETE_ACCOUNT_FUNCTION: &str = "delete-account";

type AuthResult<T> = std::result::Result<T, AuthError>;

/// The hosted backend, holding the current session in memory and on disk.
pub struct SupabaseBackend {
    base_url: Url,
    anon_key: String,
    http: Client,
    session_path: PathBuf,
    session: Mutex<Option<AuthSession>>,
}

impl SupabaseBackend {
    /// Builds a client from `config`, restoring any session persisted under
    /// `storage`.
    pub fn new(config: &CoreConfig, storage: &StorageConfig) -> Result<Self> {
        config.validate()?;

        // `join` replaces the last path segment unless the base ends in '/'.
        let mut raw = config.supabase_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).map_err(|e| CoreError::InvalidInput {
            field: "supabase_url".to_string(),
            reason: e.to_string(),
        })?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::http("build HTTP client", None, e.to_string()))?;

        let session_path = storage.auth_session_file();
        let session = read_json_lenient::<AuthSession>(&session_path);
        if session.is_some() {
            tracing::debug!(path = %session_path.display(), "Found persisted session");
        }

        Ok(Self {
            base_url,
            anon_key: config.supabase_anon_key.trim().to_string(),
            http,
            session_path,
            session: Mutex::new(session),
        })
    }

    fn session(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| CoreError::InvalidInput {
            field: "endpoint".to_string(),
            reason: format!("{}: {}", path, e),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Session persistence
    // ─────────────────────────────────────────────────────────────────────────────

    fn store_session(&self, session: &AuthSession) {
        *self.session() = Some(session.clone());
        if let Err(err) = atomic_write_json(&self.session_path, session) {
            tracing::warn!(error = %err, "Failed to persist session; it will not survive relaunch");
        }
    }

    fn forget_session(&self) -> Result<()> {
        *self.session() = None;
        remove_file_if_exists(&self.session_path)
    }

    fn require_access_token(&self) -> Result<String> {
        self.session()
            .as_ref()
            .map(|session| session.access_token.clone())
            .ok_or(CoreError::Auth(AuthError::SessionMissing))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Auth API
    // ─────────────────────────────────────────────────────────────────────────────

    fn auth_url(&self, path: &str, grant_type: Option<&str>) -> AuthResult<Url> {
        let mut url = self
            .endpoint(&format!("auth/v1/{}", path))
            .map_err(|e| AuthError::Server {
                message: e.to_string(),
            })?;
        if let Some(grant_type) = grant_type {
            url.query_pairs_mut().append_pair("grant_type", grant_type);
        }
        Ok(url)
    }

    fn auth_request(
        &self,
        method: Method,
        url: Url,
        bearer: Option<&str>,
        body: Option<&Value>,
    ) -> AuthResult<Response> {
        let mut request = self
            .http
            .request(method, url)
            .header(APIKEY_HEADER, &self.anon_key);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().map_err(|e| AuthError::Network {
            details: e.to_string(),
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().unwrap_or_default();
        Err(map_auth_error(status.as_u16(), &text))
    }

    fn decode_auth<T: DeserializeOwned>(response: Response) -> AuthResult<T> {
        response.json().map_err(|e| AuthError::Server {
            message: format!("unexpected auth response: {}", e),
        })
    }

    fn token_grant(&self, grant_type: &str, body: Value) -> AuthResult<AuthSession> {
        let url = self.auth_url("token", Some(grant_type))?;
        let response = self.auth_request(Method::POST, url, None, Some(&body))?;
        let session: AuthSession = Self::decode_auth(response)?;
        self.store_session(&session);
        Ok(session)
    }

    fn fetch_user(&self, access_token: &str) -> AuthResult<AuthUser> {
        let url = self.auth_url("user", None)?;
        let response = self.auth_request(Method::GET, url, Some(access_token), None)?;
        Self::decode_auth(response)
    }

    fn refresh(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Row API
    // ─────────────────────────────────────────────────────────────────────────────

    fn table_url(&self, table: &str, filters: &[(&str, String)]) -> Result<Url> {
        let mut url = self.endpoint(&format!("rest/v1/{}", table))?;
        if !filters.is_empty() {
            let mut query = url.query_pairs_mut();
            for (column, value) in filters {
                query.append_pair(column, value);
            }
        }
        Ok(url)
    }

    /// Sends an authenticated row or function request. A 401 triggers one
    /// refresh with the stored refresh token, then one retry.
    fn rest_request(
        &self,
        method: Method,
        url: Url,
        prefer: Option<&str>,
        body: Option<&Value>,
        context: &str,
    ) -> Result<Response> {
        let token = self.require_access_token()?;
        let response = self.send_rest(method.clone(), url.clone(), &token, prefer, body, context)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check_rest(response, context);
        }

        tracing::debug!(context, "Access token rejected; refreshing once");
        match self.refresh_stored_session() {
            Some(token) => {
                let retried = self.send_rest(method, url, &token, prefer, body, context)?;
                Self::check_rest(retried, context)
            }
            None => Self::check_rest(response, context),
        }
    }

    fn send_rest(
        &self,
        method: Method,
        url: Url,
        token: &str,
        prefer: Option<&str>,
        body: Option<&Value>,
        context: &str,
    ) -> Result<Response> {
        let mut request = self
            .http
            .request(method, url)
            .header(APIKEY_HEADER, &self.anon_key)
            .bearer_auth(token);
        if let Some(prefer) = prefer {
            request = request.header(PREFER_HEADER, prefer);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .map_err(|e| CoreError::http(context, None, e.to_string()))
    }

    fn check_rest(response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .unwrap_or_else(|_| "unable to read response body".to_string());
        Err(CoreError::http(context, Some(status.as_u16()), message))
    }

    /// Exchanges the stored refresh token for a new session and returns its
    /// access token. `None` when there is nothing to refresh or the grant fails.
    fn refresh_stored_session(&self) -> Option<String> {
        let refresh_token = self.session().as_ref()?.refresh_token.clone();
        match self.refresh(&refresh_token) {
            Ok(session) => Some(session.access_token),
            Err(err) => {
                tracing::warn!(error = %err, "Session refresh failed");
                None
            }
        }
    }

    fn select_first<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        context: &str,
    ) -> Result<Option<T>> {
        let url = self.table_url(table, filters)?;
        let response = self.rest_request(Method::GET, url, None, None, context)?;
        let rows: Vec<T> = response
            .json()
            .map_err(|e| CoreError::http(context, None, format!("decoding rows: {}", e)))?;
        Ok(rows.into_iter().next())
    }

    fn insert(
        &self,
        table: &str,
        on_conflict: &str,
        prefer: &str,
        row: Value,
        context: &str,
    ) -> Result<()> {
        let url = self.table_url(table, &[("on_conflict", on_conflict.to_string())])?;
        self.rest_request(Method::POST, url, Some(prefer), Some(&row), context)?;
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

impl AuthService for SupabaseBackend {
    fn current_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored) = self.session().clone() else {
            return Ok(None);
        };

        match self.fetch_user(&stored.access_token) {
            Ok(user) => {
                let session = AuthSession { user, ..stored };
                self.store_session(&session);
                Ok(Some(session))
            }
            Err(AuthError::SessionMissing) => {
                tracing::debug!("Stored access token rejected; refreshing once");
                match self.refresh(&stored.refresh_token) {
                    Ok(session) => Ok(Some(session)),
                    Err(AuthError::SessionMissing | AuthError::InvalidCredentials) => {
                        tracing::info!("Stored session expired");
                        if let Err(err) = self.forget_session() {
                            tracing::warn!(error = %err, "Failed to remove expired session");
                        }
                        Ok(None)
                    }
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.token_grant("password", json!({ "email": email, "password": password }))
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> AuthResult<SignUpResponse> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(name) = full_name {
            body["data"] = json!({ "full_name": name });
        }
        let url = self.auth_url("signup", None)?;
        let response = self.auth_request(Method::POST, url, None, Some(&body))?;
        let value: Value = Self::decode_auth(response)?;

        if value.get("access_token").is_some() {
            let session: AuthSession =
                serde_json::from_value(value).map_err(|e| AuthError::Server {
                    message: format!("unexpected sign-up response: {}", e),
                })?;
            self.store_session(&session);
            return Ok(SignUpResponse::Session(session));
        }

        let user_value = value.get("user").cloned().unwrap_or(value);
        let user: AuthUser = serde_json::from_value(user_value).map_err(|e| AuthError::Server {
            message: format!("unexpected sign-up response: {}", e),
        })?;
        // Re-registering a confirmed address returns a placeholder user with
        // no identities instead of an error.
        if user.identities.is_empty() {
            return Err(AuthError::EmailAlreadyRegistered);
        }
        Ok(SignUpResponse::ConfirmationRequired(user))
    }

    fn sign_in_with_id_token(
        &self,
        provider: OAuthProvider,
        id_token: &str,
        nonce: Option<&str>,
    ) -> AuthResult<AuthSession> {
        let mut body = json!({ "provider": provider.as_str(), "id_token": id_token });
        if let Some(nonce) = nonce {
            body["nonce"] = json!(nonce);
        }
        self.token_grant("id_token", body)
    }

    fn sign_out(&self) -> AuthResult<()> {
        let token = self.session().as_ref().map(|s| s.access_token.clone());
        let remote = match token {
            Some(token) => {
                let url = self.auth_url("logout", None)?;
                match self.auth_request(Method::POST, url, Some(&token), None) {
                    Ok(_) | Err(AuthError::SessionMissing) => Ok(()),
                    Err(err) => Err(err),
                }
            }
            None => Ok(()),
        };

        if let Err(err) = self.forget_session() {
            tracing::warn!(error = %err, "Failed to remove persisted session");
        }
        remote
    }

    fn resend_confirmation(&self, email: &str) -> AuthResult<()> {
        let url = self.auth_url("resend", None)?;
        let body = json!({ "type": "signup", "email": email });
        self.auth_request(Method::POST, url, None, Some(&body))?;
        Ok(())
    }

    fn access_token(&self) -> Option<String> {
        self.session().as_ref().map(|s| s.access_token.clone())
    }

    fn refresh_access_token(&self) -> Option<String> {
        self.refresh_stored_session()
    }

    fn clear_local_session(&self) -> AuthResult<()> {
        self.forget_session().map_err(|e| AuthError::Server {
            message: e.to_string(),
        })
    }
}

impl ProfileRepository for SupabaseBackend {
    fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let row: Option<ProfileRow> = self.select_first(
            PROFILES_TABLE,
            &[("id", eq(user_id)), ("select", "*".to_string())],
            "fetch profile",
        )?;
        Ok(row.map(Profile::from))
    }

    fn ensure_profile(&self, user: &AuthUser, full_name: Option<&str>) -> Result<()> {
        let row = json!({
            "id": user.id,
            "email": user.email,
            "full_name": full_name,
            "created_at": Utc::now().to_rfc3339(),
        });
        self.insert(PROFILES_TABLE, "id", PREFER_INSERT_IF_MISSING, row, "ensure profile")
    }

    fn ensure_subscription_row(&self, user_id: &str) -> Result<()> {
        let row = json!({
            "user_id": user_id,
            "subscription_type": "free",
        });
        self.insert(
            SUBSCRIPTIONS_TABLE,
            "user_id",
            PREFER_INSERT_IF_MISSING,
            row,
            "ensure subscription row",
        )
    }

    fn fetch_subscription_record(&self, user_id: &str) -> Result<Option<SubscriptionRecord>> {
        let row: Option<SubscriptionRow> = self.select_first(
            SUBSCRIPTIONS_TABLE,
            &[
                ("user_id", eq(user_id)),
                ("select", "subscription_type,trial_end_date".to_string()),
            ],
            "fetch subscription row",
        )?;
        Ok(row.map(SubscriptionRecord::from))
    }

    fn record_subscription(&self, user_id: &str, record: &SubscriptionRecord) -> Result<()> {
        let row = json!({
            "user_id": user_id,
            "subscription_type": record.subscription_type.as_token(),
            "trial_end_date": record.trial_end_date,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.insert(SUBSCRIPTIONS_TABLE, "user_id", PREFER_UPSERT, row, "record subscription")
    }

    fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<()> {
        let mut row = patch.to_row();
        row.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        let url = self.table_url(PROFILES_TABLE, &[("id", eq(user_id))])?;
        self.rest_request(
            Method::PATCH,
            url,
            Some("return=minimal"),
            Some(&Value::Object(row)),
            "update profile",
        )?;
        Ok(())
    }
}

impl AccountService for SupabaseBackend {
    fn delete_account(&self, user_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("functions/v1/{}", DELETE_ACCOUNT_FUNCTION))?;
        let body = json!({ "user_id": user_id });
        self.rest_request(Method::POST, url, None, Some(&body), "delete account")?;
        tracing::info!(user_id = %user_id, "Remote account deleted");
        Ok(())
    }
}
