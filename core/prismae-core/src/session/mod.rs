//! Auth/session reconciliation.
//!
//! Three sources update independently and are merged into one [`SessionState`]:
//!
//! ```text
//! AuthService (remote) ─┐
//! purchase entitlement ─┼─► SessionReconciler ─► SessionState ─► UI observers
//! ProfileRepository ────┘
//! ```
//!
//! Access is decided by the local purchase entitlement alone; see
//! [`SessionReconciler::has_access`].
//!
//! # Module Structure
//!
//! - [`state`]: the published state and auth phase
//! - [`reconciler`]: the operations that mutate it
//!
//! Collaborators are traits so tests and native hosts can inject their own.
//! [`crate::backend::SupabaseBackend`] implements the remote ones and
//! [`crate::local_store`] the local ones.

mod reconciler;
mod state;

pub use reconciler::{LocalStores, SessionEvent, SessionReconciler};
pub use state::{AuthPhase, SessionState};

use crate::error::{AuthError, Result};
use crate::types::{
    AuthSession, AuthUser, OAuthProvider, Profile, ProfilePatch, SubscriptionRecord,
};

/// Response to an email sign-up.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpResponse {
    /// Email confirmation is disabled; the user is signed in.
    Session(AuthSession),
    /// The user must confirm their email before a session exists.
    ConfirmationRequired(AuthUser),
}

/// Remote authentication.
pub trait AuthService: Send + Sync {
    /// Restores the persisted session, if any. `Ok(None)` means signed out.
    fn current_session(&self) -> std::result::Result<Option<AuthSession>, AuthError>;

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<AuthSession, AuthError>;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> std::result::Result<SignUpResponse, AuthError>;

    /// Exchanges a provider ID token (Sign in with Apple, Google) for a session.
    fn sign_in_with_id_token(
        &self,
        provider: OAuthProvider,
        id_token: &str,
        nonce: Option<&str>,
    ) -> std::result::Result<AuthSession, AuthError>;

    fn sign_out(&self) -> std::result::Result<(), AuthError>;

    fn resend_confirmation(&self, email: &str) -> std::result::Result<(), AuthError>;

    /// The current user JWT, for per-user rate limiting on other services.
    fn access_token(&self) -> Option<String> {
        None
    }

    /// Refreshes the session after another service rejected its token.
    /// Returns the new access token.
    fn refresh_access_token(&self) -> Option<String> {
        None
    }

    /// Drops any persisted session without contacting the server.
    fn clear_local_session(&self) -> std::result::Result<(), AuthError> {
        Ok(())
    }
}

/// Row access for `profiles` and `subscription_status`.
pub trait ProfileRepository: Send + Sync {
    fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Inserts a profile row if none exists. Never overwrites.
    fn ensure_profile(&self, user: &AuthUser, full_name: Option<&str>) -> Result<()>;

    /// Inserts a `free` subscription row if none exists. Never overwrites.
    fn ensure_subscription_row(&self, user_id: &str) -> Result<()>;

    fn fetch_subscription_record(&self, user_id: &str) -> Result<Option<SubscriptionRecord>>;

    /// Upserts the subscription row. The client writes it but never reads it
    /// back for access decisions.
    fn record_subscription(&self, user_id: &str, record: &SubscriptionRecord) -> Result<()>;

    fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<()>;
}

/// Destructive account operations.
pub trait AccountService: Send + Sync {
    fn delete_account(&self, user_id: &str) -> Result<()>;
}

/// A piece of on-device state that must be wiped when the account goes away.
pub trait LocalCleanup: Send + Sync {
    /// Short name used in logs.
    fn label(&self) -> &'static str;

    fn clear(&self) -> Result<()>;
}

/// Events from the remote auth stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    InitialSession(Option<AuthUser>),
    SignedIn(AuthUser),
    SignedOut,
    TokenRefreshed(AuthUser),
    UserUpdated(AuthUser),
}
