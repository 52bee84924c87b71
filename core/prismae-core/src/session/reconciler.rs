//! The session reconciler: the only writer of [`SessionState`].
//!
//! Ordering rules:
//! - Direct sign-in sets the user from the sign-in response, never from the
//!   auth event stream, so callers can proceed as soon as the call returns.
//! - OAuth and sign-up with a session run ensure-profile, ensure-subscription,
//!   load user data, then flip `is_authenticated`, so the UI never renders a
//!   half-initialised profile.
//! - Background loads after authentication are best-effort: failures are
//!   logged and never block sign-in.
//!
//! Collaborator calls are made without holding the state lock.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::state::{AuthPhase, SessionState};
use super::{
    AccountService, AuthEvent, AuthService, LocalCleanup, ProfileRepository, SignUpResponse,
};
use crate::detached::spawn_detached;
use crate::error::{AuthError, CoreError, Result};
use crate::signal::Observable;
use crate::types::{
    AuthUser, OAuthProvider, ProfilePatch, SignUpOutcome, SubscriptionRecord, SubscriptionType,
};

const DELETION_FAILED_MESSAGE: &str =
    "We couldn't delete your account. Please try again or contact support.";

/// Input from either asynchronous source, serialised through one listener.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Auth(AuthEvent),
    EntitlementChanged(bool),
}

/// On-device stores wiped on sign-out or account deletion.
pub struct LocalStores {
    pub onboarding: Arc<dyn LocalCleanup>,
    pub records: Arc<dyn LocalCleanup>,
    pub preferences: Arc<dyn LocalCleanup>,
}

pub struct SessionReconciler {
    auth: Arc<dyn AuthService>,
    profiles: Arc<dyn ProfileRepository>,
    accounts: Arc<dyn AccountService>,
    local: LocalStores,
    state: Observable<SessionState>,
}

impl SessionReconciler {
    pub fn new(
        auth: Arc<dyn AuthService>,
        profiles: Arc<dyn ProfileRepository>,
        accounts: Arc<dyn AccountService>,
        local: LocalStores,
    ) -> Self {
        Self {
            auth,
            profiles,
            accounts,
            local,
            state: Observable::new(SessionState::default()),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.get()
    }

    pub fn subscribe(&self) -> Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Access is the local purchase entitlement, nothing else.
    ///
    /// The remote subscription row is not consulted.
    pub fn has_access(&self) -> bool {
        self.state.get().has_access()
    }

    /// Current user JWT, if signed in.
    pub fn access_token(&self) -> Option<String> {
        self.auth.access_token()
    }

    pub fn refresh_access_token(&self) -> Option<String> {
        self.auth.refresh_access_token()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Launch
    // ─────────────────────────────────────────────────────────────────────────────

    /// Restores a persisted session at startup. Never fails; a missing
    /// session is the normal signed-out outcome.
    pub fn check_session_on_launch(&self) {
        match self.auth.current_session() {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Restored session on launch");
                self.finish_sign_in(session.user);
            }
            Ok(None) | Err(AuthError::SessionMissing) => {
                tracing::info!("No session on launch");
            }
            Err(err) => {
                tracing::warn!(error = %err, "Session check on launch failed");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sign-in / Sign-up
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn sign_in(&self, email: &str, password: &str) -> std::result::Result<(), AuthError> {
        self.begin_sign_in();
        match self.auth.sign_in_with_password(email.trim(), password) {
            Ok(session) => {
                self.finish_sign_in(session.user);
                Ok(())
            }
            Err(err) => {
                self.abort_sign_in(&err);
                Err(err)
            }
        }
    }

    pub fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        id_token: &str,
        nonce: Option<&str>,
    ) -> std::result::Result<(), AuthError> {
        self.begin_sign_in();
        let session = match self.auth.sign_in_with_id_token(provider, id_token, nonce) {
            Ok(session) => session,
            Err(err) => {
                self.abort_sign_in(&err);
                return Err(err);
            }
        };

        self.bootstrap_rows(&session.user, None);
        self.finish_sign_in(session.user);
        Ok(())
    }

    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> std::result::Result<SignUpOutcome, AuthError> {
        let email = email.trim();
        self.begin_sign_in();
        match self.auth.sign_up(email, password, full_name) {
            Ok(SignUpResponse::Session(session)) => {
                self.bootstrap_rows(&session.user, full_name);
                self.finish_sign_in(session.user);
                Ok(SignUpOutcome::SignedIn)
            }
            Ok(SignUpResponse::ConfirmationRequired(user)) => {
                let email = user.email.unwrap_or_else(|| email.to_string());
                tracing::info!(user_id = %user.id, "Sign-up awaiting email confirmation");
                self.state.update(|state| {
                    state.auth_phase = AuthPhase::SignedOut;
                    state.pending_email_confirmation = Some(email.clone());
                });
                Ok(SignUpOutcome::ConfirmationRequired { email })
            }
            Err(err) => {
                self.abort_sign_in(&err);
                Err(err)
            }
        }
    }

    /// Re-sends the confirmation email for the pending sign-up.
    pub fn resend_confirmation(&self) -> std::result::Result<(), AuthError> {
        let email = self
            .state
            .get()
            .pending_email_confirmation
            .ok_or(AuthError::SessionMissing)?;
        self.auth.resend_confirmation(&email)
    }

    fn begin_sign_in(&self) {
        self.state.update(|state| {
            if !state.is_authenticated {
                state.auth_phase = AuthPhase::SigningIn;
            }
        });
    }

    fn abort_sign_in(&self, err: &AuthError) {
        tracing::warn!(error = ?err, "Sign-in failed");
        self.state.update(|state| {
            if state.auth_phase == AuthPhase::SigningIn {
                state.auth_phase = AuthPhase::SignedOut;
            }
        });
    }

    /// Ensures the rows every account needs exist. Failures are logged; the
    /// rows are recreated on the next sign-in.
    fn bootstrap_rows(&self, user: &AuthUser, full_name: Option<&str>) {
        if let Err(err) = self.profiles.ensure_profile(user, full_name) {
            tracing::warn!(user_id = %user.id, error = %err, "Failed to ensure profile row");
        }
        if let Err(err) = self.profiles.ensure_subscription_row(&user.id) {
            tracing::warn!(user_id = %user.id, error = %err, "Failed to ensure subscription row");
        }
    }

    /// Sets the user, loads their data, then marks the session authenticated.
    fn finish_sign_in(&self, user: AuthUser) {
        let user_id = user.id.clone();
        self.state.update(|state| {
            if state.user_id() != Some(user_id.as_str()) {
                state.profile = None;
                state.subscription_record = None;
                state.is_authenticated = false;
                state.auth_phase = AuthPhase::SigningIn;
            }
            state.current_user = Some(user);
            state.pending_email_confirmation = None;
        });

        self.load_user_data(&user_id);

        self.state.update(|state| {
            if state.user_id() == Some(user_id.as_str()) {
                state.is_authenticated = true;
                state.auth_phase = AuthPhase::Authenticated;
            }
        });
        tracing::info!(user_id = %user_id, "Signed in");
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // User data
    // ─────────────────────────────────────────────────────────────────────────────

    /// Reloads profile and subscription row for the current user.
    pub fn reload_user_data(&self) {
        if let Some(user_id) = self.state.get().user_id().map(str::to_string) {
            self.load_user_data(&user_id);
        }
    }

    fn load_user_data(&self, user_id: &str) {
        match self.profiles.fetch_profile(user_id) {
            Ok(profile) => self.state.update(|state| {
                if state.user_id() == Some(user_id) {
                    state.profile = profile;
                }
            }),
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "Failed to load profile");
            }
        }

        match self.profiles.fetch_subscription_record(user_id) {
            Ok(record) => self.state.update(|state| {
                if state.user_id() == Some(user_id) {
                    state.subscription_record = record;
                }
            }),
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "Failed to load subscription row");
            }
        }
    }

    /// Writes only the set fields, then re-fetches the whole profile.
    pub fn update_profile(&self, patch: &ProfilePatch) -> Result<()> {
        let user_id = self.require_user()?;
        if patch.is_empty() {
            tracing::debug!("Empty profile patch; nothing to write");
            return Ok(());
        }

        self.profiles.update_profile(&user_id, patch)?;
        let profile = self.profiles.fetch_profile(&user_id)?;
        self.state.update(|state| {
            if state.user_id() == Some(user_id.as_str()) {
                state.profile = profile;
            }
        });
        Ok(())
    }

    fn require_user(&self) -> Result<String> {
        self.state
            .get()
            .user_id()
            .map(str::to_string)
            .ok_or(CoreError::NotAuthenticated)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Entitlement
    // ─────────────────────────────────────────────────────────────────────────────

    /// Applies the local purchase-verification result.
    ///
    /// When it changes for a signed-in user, the remote subscription row is
    /// updated in the background. The row is never read back.
    pub fn set_entitlement(&self, entitled: bool) {
        let sync_for = self.state.update(|state| {
            let changed = state.subscription_entitlement != entitled;
            state.subscription_entitlement = entitled;
            if changed {
                state.user_id().map(str::to_string)
            } else {
                None
            }
        });

        if let Some(user_id) = sync_for {
            let record = SubscriptionRecord {
                subscription_type: if entitled {
                    SubscriptionType::Premium
                } else {
                    SubscriptionType::Free
                },
                trial_end_date: None,
            };
            let profiles = Arc::clone(&self.profiles);
            spawn_detached("subscription-sync", move || {
                profiles.record_subscription(&user_id, &record)
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Auth event stream
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn handle_auth_event(&self, event: AuthEvent) {
        let current = self.state.get();
        match event {
            AuthEvent::InitialSession(Some(user)) | AuthEvent::SignedIn(user) => {
                if current.is_authenticated && current.user_id() == Some(user.id.as_str()) {
                    self.replace_user(user);
                } else if current.auth_phase == AuthPhase::SigningIn {
                    // The direct sign-in call owns this transition.
                    tracing::debug!(
                        user_id = %user.id,
                        "Ignoring stream sign-in during active sign-in"
                    );
                } else {
                    self.finish_sign_in(user);
                }
            }
            AuthEvent::InitialSession(None) => {
                tracing::debug!("Auth stream reported no initial session");
            }
            AuthEvent::SignedOut => {
                if current.current_user.is_some() && current.auth_phase != AuthPhase::SigningIn {
                    tracing::info!("Auth stream signed out; clearing local session");
                    if let Err(err) = self.auth.clear_local_session() {
                        tracing::warn!(error = %err, "Failed to drop persisted session");
                    }
                    self.reset_local_session();
                }
            }
            AuthEvent::TokenRefreshed(user) | AuthEvent::UserUpdated(user) => {
                if current.user_id() == Some(user.id.as_str()) {
                    self.replace_user(user);
                }
            }
        }
    }

    fn replace_user(&self, user: AuthUser) {
        self.state.update(|state| {
            if state.user_id() == Some(user.id.as_str()) {
                state.current_user = Some(user);
            }
        });
    }

    /// Drains `events` on a dedicated thread until the sender side is dropped.
    pub fn spawn_event_listener(
        self: &Arc<Self>,
        events: Receiver<SessionEvent>,
    ) -> Result<JoinHandle<()>> {
        let reconciler = Arc::clone(self);
        thread::Builder::new()
            .name("prismae-session-events".to_string())
            .spawn(move || {
                for event in events {
                    match event {
                        SessionEvent::Auth(event) => reconciler.handle_auth_event(event),
                        SessionEvent::EntitlementChanged(entitled) => {
                            reconciler.set_entitlement(entitled)
                        }
                    }
                }
                tracing::debug!("Session event stream closed");
            })
            .map_err(|e| CoreError::io("spawn session listener", e))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sign-out / Deletion
    // ─────────────────────────────────────────────────────────────────────────────

    /// Signs out remotely, then clears local state whether or not that worked.
    pub fn sign_out(&self) -> Result<()> {
        self.state.update(|state| state.auth_phase = AuthPhase::SigningOut);

        let remote = self.auth.sign_out();
        if let Err(err) = &remote {
            tracing::warn!(error = %err, "Remote sign-out failed; clearing local session anyway");
        }

        self.reset_local_session();
        remote.map_err(CoreError::from)
    }

    fn reset_local_session(&self) {
        self.state.set(SessionState::default());
        if let Err(err) = self.local.onboarding.clear() {
            tracing::warn!(
                store = self.local.onboarding.label(),
                error = %err,
                "Failed to clear local store"
            );
        }
    }

    /// Deletes the account remotely, then wipes every local store.
    ///
    /// Every cleanup step runs even if an earlier one (or the remote call)
    /// failed.
    pub fn delete_account(&self) -> Result<()> {
        let user_id = self.require_user()?;
        let remote = self.accounts.delete_account(&user_id);

        self.state.set(SessionState::default());
        if let Err(err) = self.auth.clear_local_session() {
            tracing::warn!(error = %err, "Failed to drop persisted session");
        }
        for store in [
            &self.local.onboarding,
            &self.local.records,
            &self.local.preferences,
        ] {
            if let Err(err) = store.clear() {
                tracing::warn!(store = store.label(), error = %err, "Failed to clear local store");
            }
        }

        match remote {
            Ok(()) => {
                tracing::info!(user_id = %user_id, "Account deleted");
                Ok(())
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "Account deletion failed");
                Err(CoreError::AccountDeletion(deletion_failure_message(&err)))
            }
        }
    }
}

fn deletion_failure_message(err: &CoreError) -> String {
    if cfg!(debug_assertions) {
        format!("Account deletion failed: {}", err)
    } else {
        DELETION_FAILED_MESSAGE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_utils::{test_user, Harness};
    use crate::types::Goal;

    #[test]
    fn test_sign_in_sets_user_from_response() {
        let h = Harness::new();
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();

        let state = h.reconciler.snapshot();
        assert!(state.is_authenticated);
        assert_eq!(state.auth_phase, AuthPhase::Authenticated);
        assert_eq!(state.user_id(), Some("user-1"));
        assert!(state.profile.is_some());
    }

    #[test]
    fn test_sign_in_failure_returns_to_signed_out() {
        let h = Harness::new();
        h.auth.fail_with(AuthError::InvalidCredentials);

        let err = h.reconciler.sign_in("ada@example.com", "bad").unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
        let state = h.reconciler.snapshot();
        assert!(!state.is_authenticated);
        assert_eq!(state.auth_phase, AuthPhase::SignedOut);
        assert!(state.current_user.is_none());
    }

    #[test]
    fn test_profile_load_failure_does_not_block_sign_in() {
        let h = Harness::new();
        h.profiles.fail_fetch(true);

        h.reconciler.sign_in("ada@example.com", "pw").unwrap();

        let state = h.reconciler.snapshot();
        assert!(state.is_authenticated);
        assert!(state.profile.is_none());
    }

    #[test]
    fn test_oauth_bootstraps_before_authenticating() {
        let h = Harness::new();
        h.reconciler
            .sign_in_with_oauth(OAuthProvider::Apple, "id-token", Some("nonce"))
            .unwrap();

        assert_eq!(
            h.log.entries(),
            vec![
                "oauth:apple".to_string(),
                "ensure_profile".to_string(),
                "ensure_subscription_row".to_string(),
                "fetch_profile(authenticated=false)".to_string(),
                "fetch_subscription_record".to_string(),
            ]
        );
        assert!(h.reconciler.snapshot().is_authenticated);
    }

    #[test]
    fn test_oauth_bootstrap_failure_is_logged_not_fatal() {
        let h = Harness::new();
        h.profiles.fail_ensure(true);

        h.reconciler
            .sign_in_with_oauth(OAuthProvider::Google, "id-token", None)
            .unwrap();

        assert!(h.reconciler.snapshot().is_authenticated);
    }

    #[test]
    fn test_sign_up_requiring_confirmation_records_email() {
        let h = Harness::new();
        h.auth.require_confirmation(true);

        let outcome = h
            .reconciler
            .sign_up(" new@example.com ", "pw123456", Some("New User"))
            .unwrap();

        assert_eq!(
            outcome,
            SignUpOutcome::ConfirmationRequired {
                email: "new@example.com".to_string()
            }
        );
        let state = h.reconciler.snapshot();
        assert!(!state.is_authenticated);
        assert_eq!(state.auth_phase, AuthPhase::SignedOut);
        assert_eq!(state.pending_email_confirmation.as_deref(), Some("new@example.com"));

        h.reconciler.resend_confirmation().unwrap();
        assert!(h.log.contains("resend:new@example.com"));
    }

    #[test]
    fn test_sign_up_with_session_bootstraps_and_clears_pending_email() {
        let h = Harness::new();
        h.auth.require_confirmation(true);
        h.reconciler.sign_up("new@example.com", "pw123456", None).unwrap();
        h.auth.require_confirmation(false);

        let outcome = h
            .reconciler
            .sign_up("new@example.com", "pw123456", Some("New User"))
            .unwrap();

        assert_eq!(outcome, SignUpOutcome::SignedIn);
        assert!(h.log.contains("ensure_profile"));
        let state = h.reconciler.snapshot();
        assert!(state.is_authenticated);
        assert!(state.pending_email_confirmation.is_none());
    }

    #[test]
    fn test_resend_without_pending_email_fails() {
        let h = Harness::new();
        assert_eq!(
            h.reconciler.resend_confirmation(),
            Err(AuthError::SessionMissing)
        );
    }

    #[test]
    fn test_update_profile_writes_then_refetches() {
        let h = Harness::new();
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();
        h.log.clear();

        h.reconciler
            .update_profile(&ProfilePatch {
                goal: Some(Goal::GainMuscle),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            h.log.entries(),
            vec![
                "update_profile:{\"goal\":\"gain_muscle\"}".to_string(),
                "fetch_profile(authenticated=true)".to_string(),
            ]
        );
        let profile = h.reconciler.snapshot().profile.unwrap();
        assert_eq!(profile.goal, Some(Goal::GainMuscle));
    }

    #[test]
    fn test_empty_patch_makes_no_calls() {
        let h = Harness::new();
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();
        h.log.clear();

        h.reconciler.update_profile(&ProfilePatch::default()).unwrap();

        assert!(h.log.entries().is_empty());
    }

    #[test]
    fn test_update_profile_requires_user() {
        let h = Harness::new();
        let err = h
            .reconciler
            .update_profile(&ProfilePatch {
                age: Some(30),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAuthenticated));
    }

    #[test]
    fn test_entitlement_change_syncs_remote_row() {
        let h = Harness::new();
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();

        h.reconciler.set_entitlement(true);

        let written = h.profiles.wait_for_recorded_subscription();
        assert_eq!(written.subscription_type, SubscriptionType::Premium);
        assert!(h.reconciler.has_access());
    }

    #[test]
    fn test_stream_sign_in_for_same_user_only_refreshes_user() {
        let h = Harness::new();
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();
        h.log.clear();

        let mut user = test_user();
        user.email = Some("renamed@example.com".to_string());
        h.reconciler.handle_auth_event(AuthEvent::SignedIn(user));

        assert!(h.log.entries().is_empty());
        let state = h.reconciler.snapshot();
        assert_eq!(
            state.current_user.unwrap().email.as_deref(),
            Some("renamed@example.com")
        );
    }

    #[test]
    fn test_stream_sign_in_when_signed_out_authenticates() {
        let h = Harness::new();
        h.reconciler
            .handle_auth_event(AuthEvent::InitialSession(Some(test_user())));
        assert!(h.reconciler.snapshot().is_authenticated);
    }

    #[test]
    fn test_stream_sign_out_clears_state_without_remote_call() {
        let h = Harness::new();
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();
        h.log.clear();

        h.reconciler.handle_auth_event(AuthEvent::SignedOut);

        assert!(!h.log.contains("sign_out"));
        assert!(h.log.contains("clear_local_session"));
        assert_eq!(h.reconciler.snapshot(), SessionState::default());
        assert!(h.onboarding.was_cleared());
    }

    #[test]
    fn test_stream_switch_to_other_user_drops_previous_data() {
        let h = Harness::new();
        h.profiles.set_record(Some(SubscriptionRecord {
            subscription_type: SubscriptionType::Premium,
            trial_end_date: None,
        }));
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();
        assert!(h.reconciler.snapshot().profile.is_some());
        h.profiles.fail_fetch(true);

        let other = AuthUser {
            id: "user-2".to_string(),
            email: Some("grace@example.com".to_string()),
            identities: vec![],
        };
        h.reconciler.handle_auth_event(AuthEvent::SignedIn(other));

        let state = h.reconciler.snapshot();
        assert_eq!(state.user_id(), Some("user-2"));
        assert!(state.is_authenticated);
        assert!(state.profile.is_none());
        assert!(state.subscription_record.is_none());
    }

    #[test]
    fn test_event_listener_serialises_both_sources() {
        let h = Harness::new();
        let reconciler = Arc::clone(&h.reconciler);
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = reconciler.spawn_event_listener(rx).unwrap();

        tx.send(SessionEvent::Auth(AuthEvent::SignedIn(test_user())))
            .unwrap();
        tx.send(SessionEvent::EntitlementChanged(true)).unwrap();
        drop(tx);
        handle.join().unwrap();

        let state = reconciler.snapshot();
        assert!(state.is_authenticated);
        assert!(state.subscription_entitlement);
    }

    #[test]
    fn test_remote_record_is_kept_for_display_only() {
        let h = Harness::new();
        h.profiles.set_record(Some(SubscriptionRecord {
            subscription_type: SubscriptionType::Premium,
            trial_end_date: None,
        }));

        h.reconciler.sign_in("ada@example.com", "pw").unwrap();

        let state = h.reconciler.snapshot();
        assert_eq!(
            state.subscription_record.map(|r| r.subscription_type),
            Some(SubscriptionType::Premium)
        );
        assert!(!h.reconciler.has_access());
    }

    #[test]
    fn test_reload_after_sign_out_loads_nothing() {
        let h = Harness::new();
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();
        h.reconciler.sign_out().unwrap();
        h.log.clear();

        h.reconciler.reload_user_data();

        assert!(h.log.entries().is_empty());
        assert!(h.reconciler.snapshot().profile.is_none());
    }

    #[test]
    fn test_delete_account_remote_failure_still_cleans_up() {
        let h = Harness::new();
        h.reconciler.sign_in("ada@example.com", "pw").unwrap();
        h.accounts.fail(true);

        let err = h.reconciler.delete_account().unwrap_err();

        assert!(matches!(err, CoreError::AccountDeletion(_)));
        assert_eq!(h.reconciler.snapshot(), SessionState::default());
        assert!(h.onboarding.was_cleared());
        assert!(h.records.was_cleared());
        assert!(h.preferences.was_cleared());
    }
}
