//! PrismaeEngine - the single entry point native clients hold.
//!
//! The engine wires the deep-link router, the session reconciler (backed by
//! the hosted backend and the on-device stores) and the analysis client. It is:
//! - **Synchronous**: every call blocks until done; no async runtime
//! - **Thread-safe**: all methods take `&self` and may be called from any thread
//! - **Stable**: prefer additive API changes to avoid breaking FFI clients
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use prismae_core::{CoreConfig, LoggingActivityManager, PrismaeEngine};
//!
//! let engine = PrismaeEngine::new(CoreConfig::default(), Arc::new(LoggingActivityManager))?;
//! engine.check_session_on_launch();
//! engine.route("prismae://log-meal".to_string());
//! ```

use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use crate::activity::ActivityManager;
use crate::analysis::{AnalysisClient, FoodAnalysis};
use crate::backend::SupabaseBackend;
use crate::config::CoreConfig;
use crate::deeplink::{DeepLinkRouter, RouterSnapshot};
use crate::error::{AnalysisError, CoreError, CoreFfiError, Result};
use crate::local_store::{
    MealEntry, MealLog, MealRecord, OnboardingCache, OnboardingProgress, OnboardingStep,
    PreferenceStore,
};
use crate::session::{AuthEvent, LocalStores, SessionEvent, SessionReconciler, SessionState};
use crate::storage::StorageConfig;
use crate::types::{OAuthProvider, ProfilePatch, SignUpOutcome};

/// Receives published state whenever it changes.
#[uniffi::export(with_foreign)]
pub trait StateObserver: Send + Sync {
    fn session_changed(&self, state: SessionState);

    fn router_changed(&self, state: RouterSnapshot);
}

/// The main engine for Prismae client operations.
#[derive(uniffi::Object)]
pub struct PrismaeEngine {
    storage: StorageConfig,
    router: DeepLinkRouter,
    session: Arc<SessionReconciler>,
    analysis: Option<AnalysisClient>,
    onboarding: OnboardingCache,
    meals: MealLog,
    preferences: PreferenceStore,
    events: Sender<SessionEvent>,
}

impl PrismaeEngine {
    /// Assembles an engine from already-built collaborators.
    ///
    /// Not exposed to FFI. Tests use it to inject an in-memory session.
    pub(crate) fn from_parts(
        storage: StorageConfig,
        scheme: &str,
        activities: Arc<dyn ActivityManager>,
        session: Arc<SessionReconciler>,
        analysis: Option<AnalysisClient>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        session.spawn_event_listener(rx)?;

        Ok(Self {
            router: DeepLinkRouter::new(scheme, activities),
            onboarding: OnboardingCache::new(&storage),
            meals: MealLog::new(&storage),
            preferences: PreferenceStore::new(&storage),
            storage,
            session,
            analysis,
            events: tx,
        })
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn router(&self) -> &DeepLinkRouter {
        &self.router
    }

    pub fn session(&self) -> &Arc<SessionReconciler> {
        &self.session
    }

    /// Queues an event for the session listener thread.
    ///
    /// Falls back to applying it inline if the listener has gone away.
    fn dispatch(&self, event: SessionEvent) {
        if let Err(mpsc::SendError(event)) = self.events.send(event) {
            tracing::warn!("Session listener stopped; applying event inline");
            match event {
                SessionEvent::Auth(event) => self.session.handle_auth_event(event),
                SessionEvent::EntitlementChanged(entitled) => {
                    self.session.set_entitlement(entitled)
                }
            }
        }
    }
}

fn forward<T: Send + 'static>(
    name: &str,
    updates: Receiver<T>,
    deliver: impl Fn(T) + Send + 'static,
) -> Result<()> {
    thread::Builder::new()
        .name(format!("prismae-observe-{}", name))
        .spawn(move || {
            for update in updates {
                deliver(update);
            }
        })
        .map(|_| ())
        .map_err(|e| CoreError::io("spawn state observer", e))
}

#[uniffi::export]
impl PrismaeEngine {
    /// Creates an engine backed by the hosted backend described in `config`.
    #[uniffi::constructor]
    pub fn new(
        config: CoreConfig,
        activities: Arc<dyn ActivityManager>,
    ) -> std::result::Result<Self, CoreFfiError> {
        let storage = StorageConfig::resolve(config.storage_root.as_deref())?;
        let backend = Arc::new(SupabaseBackend::new(&config, &storage)?);
        let session = Arc::new(SessionReconciler::new(
            backend.clone(),
            backend.clone(),
            backend,
            LocalStores {
                onboarding: Arc::new(OnboardingCache::new(&storage)),
                records: Arc::new(MealLog::new(&storage)),
                preferences: Arc::new(PreferenceStore::new(&storage)),
            },
        ));
        let analysis = if config.analysis_proxy_url.trim().is_empty() {
            tracing::info!("No analysis proxy configured");
            None
        } else {
            Some(AnalysisClient::new(&config)?)
        };

        tracing::info!(root = %storage.root().display(), "Engine ready");
        Ok(Self::from_parts(storage, &config.url_scheme, activities, session, analysis)?)
    }

    /// Path of the on-device data directory.
    pub fn storage_dir(&self) -> String {
        self.storage.root().to_string_lossy().to_string()
    }

    /// Delivers every later change of session and router state to `observer`.
    pub fn observe(
        &self,
        observer: Arc<dyn StateObserver>,
    ) -> std::result::Result<(), CoreFfiError> {
        let session_observer = Arc::clone(&observer);
        forward("session", self.session.subscribe(), move |state| {
            session_observer.session_changed(state)
        })?;
        forward("router", self.router.subscribe(), move |state| {
            observer.router_changed(RouterSnapshot::from(&state))
        })?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Deep links
    // ─────────────────────────────────────────────────────────────────────────────

    /// Routes a URL opened by the OS. Returns whether it was handled.
    pub fn route(&self, url: String) -> bool {
        self.router.route(&url)
    }

    pub fn router_state(&self) -> RouterSnapshot {
        RouterSnapshot::from(&self.router.snapshot())
    }

    pub fn request_quick_add(&self) {
        self.router.request_quick_add();
    }

    pub fn consume_quick_add(&self) {
        self.router.consume_quick_add();
    }

    pub fn consume_end_fast_confirmation(&self) {
        self.router.consume_end_fast_confirmation();
    }

    /// Confirms the pending end-fast request and returns the fast id.
    pub fn confirm_end_fast(&self) -> Option<String> {
        self.router.confirm_end_fast().map(|id| id.to_string())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn session_state(&self) -> SessionState {
        self.session.snapshot()
    }

    pub fn check_session_on_launch(&self) {
        self.session.check_session_on_launch();
    }

    pub fn sign_in(
        &self,
        email: String,
        password: String,
    ) -> std::result::Result<(), CoreFfiError> {
        Ok(self.session.sign_in(&email, &password)?)
    }

    pub fn sign_up(
        &self,
        email: String,
        password: String,
        full_name: Option<String>,
    ) -> std::result::Result<SignUpOutcome, CoreFfiError> {
        Ok(self.session.sign_up(&email, &password, full_name.as_deref())?)
    }

    pub fn resend_confirmation(&self) -> std::result::Result<(), CoreFfiError> {
        Ok(self.session.resend_confirmation()?)
    }

    pub fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        id_token: String,
        nonce: Option<String>,
    ) -> std::result::Result<(), CoreFfiError> {
        Ok(self
            .session
            .sign_in_with_oauth(provider, &id_token, nonce.as_deref())?)
    }

    pub fn sign_out(&self) -> std::result::Result<(), CoreFfiError> {
        Ok(self.session.sign_out()?)
    }

    pub fn update_profile(&self, patch: ProfilePatch) -> std::result::Result<(), CoreFfiError> {
        Ok(self.session.update_profile(&patch)?)
    }

    pub fn delete_account(&self) -> std::result::Result<(), CoreFfiError> {
        Ok(self.session.delete_account()?)
    }

    pub fn reload_user_data(&self) {
        self.session.reload_user_data();
    }

    pub fn has_access(&self) -> bool {
        self.session.has_access()
    }

    /// Reports the result of the platform's purchase verification.
    pub fn set_purchase_entitlement(&self, entitled: bool) {
        self.dispatch(SessionEvent::EntitlementChanged(entitled));
    }

    /// The auth service revoked the session out of band.
    pub fn handle_remote_sign_out(&self) {
        self.dispatch(SessionEvent::Auth(AuthEvent::SignedOut));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Analysis
    // ─────────────────────────────────────────────────────────────────────────────

    /// Estimates nutrition for a free-text meal description.
    ///
    /// A rejected user token is refreshed once and the request retried.
    pub fn analyze_text(&self, text: String) -> std::result::Result<FoodAnalysis, CoreFfiError> {
        let client = self
            .analysis
            .as_ref()
            .ok_or_else(|| CoreFfiError::from("Food analysis is not configured"))?;
        let state = self.session.snapshot();
        let user_id = state.user_id();
        let token = self.session.access_token();

        let result = match client.analyze_text(&text, user_id, token.as_deref()) {
            Err(AnalysisError::Unauthorized) if token.is_some() => {
                tracing::debug!("Analysis rejected the user token; refreshing once");
                match self.session.refresh_access_token() {
                    Some(fresh) => client.analyze_text(&text, user_id, Some(&fresh)),
                    None => Err(AnalysisError::Unauthorized),
                }
            }
            other => other,
        };
        result.map_err(CoreFfiError::from)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Local data
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn onboarding_progress(&self) -> OnboardingProgress {
        self.onboarding.load()
    }

    pub fn complete_onboarding_step(
        &self,
        step: OnboardingStep,
    ) -> std::result::Result<OnboardingProgress, CoreFfiError> {
        Ok(self.onboarding.complete(step)?)
    }

    /// Saves a meal, optionally tied to the reminder window it was logged from.
    pub fn log_meal(
        &self,
        name: String,
        total_calories: f64,
        protein_g: f64,
        carbs_g: f64,
        fat_g: f64,
        meal_window_id: Option<String>,
    ) -> std::result::Result<MealEntry, CoreFfiError> {
        let meal_window_id = meal_window_id
            .map(|raw| {
                Uuid::from_str(raw.trim()).map_err(|e| CoreError::InvalidInput {
                    field: "meal_window_id".to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let mut record = MealRecord::new(name, total_calories);
        record.protein_g = protein_g;
        record.carbs_g = carbs_g;
        record.fat_g = fat_g;
        record.meal_window_id = meal_window_id;
        self.meals.save(&record)?;
        Ok(MealEntry::from(&record))
    }

    /// Logged meals, newest first.
    pub fn recent_meals(&self) -> Vec<MealEntry> {
        self.meals.list().iter().map(MealEntry::from).collect()
    }

    pub fn preference(&self, key: String) -> bool {
        self.preferences.get(&key)
    }

    pub fn set_preference(
        &self,
        key: String,
        value: bool,
    ) -> std::result::Result<(), CoreFfiError> {
        Ok(self.preferences.set(&key, value)?)
    }
}
