//! # prismae-core
//!
//! Core library for Prismae, the shared business logic behind every client
//! (iOS app, developer CLI).
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Fire-and-forget work runs on
//!   detached threads.
//! - **Single writer**: Each piece of published state has exactly one owner
//!   that mutates it; everyone else observes.
//! - **Graceful degradation**: Malformed links are ignored, missing local files
//!   read as defaults, background loads only log on failure.
//! - **FFI-ready**: UniFFI annotations enable Swift and Kotlin bindings.
//!   Prefer additive public API changes; removing or renaming breaks FFI clients.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prismae_core::{CoreConfig, LoggingActivityManager, PrismaeEngine};
//!
//! let engine = PrismaeEngine::new(config, Arc::new(LoggingActivityManager))?;
//! engine.check_session_on_launch();
//! let handled = engine.route("prismae://log-meal?window=...".into());
//! ```

// UniFFI scaffolding for Swift/Kotlin bindings
uniffi::setup_scaffolding!();

// Public modules
pub mod activity;
pub mod analysis;
pub mod backend;
pub mod config;
pub mod deeplink;
pub mod detached;
pub mod engine;
pub mod error;
pub mod local_store;
pub mod session;
pub mod signal;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_http;

// Re-export commonly used items at crate root
pub use activity::{ActivityManager, LoggingActivityManager};
pub use analysis::{AnalysisClient, AnalyzedFood, FoodAnalysis};
pub use backend::SupabaseBackend;
pub use config::CoreConfig;
pub use deeplink::{
    parse_deep_link, DeepLink, DeepLinkError, DeepLinkRouter, RouterSnapshot, RouterState,
};
pub use engine::{PrismaeEngine, StateObserver};
pub use error::{AnalysisError, AuthError, CoreError, CoreFfiError, Result};
pub use local_store::{
    MealEntry, MealLog, MealRecord, OnboardingCache, OnboardingProgress, OnboardingStep,
    PreferenceStore,
};
pub use session::{
    AccountService, AuthEvent, AuthPhase, AuthService, LocalCleanup, LocalStores,
    ProfileRepository, SessionEvent, SessionReconciler, SessionState, SignUpResponse,
};
pub use storage::StorageConfig;
pub use types::*;
