//! Published session state.

use serde::{Deserialize, Serialize};

use crate::types::{AuthUser, Profile, SubscriptionRecord};

/// Where the auth flow currently is.
///
/// `SignedOut → SigningIn → Authenticated | SignedOut` and
/// `Authenticated → SigningOut → SignedOut`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    #[default]
    SignedOut,
    SigningIn,
    Authenticated,
    SigningOut,
}

/// Everything the app knows about the signed-in user.
///
/// The default value is the fully signed-out state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub auth_phase: AuthPhase,
    pub current_user: Option<AuthUser>,
    pub profile: Option<Profile>,
    /// Local purchase-verification result. The only input to access.
    pub subscription_entitlement: bool,
    /// Last remote subscription row seen. Display only.
    pub subscription_record: Option<SubscriptionRecord>,
    pub pending_email_confirmation: Option<String>,
}

impl SessionState {
    pub fn user_id(&self) -> Option<&str> {
        self.current_user.as_ref().map(|user| user.id.as_str())
    }

    pub fn has_access(&self) -> bool {
        self.subscription_entitlement
    }
}
