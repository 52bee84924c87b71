//! Core types shared across all Prismae clients.
//!
//! These types are the common vocabulary of the app: the Swift shell, the
//! developer CLI and the backend client all use the exact same shapes.
//!
//! **FFI Support:** All types are annotated with UniFFI macros for Swift/Kotlin bindings.
//! Identifiers cross the boundary as strings.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// Token Enums
// ═══════════════════════════════════════════════════════════════════════════════

/// Generates the lowercase snake_case token mapping used by the relational store.
macro_rules! token_enum {
    ($name:ident { $($variant:ident => $token:literal),+ $(,)? }) => {
        impl $name {
            /// The token persisted for this value.
            pub fn as_token(&self) -> &'static str {
                match self {
                    $($name::$variant => $token,)+
                }
            }

            /// Parses a persisted token. Unknown tokens yield `None`.
            pub fn from_token(token: &str) -> Option<Self> {
                match token {
                    $($token => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

token_enum!(Gender {
    Male => "male",
    Female => "female",
    Other => "other",
    PreferNotToSay => "prefer_not_to_say",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    VeryActive,
    ExtremelyActive,
}

token_enum!(ActivityLevel {
    Sedentary => "sedentary",
    LightlyActive => "lightly_active",
    ModeratelyActive => "moderately_active",
    VeryActive => "very_active",
    ExtremelyActive => "extremely_active",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    LoseWeight,
    Maintain,
    GainMuscle,
}

token_enum!(Goal {
    LoseWeight => "lose_weight",
    Maintain => "maintain",
    GainMuscle => "gain_muscle",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum DietType {
    Balanced,
    HighProtein,
    LowCarb,
    Keto,
    Vegetarian,
    Vegan,
}

token_enum!(DietType {
    Balanced => "balanced",
    HighProtein => "high_protein",
    LowCarb => "low_carb",
    Keto => "keto",
    Vegetarian => "vegetarian",
    Vegan => "vegan",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    Free,
    Trial,
    Premium,
}

token_enum!(SubscriptionType {
    Free => "free",
    Trial => "trial",
    Premium => "premium",
});

// ═══════════════════════════════════════════════════════════════════════════════
// Identity Types
// ═══════════════════════════════════════════════════════════════════════════════

/// A linked sign-in identity (email, apple, google, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct Identity {
    pub provider: String,
    #[serde(default)]
    pub identity_id: Option<String>,
}

/// The authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub identities: Vec<Identity>,
}

/// Tokens plus user returned by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: AuthUser,
}

/// Supported third-party identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
    Apple,
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Apple => "apple",
            OAuthProvider::Google => "google",
        }
    }
}

/// Result of an email sign-up.
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum SignUpOutcome {
    /// The account is active and the user is signed in.
    SignedIn,
    /// The account exists but the email must be confirmed first.
    ConfirmationRequired { email: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Profile Types
// ═══════════════════════════════════════════════════════════════════════════════

/// The user's profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct Profile {
    pub id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub activity_level: Option<ActivityLevel>,
    pub goal: Option<Goal>,
    pub diet_type: Option<DietType>,
}

/// A partial profile update. Only fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, uniffi::Record)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub activity_level: Option<ActivityLevel>,
    pub goal: Option<Goal>,
    pub diet_type: Option<DietType>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.to_row().is_empty()
    }

    /// Column/value pairs for the set fields, with enums as persisted tokens.
    pub fn to_row(&self) -> serde_json::Map<String, serde_json::Value> {
        use serde_json::Value;

        let mut row = serde_json::Map::new();
        if let Some(name) = &self.full_name {
            row.insert("full_name".into(), Value::from(name.clone()));
        }
        if let Some(age) = self.age {
            row.insert("age".into(), Value::from(age));
        }
        if let Some(gender) = self.gender {
            row.insert("gender".into(), Value::from(gender.as_token()));
        }
        if let Some(weight) = self.weight_kg {
            row.insert("weight_kg".into(), Value::from(weight));
        }
        if let Some(height) = self.height_cm {
            row.insert("height_cm".into(), Value::from(height));
        }
        if let Some(level) = self.activity_level {
            row.insert("activity_level".into(), Value::from(level.as_token()));
        }
        if let Some(goal) = self.goal {
            row.insert("goal".into(), Value::from(goal.as_token()));
        }
        if let Some(diet) = self.diet_type {
            row.insert("diet_type".into(), Value::from(diet.as_token()));
        }
        row
    }
}

/// The remote `subscription_status` row. Display only; never used for access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
pub struct SubscriptionRecord {
    pub subscription_type: SubscriptionType,
    pub trial_end_date: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Live Activity Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Status shown on a meal reminder Live Activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Active,
    Dismissed,
    Logging,
    Expiring,
}
