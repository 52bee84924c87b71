//! Wire shapes for the `profiles` and `subscription_status` tables.
//!
//! Columns may be null or hold tokens this build doesn't know yet, so rows
//! decode into loose types first and convert to domain types afterwards.

use serde::Deserialize;

use crate::types::{
    ActivityLevel, DietType, Gender, Goal, Profile, SubscriptionRecord, SubscriptionType,
};

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub activity_level: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub diet_type: Option<String>,
}

fn token<T>(column: &str, value: Option<&str>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let value = value?;
    let parsed = parse(value);
    if parsed.is_none() {
        tracing::debug!(column, value, "Ignoring unknown token");
    }
    parsed
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            gender: token("gender", row.gender.as_deref(), Gender::from_token),
            activity_level: token(
                "activity_level",
                row.activity_level.as_deref(),
                ActivityLevel::from_token,
            ),
            goal: token("goal", row.goal.as_deref(), Goal::from_token),
            diet_type: token("diet_type", row.diet_type.as_deref(), DietType::from_token),
            age: row.age.and_then(|age| u32::try_from(age).ok()),
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            weight_kg: row.weight_kg,
            height_cm: row.height_cm,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionRow {
    #[serde(default)]
    pub subscription_type: Option<String>,
    #[serde(default)]
    pub trial_end_date: Option<String>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        SubscriptionRecord {
            subscription_type: token(
                "subscription_type",
                row.subscription_type.as_deref(),
                SubscriptionType::from_token,
            )
            .unwrap_or(SubscriptionType::Free),
            trial_end_date: row.trial_end_date,
        }
    }
}
