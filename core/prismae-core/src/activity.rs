//! Live Activity surface.
//!
//! The platform owns the actual widgets; the core only tells it what to show.
//! Native clients implement [`ActivityManager`] (ActivityKit on iOS) and hand it
//! to the engine. Calls are keyed by the meal window or fast identifier.

use crate::error::CoreFfiError;
use crate::types::ReminderStatus;

/// Push-style update/end API for meal reminder and fasting activities.
///
/// Implementations may block; the router always calls them from a detached
/// task.
#[uniffi::export(with_foreign)]
pub trait ActivityManager: Send + Sync {
    /// Pushes a new status onto the reminder activity for `window_id`.
    fn update_meal_reminder(
        &self,
        window_id: String,
        status: ReminderStatus,
    ) -> Result<(), CoreFfiError>;

    /// Ends the reminder activity for `window_id` with a final status.
    fn end_meal_reminder(
        &self,
        window_id: String,
        status: ReminderStatus,
    ) -> Result<(), CoreFfiError>;

    /// Ends the fasting timer activity for `fast_id`.
    fn end_fasting_activity(&self, fast_id: String) -> Result<(), CoreFfiError>;
}

/// Activity manager that only logs. Used by the CLI and by hosts without
/// Live Activity support.
#[derive(Debug, Default)]
pub struct LoggingActivityManager;

impl ActivityManager for LoggingActivityManager {
    fn update_meal_reminder(
        &self,
        window_id: String,
        status: ReminderStatus,
    ) -> Result<(), CoreFfiError> {
        tracing::info!(window_id = %window_id, status = ?status, "Meal reminder update");
        Ok(())
    }

    fn end_meal_reminder(
        &self,
        window_id: String,
        status: ReminderStatus,
    ) -> Result<(), CoreFfiError> {
        tracing::info!(window_id = %window_id, status = ?status, "Meal reminder ended");
        Ok(())
    }

    fn end_fasting_activity(&self, fast_id: String) -> Result<(), CoreFfiError> {
        tracing::info!(fast_id = %fast_id, "Fasting activity ended");
        Ok(())
    }
}
