//! Applies parsed deep links to the published router state.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use uuid::Uuid;

use super::{parse_deep_link, DeepLink, DeepLinkError};
use crate::activity::ActivityManager;
use crate::detached::spawn_detached;
use crate::signal::Observable;
use crate::types::ReminderStatus;

/// Pending UI work produced by deep links.
///
/// Each flag/id pair is cleared together by its consume call once the UI has
/// acted on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterState {
    pub pending_meal_window_id: Option<Uuid>,
    pub should_show_quick_add: bool,
    pub pending_end_fast_id: Option<Uuid>,
    pub should_show_end_fast_confirmation: bool,
}

/// FFI rendering of [`RouterState`].
#[derive(Debug, Clone, Default, PartialEq, uniffi::Record)]
pub struct RouterSnapshot {
    pub pending_meal_window_id: Option<String>,
    pub should_show_quick_add: bool,
    pub pending_end_fast_id: Option<String>,
    pub should_show_end_fast_confirmation: bool,
}

impl From<&RouterState> for RouterSnapshot {
    fn from(state: &RouterState) -> Self {
        Self {
            pending_meal_window_id: state.pending_meal_window_id.map(|id| id.to_string()),
            should_show_quick_add: state.should_show_quick_add,
            pending_end_fast_id: state.pending_end_fast_id.map(|id| id.to_string()),
            should_show_end_fast_confirmation: state.should_show_end_fast_confirmation,
        }
    }
}

/// Routes inbound deep links to state transitions and activity updates.
pub struct DeepLinkRouter {
    scheme: String,
    state: Observable<RouterState>,
    activities: Arc<dyn ActivityManager>,
}

impl DeepLinkRouter {
    pub fn new(scheme: impl Into<String>, activities: Arc<dyn ActivityManager>) -> Self {
        Self {
            scheme: scheme.into(),
            state: Observable::new(RouterState::default()),
            activities,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Handles a URL delivered by the OS. Returns whether it was handled.
    ///
    /// Never blocks on activity updates; those run detached.
    pub fn route(&self, url: &str) -> bool {
        let link = match parse_deep_link(url, &self.scheme) {
            Ok(link) => link,
            Err(DeepLinkError::SchemeMismatch(scheme)) => {
                tracing::debug!(scheme = %scheme, "Ignoring URL with foreign scheme");
                return false;
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "Deep link not handled");
                return false;
            }
        };

        tracing::info!(link = ?link, "Routing deep link");
        self.apply(link);
        true
    }

    fn apply(&self, link: DeepLink) {
        match link {
            DeepLink::LogMeal {
                window_id: Some(window_id),
            } => {
                self.state.update(|state| {
                    state.pending_meal_window_id = Some(window_id);
                    state.should_show_quick_add = true;
                });

                let activities = Arc::clone(&self.activities);
                spawn_detached("reminder-logging", move || {
                    activities.update_meal_reminder(window_id.to_string(), ReminderStatus::Logging)
                });
            }
            DeepLink::LogMeal { window_id: None } => self.request_quick_add(),
            DeepLink::DismissReminder { window_id } => {
                let activities = Arc::clone(&self.activities);
                spawn_detached("reminder-dismiss", move || {
                    activities.end_meal_reminder(window_id.to_string(), ReminderStatus::Dismissed)
                });
            }
            DeepLink::EndFast { fast_id } => {
                // No side call until the user confirms.
                self.state.update(|state| {
                    state.pending_end_fast_id = Some(fast_id);
                    state.should_show_end_fast_confirmation = true;
                });
            }
        }
    }

    /// Opens quick-add with no meal window context.
    pub fn request_quick_add(&self) {
        self.state.update(|state| {
            state.pending_meal_window_id = None;
            state.should_show_quick_add = true;
        });
    }

    /// Clears the quick-add pair once the UI has presented it.
    pub fn consume_quick_add(&self) {
        self.state.update(|state| {
            state.pending_meal_window_id = None;
            state.should_show_quick_add = false;
        });
    }

    /// Clears the end-fast pair once the UI has presented or dismissed it.
    pub fn consume_end_fast_confirmation(&self) {
        self.state.update(|state| {
            state.pending_end_fast_id = None;
            state.should_show_end_fast_confirmation = false;
        });
    }

    /// The user confirmed ending the pending fast.
    ///
    /// Clears the pair, ends the fasting activity in the background and
    /// returns the fast id so the caller can close it in its own store.
    pub fn confirm_end_fast(&self) -> Option<Uuid> {
        let fast_id = self.state.update(|state| {
            state.should_show_end_fast_confirmation = false;
            state.pending_end_fast_id.take()
        })?;

        let activities = Arc::clone(&self.activities);
        spawn_detached("fast-end", move || {
            activities.end_fasting_activity(fast_id.to_string())
        });
        Some(fast_id)
    }

    pub fn snapshot(&self) -> RouterState {
        self.state.get()
    }

    pub fn subscribe(&self) -> Receiver<RouterState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreFfiError;
    use std::sync::mpsc::{self, Sender};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum Call {
        Update(String, ReminderStatus),
        End(String, ReminderStatus),
        EndFast(String),
    }

    struct RecordingActivities {
        calls: Mutex<Sender<Call>>,
    }

    impl ActivityManager for RecordingActivities {
        fn update_meal_reminder(
            &self,
            window_id: String,
            status: ReminderStatus,
        ) -> Result<(), CoreFfiError> {
            let _ = self.calls.lock().unwrap().send(Call::Update(window_id, status));
            Ok(())
        }

        fn end_meal_reminder(
            &self,
            window_id: String,
            status: ReminderStatus,
        ) -> Result<(), CoreFfiError> {
            let _ = self.calls.lock().unwrap().send(Call::End(window_id, status));
            Ok(())
        }

        fn end_fasting_activity(&self, fast_id: String) -> Result<(), CoreFfiError> {
            let _ = self.calls.lock().unwrap().send(Call::EndFast(fast_id));
            Ok(())
        }
    }

    fn router() -> (DeepLinkRouter, Receiver<Call>) {
        let (tx, rx) = mpsc::channel();
        let activities = Arc::new(RecordingActivities {
            calls: Mutex::new(tx),
        });
        (DeepLinkRouter::new("prismae", activities), rx)
    }

    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(150);

    #[test]
    fn test_log_meal_sets_pending_pair_and_marks_logging() {
        let (router, calls) = router();
        let id = Uuid::new_v4();

        assert!(router.route(&format!("prismae://log-meal?window={}", id)));

        let state = router.snapshot();
        assert_eq!(state.pending_meal_window_id, Some(id));
        assert!(state.should_show_quick_add);
        assert_eq!(
            calls.recv_timeout(WAIT).unwrap(),
            Call::Update(id.to_string(), ReminderStatus::Logging)
        );
    }

    #[test]
    fn test_confirm_end_fast_clears_pair_and_ends_activity() {
        let (router, calls) = router();
        let id = Uuid::new_v4();
        assert!(router.route(&format!("prismae://end-fast?id={}", id)));
        assert!(calls.recv_timeout(QUIET).is_err());

        assert_eq!(router.confirm_end_fast(), Some(id));

        let state = router.snapshot();
        assert_eq!(state.pending_end_fast_id, None);
        assert!(!state.should_show_end_fast_confirmation);
        assert_eq!(calls.recv_timeout(WAIT).unwrap(), Call::EndFast(id.to_string()));
    }

    #[test]
    fn test_confirm_without_pending_fast_is_noop() {
        let (router, calls) = router();
        assert_eq!(router.confirm_end_fast(), None);
        assert!(calls.recv_timeout(QUIET).is_err());
    }

    #[test]
    fn test_consume_clears_only_its_pair() {
        let (router, _calls) = router();
        let window = Uuid::new_v4();
        let fast = Uuid::new_v4();
        router.route(&format!("prismae://log-meal?window={}", window));
        router.route(&format!("prismae://end-fast?id={}", fast));

        router.consume_quick_add();

        let state = router.snapshot();
        assert_eq!(state.pending_meal_window_id, None);
        assert!(!state.should_show_quick_add);
        assert_eq!(state.pending_end_fast_id, Some(fast));
        assert!(state.should_show_end_fast_confirmation);

        router.consume_end_fast_confirmation();
        assert_eq!(router.snapshot(), RouterState::default());
    }

    #[test]
    fn test_subscribers_see_route_changes() {
        let (router, _calls) = router();
        let updates = router.subscribe();

        router.route("prismae://log-meal");

        let state = updates.recv_timeout(WAIT).unwrap();
        assert!(state.should_show_quick_add);
        assert_eq!(state.pending_meal_window_id, None);
    }

    #[test]
    fn test_snapshot_renders_ids_as_strings() {
        let id = Uuid::new_v4();
        let state = RouterState {
            pending_meal_window_id: Some(id),
            should_show_quick_add: true,
            ..Default::default()
        };
        let snapshot = RouterSnapshot::from(&state);
        assert_eq!(snapshot.pending_meal_window_id, Some(id.to_string()));
        assert!(snapshot.should_show_quick_add);
        assert_eq!(snapshot.pending_end_fast_id, None);
    }
}
