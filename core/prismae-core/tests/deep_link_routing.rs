//! Integration tests for deep-link routing against a recording activity surface.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use prismae_core::{
    ActivityManager, CoreFfiError, DeepLinkRouter, ReminderStatus, RouterState,
};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

#[derive(Debug, PartialEq)]
enum Call {
    Update(String, ReminderStatus),
    End(String, ReminderStatus),
    EndFast(String),
}

/// Records calls; optionally blocks each call until the gate is opened.
struct GatedActivities {
    calls: Mutex<Sender<Call>>,
    gate: Mutex<Option<Receiver<()>>>,
}

impl GatedActivities {
    fn wait_for_gate(&self) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
    }

    fn record(&self, call: Call) -> Result<(), CoreFfiError> {
        self.wait_for_gate();
        let _ = self.calls.lock().unwrap().send(call);
        Ok(())
    }
}

impl ActivityManager for GatedActivities {
    fn update_meal_reminder(
        &self,
        window_id: String,
        status: ReminderStatus,
    ) -> Result<(), CoreFfiError> {
        self.record(Call::Update(window_id, status))
    }

    fn end_meal_reminder(
        &self,
        window_id: String,
        status: ReminderStatus,
    ) -> Result<(), CoreFfiError> {
        self.record(Call::End(window_id, status))
    }

    fn end_fasting_activity(&self, fast_id: String) -> Result<(), CoreFfiError> {
        self.record(Call::EndFast(fast_id))
    }
}

fn router() -> (DeepLinkRouter, Receiver<Call>) {
    let (tx, rx) = mpsc::channel();
    let activities = Arc::new(GatedActivities {
        calls: Mutex::new(tx),
        gate: Mutex::new(None),
    });
    (DeepLinkRouter::new("prismae", activities), rx)
}

#[test]
fn test_foreign_scheme_is_ignored() {
    let (router, calls) = router();
    let id = Uuid::new_v4();

    assert!(!router.route(&format!("https://log-meal?window={}", id)));
    assert!(!router.route(&format!("otherapp://log-meal?window={}", id)));

    assert_eq!(router.snapshot(), RouterState::default());
    assert!(calls.recv_timeout(QUIET).is_err());
}

#[test]
fn test_log_meal_with_window_opens_quick_add() {
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
fn test_log_meal_without_usable_window_still_opens_quick_add() {
    for url in ["prismae://log-meal", "prismae://log-meal?window=abc"] {
        let (router, calls) = router();

        assert!(router.route(url), "{url} should be handled");

        let state = router.snapshot();
        assert!(state.should_show_quick_add);
        assert_eq!(state.pending_meal_window_id, None);
        assert!(calls.recv_timeout(QUIET).is_err());
    }
}

#[test]
fn test_dismiss_without_window_is_rejected() {
    for url in ["prismae://dismiss-reminder", "prismae://dismiss-reminder?window=abc"] {
        let (router, calls) = router();

        assert!(!router.route(url), "{url} should be rejected");

        assert_eq!(router.snapshot(), RouterState::default());
        assert!(calls.recv_timeout(QUIET).is_err());
    }
}

#[test]
fn test_dismiss_ends_reminder_without_touching_state() {
    let (router, calls) = router();
    let id = Uuid::new_v4();

    assert!(router.route(&format!("prismae://dismiss-reminder?window={}", id)));

    assert_eq!(
        calls.recv_timeout(WAIT).unwrap(),
        Call::End(id.to_string(), ReminderStatus::Dismissed)
    );
    assert_eq!(router.snapshot(), RouterState::default());
}

#[test]
fn test_end_fast_sets_confirmation_synchronously_with_no_side_call() {
    let (router, calls) = router();
    let id = Uuid::new_v4();

    assert!(router.route(&format!("prismae://end-fast?id={}", id)));

    let state = router.snapshot();
    assert_eq!(state.pending_end_fast_id, Some(id));
    assert!(state.should_show_end_fast_confirmation);
    assert!(calls.recv_timeout(QUIET).is_err());
}

#[test]
fn test_later_link_overwrites_pending_window() {
    let (router, _calls) = router();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    router.route(&format!("prismae://log-meal?window={}", first));
    router.route(&format!("prismae://log-meal?window={}", second));

    assert_eq!(router.snapshot().pending_meal_window_id, Some(second));
}

#[test]
fn test_route_does_not_wait_for_activity_updates() {
    let (call_tx, calls) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel();
    let activities = Arc::new(GatedActivities {
        calls: Mutex::new(call_tx),
        gate: Mutex::new(Some(gate_rx)),
    });
    let router = DeepLinkRouter::new("prismae", activities);
    let id = Uuid::new_v4();

    let started = Instant::now();
    assert!(router.route(&format!("prismae://log-meal?window={}", id)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(router.snapshot().should_show_quick_add);
    assert!(calls.recv_timeout(QUIET).is_err());

    gate_tx.send(()).unwrap();
    assert_eq!(
        calls.recv_timeout(WAIT).unwrap(),
        Call::Update(id.to_string(), ReminderStatus::Logging)
    );
}
