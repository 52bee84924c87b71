//! Fire-and-forget side effects.
//!
//! A detached task runs on its own thread. Nobody awaits it, it is never
//! retried, and a failure is only logged. Call sites use [`spawn_detached`] so
//! that contract is visible where the effect is issued.

use std::fmt::Display;
use std::thread;

/// Runs `task` on a detached thread, logging its error if it fails.
pub fn spawn_detached<F, E>(label: &'static str, task: F)
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: Display,
{
    let spawned = thread::Builder::new()
        .name(format!("prismae-{}", label))
        .spawn(move || {
            if let Err(err) = task() {
                tracing::warn!(task = label, error = %err, "Detached task failed");
            }
        });

    if let Err(err) = spawned {
        tracing::warn!(task = label, error = %err, "Failed to spawn detached task");
    }
}
