//! Observable state cells.
//!
//! An [`Observable`] owns one value behind a mutex and fans out snapshots to
//! subscribers over `mpsc` channels whenever the value changes. Owning
//! components keep the `Observable` private and expose `snapshot()` and
//! `subscribe()`, so mutation stays with the owner while any number of UI
//! layers observe.
//!
//! Subscribers whose receiver has been dropped are pruned on the next change.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

struct Cell<T> {
    value: T,
    subscribers: Vec<Sender<T>>,
}

/// Shared, mutex-serialised value with change notification.
pub struct Observable<T> {
    inner: Arc<Mutex<Cell<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cell {
                value,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cell<T>> {
        // Recover from poisoning - the value is plain data and stays usable
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Mutates the value in place and notifies subscribers if it changed.
    ///
    /// The closure runs under the lock; it must not call back into this
    /// observable or perform blocking I/O.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut T) -> R) -> R {
        let mut cell = self.lock();
        let before = cell.value.clone();
        let result = mutate(&mut cell.value);
        if cell.value != before {
            let snapshot = cell.value.clone();
            cell.subscribers
                .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
        }
        result
    }

    /// Replaces the value.
    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    /// Registers a subscriber. The receiver gets every subsequent change,
    /// not the current value.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}
