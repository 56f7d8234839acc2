//! Adaptive handles for live-updatable config.
//!
//! Backed by `ArcSwap` for lock-free reads; a writer simply swaps in a new
//! `Arc<T>` rather than mutating in place, so readers never block on a
//! `service:config-update` admin action (design §10.3).

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Adaptive<T> gives cheap reads and controlled updates for shared config.
#[derive(Debug)]
pub struct Adaptive<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for Adaptive<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> Adaptive<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value (cheap clone of an `Arc`).
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Update via closure over the current snapshot.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
        T: Clone,
    {
        let cur = self.inner.load_full();
        let new_val = f(&cur);
        self.inner.store(Arc::new(new_val));
    }
}

#[cfg(test)]
mod tests {
    use super::Adaptive;

    #[test]
    fn get_set_update() {
        let a = Adaptive::new(1);
        assert_eq!(*a.get(), 1);
        a.set(2);
        assert_eq!(*a.get(), 2);
        a.update(|v| v + 3);
        assert_eq!(*a.get(), 5);
    }
}
