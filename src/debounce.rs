//! Cancellable debounce timer
//!
//! `arm` (re)starts a quiet-period timer keyed by a fingerprint; only the
//! last arm within a burst fires. Each arm gets a generation number so the
//! fired task can confirm, under its owner's lock, that it was not
//! superseded after waking up.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Pending {
    key: String,
    generation: u64,
    handle: JoinHandle<()>,
}

/// Single-slot debounce timer
pub struct Debouncer {
    quiet_period: Duration,
    generation: u64,
    pending: Option<Pending>,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            generation: 0,
            pending: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Cancel any pending timer and start a new one for `key`
    ///
    /// After the quiet period `fire` is called with the generation returned
    /// here. Must be called from within a tokio runtime.
    pub fn arm<F, Fut>(&mut self, key: impl Into<String>, fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        self.generation += 1;
        let generation = self.generation;
        let quiet_period = self.quiet_period;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            fire(generation).await;
        });

        self.pending = Some(Pending {
            key: key.into(),
            generation,
            handle,
        });
        generation
    }

    /// Abort the pending timer, if any
    ///
    /// Returns `true` if a timer was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Claim the pending slot for a fired timer
    ///
    /// Returns `false` if `generation` was cancelled or superseded. On
    /// success the slot is cleared without aborting the caller's task.
    pub fn take_if_current(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Key of the pending timer
    pub fn pending_key(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.key.as_str())
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Fired = Arc<Mutex<Vec<(String, u64)>>>;

    fn record(fired: &Fired, key: &str) -> impl FnOnce(u64) -> std::future::Ready<()> {
        let fired = fired.clone();
        let key = key.to_string();
        move |generation| {
            fired.lock().unwrap().push((key, generation));
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_quiet_period() {
        let fired: Fired = Arc::default();
        let mut debouncer = Debouncer::new(Duration::from_millis(800));

        let generation = debouncer.arm("a", record(&fired, "a"));
        assert_eq!(debouncer.pending_key(), Some("a"));

        tokio::time::sleep(Duration::from_millis(799)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*fired.lock().unwrap(), vec![("a".to_string(), generation)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_last_key() {
        let fired: Fired = Arc::default();
        let mut debouncer = Debouncer::new(Duration::from_millis(800));

        debouncer.arm("a", record(&fired, "a"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.arm("b", record(&fired, "b"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let last = debouncer.arm("c", record(&fired, "c"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*fired.lock().unwrap(), vec![("c".to_string(), last)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let fired: Fired = Arc::default();
        let mut debouncer = Debouncer::new(Duration::from_millis(800));

        debouncer.arm("a", record(&fired, "a"));
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());
        assert!(!debouncer.is_armed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let fired: Fired = Arc::default();
        {
            let mut debouncer = Debouncer::new(Duration::from_millis(800));
            debouncer.arm("a", record(&fired, "a"));
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_if_current() {
        let fired: Fired = Arc::default();
        let mut debouncer = Debouncer::new(Duration::from_millis(800));

        let first = debouncer.arm("a", record(&fired, "a"));
        let second = debouncer.arm("b", record(&fired, "b"));

        assert!(!debouncer.take_if_current(first));
        assert!(debouncer.is_armed());
        assert!(debouncer.take_if_current(second));
        assert!(!debouncer.is_armed());
        assert!(!debouncer.take_if_current(second));
    }
}
