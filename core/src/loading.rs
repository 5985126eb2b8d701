//! Reference-counted, debounced global loading indicator.
//!
//! # Design
//! The indicator is shown as soon as the counter leaves zero. When it drops
//! back to zero a single hide task is scheduled after the debounce delay;
//! any new request before the delay elapses aborts that task, so quick
//! back-to-back requests never make the indicator flicker.
//!
//! Counting is tied to `LoadingGuard`: a request increments on `begin()` and
//! decrements when its guard drops, which happens exactly once whether the
//! request succeeded, failed, or its future was dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const DEFAULT_LOADING_DEBOUNCE: Duration = Duration::from_millis(300);

/// Receives indicator transitions, e.g. a UI spinner.
pub trait LoadingSink: Send + Sync {
    fn show(&self);
    fn hide(&self);
}

/// Default sink: logs the transitions.
#[derive(Debug, Default)]
pub struct TracingLoadingSink;

impl LoadingSink for TracingLoadingSink {
    fn show(&self) {
        info!("showing global loading indicator");
    }

    fn hide(&self) {
        info!("hiding global loading indicator");
    }
}

#[derive(Default)]
struct LoadingState {
    count: usize,
    visible: bool,
    hide_task: Option<JoinHandle<()>>,
    // Bumped every time a hide is scheduled or canceled; a hide task only
    // acts if the epoch it was spawned with is still current.
    epoch: u64,
}

#[derive(Clone)]
pub struct LoadingIndicator {
    state: Arc<Mutex<LoadingState>>,
    debounce: Duration,
    sink: Arc<dyn LoadingSink>,
}

impl LoadingIndicator {
    pub fn new(debounce: Duration, sink: Arc<dyn LoadingSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoadingState::default())),
            debounce,
            sink,
        }
    }

    /// Count one request in; the returned guard counts it out on drop.
    pub fn begin(&self) -> LoadingGuard {
        let mut state = self.lock();
        state.count += 1;
        if let Some(task) = state.hide_task.take() {
            task.abort();
            state.epoch += 1;
            debug!("canceled pending loading hide");
        }
        if !state.visible {
            state.visible = true;
            self.sink.show();
        }
        LoadingGuard {
            indicator: self.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.lock().count
    }

    pub fn is_visible(&self) -> bool {
        self.lock().visible
    }

    fn end(&self) {
        let mut state = self.lock();
        state.count = state.count.saturating_sub(1);
        if state.count > 0 {
            return;
        }

        if let Some(task) = state.hide_task.take() {
            task.abort();
        }
        state.epoch += 1;
        let epoch = state.epoch;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // No runtime to schedule on: hide right away.
            state.visible = false;
            self.sink.hide();
            return;
        };

        let indicator = self.clone();
        state.hide_task = Some(handle.spawn(async move {
            tokio::time::sleep(indicator.debounce).await;
            let mut state = indicator.lock();
            if state.epoch == epoch && state.count == 0 && state.visible {
                state.visible = false;
                state.hide_task = None;
                indicator.sink.hide();
            }
        }));
    }

    fn lock(&self) -> MutexGuard<'_, LoadingState> {
        // The state stays consistent even if a sink panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps one request counted while alive.
#[must_use = "dropping the guard immediately ends the loading span"]
pub struct LoadingGuard {
    indicator: LoadingIndicator,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.indicator.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        shows: AtomicUsize,
        hides: AtomicUsize,
    }

    impl LoadingSink for CountingSink {
        fn show(&self) {
            self.shows.fetch_add(1, Ordering::SeqCst);
        }

        fn hide(&self) {
            self.hides.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn indicator() -> (LoadingIndicator, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink::default());
        (LoadingIndicator::new(DEFAULT_LOADING_DEBOUNCE, sink.clone()), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn shows_immediately_hides_after_debounce() {
        let (loading, sink) = indicator();
        let guard = loading.begin();
        assert!(loading.is_visible());
        assert_eq!(sink.shows.load(Ordering::SeqCst), 1);

        drop(guard);
        assert_eq!(loading.count(), 0);
        assert!(loading.is_visible());

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(loading.is_visible());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!loading.is_visible());
        assert_eq!(sink.hides.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_request_cancels_pending_hide() {
        let (loading, sink) = indicator();
        drop(loading.begin());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let guard = loading.begin();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(loading.is_visible());
        assert_eq!(sink.shows.load(Ordering::SeqCst), 1);
        assert_eq!(sink.hides.load(Ordering::SeqCst), 0);

        drop(guard);
        tokio::time::sleep(Duration::from_millis(301)).await;
        assert_eq!(sink.hides.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_share_one_span() {
        let (loading, sink) = indicator();
        let a = loading.begin();
        let b = loading.begin();
        assert_eq!(loading.count(), 2);

        drop(a);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(loading.is_visible());

        drop(b);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!loading.is_visible());
        assert_eq!(sink.shows.load(Ordering::SeqCst), 1);
        assert_eq!(sink.hides.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hides_immediately_without_runtime() {
        let (loading, sink) = indicator();
        drop(loading.begin());
        assert!(!loading.is_visible());
        assert_eq!(sink.hides.load(Ordering::SeqCst), 1);
    }
}
