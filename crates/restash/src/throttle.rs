//! Trailing-edge throttle for side-effecting actions.
//!
//! Wraps an action so that at most one invocation fires per interval. Calls
//! arriving while a timer is pending only replace the value the timer will
//! fire with, so bursts collapse to a single trailing invocation carrying
//! the latest value.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::sleep;
use tracing::warn;

/// Rate-limiting wrapper around an `Fn(T)` action.
///
/// One pending slot, no queue: the first call in a quiet period schedules the
/// action after `interval`; further calls before it fires overwrite the slot.
/// The very first call is therefore delayed by up to `interval`, and a zero
/// interval still defers to the next scheduler tick rather than running
/// synchronously. Timers run on the ambient tokio runtime; a call made with
/// no runtime present is dropped with a warning instead of panicking.
pub struct Throttle<T> {
    inner: Arc<ThrottleInner<T>>,
    interval: Duration,
}

impl<T> Clone for Throttle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            interval: self.interval,
        }
    }
}

struct ThrottleInner<T> {
    action: Box<dyn Fn(T) + Send + Sync>,
    state: Mutex<ThrottleState<T>>,
}

/// Slot and timer flag, guarded together: the timer task must take the value
/// and clear `pending` in one step, or a call landing between the two would
/// record a value no timer ever picks up.
struct ThrottleState<T> {
    /// Latest value recorded since the pending timer was scheduled.
    value: Option<T>,
    /// Whether a timer is currently scheduled.
    pending: bool,
}

impl<T: Send + 'static> Throttle<T> {
    /// Wrap `action` so it fires at most once per `interval`.
    pub fn new(interval: Duration, action: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                action: Box::new(action),
                state: Mutex::new(ThrottleState {
                    value: None,
                    pending: false,
                }),
            }),
            interval,
        }
    }

    /// Record `value` and schedule the action if no timer is pending.
    pub fn call(&self, value: T) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.value = Some(value);
        if state.pending {
            // The scheduled timer will pick up the new value.
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            // Best-effort: without a runtime there is no timer to defer to.
            state.value = None;
            warn!("no tokio runtime, dropping throttled call");
            return;
        };
        state.pending = true;
        drop(state);

        let inner = Arc::clone(&self.inner);
        let interval = self.interval;
        handle.spawn(async move {
            sleep(interval).await;
            let value = {
                let mut state = inner
                    .state
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                state.pending = false;
                state.value.take()
            };
            if let Some(value) = value {
                (inner.action)(value);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (Arc<Mutex<Vec<u32>>>, Throttle<u32>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let throttle = Throttle::new(Duration::from_millis(30), move |value| {
            sink.lock().unwrap().push(value);
        });
        (seen, throttle)
    }

    #[tokio::test]
    async fn burst_collapses_to_last_call() {
        let (seen, throttle) = collector();

        for value in 1..=5 {
            throttle.call(value);
        }
        sleep(Duration::from_millis(100)).await;

        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn separate_bursts_each_fire() {
        let (seen, throttle) = collector();

        throttle.call(1);
        throttle.call(2);
        sleep(Duration::from_millis(80)).await;

        throttle.call(3);
        sleep(Duration::from_millis(80)).await;

        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn zero_interval_still_defers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let throttle = Throttle::new(Duration::ZERO, move |value: u32| {
            sink.lock().unwrap().push(value);
        });

        throttle.call(7);
        // Not synchronous: nothing has fired yet.
        assert!(seen.lock().unwrap().is_empty());

        sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn no_call_means_no_fire() {
        let (seen, _throttle) = collector();
        sleep(Duration::from_millis(60)).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn call_landing_near_fire_boundary_is_never_lost() {
        // A call racing the timer's take-and-clear must either be carried by
        // that fire or schedule its own timer; the trailing write always
        // carries the latest value.
        let last = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last);
        let throttle = Throttle::new(Duration::from_millis(2), move |value: u32| {
            *sink.lock().unwrap() = Some(value);
        });

        for round in 0..100u32 {
            throttle.call(round * 2);
            // Land a second call right around the timer firing.
            sleep(Duration::from_millis(2)).await;
            throttle.call(round * 2 + 1);

            sleep(Duration::from_millis(12)).await;
            assert_eq!(*last.lock().unwrap(), Some(round * 2 + 1));
        }
    }

    #[test]
    fn call_without_runtime_is_dropped_not_panicked() {
        let (seen, throttle) = collector();
        throttle.call(1);
        assert!(seen.lock().unwrap().is_empty());
    }
}
