use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio::time::sleep;
use tracing::debug;

/// A Sliding Window Log implementation.
///
/// It records the instant of every admitted call and admits a new call only
/// while fewer than `max_in_flight` recorded instants fall inside the trailing
/// `window`. Expired instants are evicted lazily on each acquisition.
///
/// When the window is full the caller is suspended until the oldest instant
/// expires. The wait happens while the log is locked, so waiters are served one
/// at a time and no two callers ever compute a wait concurrently.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_in_flight: usize,
    window: Duration,
    /// Admission instants, oldest first
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Creates a new `SlidingWindowLimiter`.
    ///
    /// # Arguments
    ///
    /// * `max_in_flight` - The maximum number of admissions within any trailing window.
    /// * `window` - The length of the trailing window.
    pub fn new(max_in_flight: NonZeroUsize, window: Duration) -> Self {
        Self {
            max_in_flight: max_in_flight.get(),
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Suspends until a slot is available, then records the acquisition.
    pub async fn acquire(&self) {
        let mut timestamps = self.timestamps.lock().await;

        let mut now = Instant::now();
        self.evict(&mut timestamps, now);

        if timestamps.len() >= self.max_in_flight
            && let Some(&oldest) = timestamps.front()
        {
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            if !wait.is_zero() {
                debug!(?wait, in_flight = timestamps.len(), "window full, waiting");
                sleep(wait).await;
            }
            now = Instant::now();
            self.evict(&mut timestamps, now);
        }

        timestamps.push_back(now);
    }

    /// Number of admissions currently inside the window.
    pub async fn in_flight(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        self.evict(&mut timestamps, Instant::now());
        timestamps.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            timestamps.pop_front();
        }
    }
}
