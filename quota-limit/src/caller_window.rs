use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::Reason;

// Expired keys are swept once the map grows past this many entries, at most
// once per period
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: usize,
    expires: Instant,
}

#[derive(Debug)]
struct Callers {
    entries: HashMap<String, Entry>,
    next_sweep: Instant,
}

/// A per-caller window counter.
///
/// Every key has its own counter. A key's counter is created at zero with an
/// expiry one `period` away. A request is rejected while the counter is above
/// `limit`; otherwise it is admitted, the counter is incremented and the expiry
/// is pushed out to one `period` from now. Rejections leave the expiry alone,
/// so a caller that stops sending is forgiven one `period` after its last
/// admitted request.
///
/// Because rejection only starts *above* `limit`, `limit + 1` requests are
/// admitted per window.
#[derive(Debug)]
pub struct CallerWindow {
    limit: usize,
    period: Duration,
    callers: Mutex<Callers>,
}

impl CallerWindow {
    /// Creates a new `CallerWindow`.
    ///
    /// # Arguments
    ///
    /// * `limit` - The per-caller count above which requests are rejected.
    /// * `period` - How long a caller's counter lives after its last admission.
    pub fn new(limit: NonZeroUsize, period: Duration) -> Self {
        Self {
            limit: limit.get(),
            period,
            callers: Mutex::new(Callers {
                entries: HashMap::new(),
                next_sweep: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Attempts to admit one request for `key`.
    pub fn process(&self, key: &str) -> ControlFlow<Reason> {
        let now = Instant::now();
        let mut callers = self.callers.lock();

        if callers.entries.len() >= SWEEP_THRESHOLD && now >= callers.next_sweep {
            callers.entries.retain(|_, entry| entry.expires > now);
            callers.next_sweep = now + self.period;
            debug!(tracked = callers.entries.len(), "swept expired callers");
        }

        let fresh = Entry {
            count: 0,
            expires: now + self.period,
        };
        let entry = callers.entries.entry(key.to_owned()).or_insert(fresh);
        if entry.expires <= now {
            *entry = fresh;
        }

        if entry.count > self.limit {
            debug!(key, limit = self.limit, "caller limit exceeded");
            return ControlFlow::Break(Reason::Overloaded {
                retry_after: entry.expires.duration_since(now),
            });
        }

        entry.count += 1;
        entry.expires = now + self.period;
        ControlFlow::Continue(())
    }

    /// Number of callers currently tracked, including expired ones not yet swept.
    pub fn tracked(&self) -> usize {
        self.callers.lock().entries.len()
    }
}
