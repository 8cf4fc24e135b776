use std::fmt::Debug;

use chrono::Local;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;

/// Source of "today" for a [`DailyQuota`].
pub trait DayClock: Debug {
    fn today(&self) -> NaiveDate;
}

/// The local calendar day of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDayClock;

impl DayClock for LocalDayClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug)]
struct DayState {
    count: u32,
    current_day: NaiveDate,
}

/// A coarse per-calendar-day call budget.
///
/// The counter is reset lazily: the first call that observes a new day resets
/// it and is admitted without being counted. Every other call increments the
/// counter and is admitted while the counter stays below `limit`.
///
/// The rollover and the increment happen under one lock, so two callers can
/// never both observe a stale day and lose an update.
#[derive(Debug)]
pub struct DailyQuota<C = LocalDayClock> {
    limit: u32,
    state: Mutex<DayState>,
    clock: C,
}

impl DailyQuota<LocalDayClock> {
    /// Creates a new `DailyQuota` using the local calendar day.
    ///
    /// # Arguments
    ///
    /// * `limit` - The call budget for one calendar day.
    pub fn new(limit: u32) -> Self {
        Self::with_clock(limit, LocalDayClock)
    }
}

impl<C: DayClock> DailyQuota<C> {
    pub fn with_clock(limit: u32, clock: C) -> Self {
        let current_day = clock.today();
        Self {
            limit,
            state: Mutex::new(DayState {
                count: 0,
                current_day,
            }),
            clock,
        }
    }

    /// Decide whether one more call fits in today's budget.
    pub fn allow_request(&self) -> bool {
        let today = self.clock.today();
        let mut state = self.state.lock();

        if today != state.current_day {
            info!(
                previous = %state.current_day,
                today = %today,
                used = state.count,
                "daily quota rolled over"
            );
            state.count = 0;
            state.current_day = today;
            return true;
        }

        state.count = state.count.saturating_add(1);
        let allowed = state.count < self.limit;
        if !allowed {
            debug!(limit = self.limit, count = state.count, "daily quota exhausted");
        }
        allowed
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Calls counted against the current day.
    pub fn used(&self) -> u32 {
        self.state.lock().count
    }
}
