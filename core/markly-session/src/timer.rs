//! Deadline timers polled by the owner.
//!
//! Nothing here runs on its own. The owner asks `is_due(now)` from its tick and
//! acts on the answer, so a cancelled timer can never fire late.

/// One-shot deadline that every `arm` pushes back.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay_ms: i64,
    due_at: Option<i64>,
}

impl Debounce {
    pub fn new(delay_ms: i64) -> Self {
        Self {
            delay_ms,
            due_at: None,
        }
    }

    /// (Re)starts the countdown from `now_ms`.
    pub fn arm(&mut self, now_ms: i64) {
        self.due_at = Some(now_ms.saturating_add(self.delay_ms));
    }

    pub fn cancel(&mut self) {
        self.due_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.due_at.is_some()
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.due_at.is_some_and(|due| now_ms >= due)
    }
}

/// Periodic deadline.
#[derive(Debug, Clone)]
pub struct Interval {
    period_ms: i64,
    next_at: i64,
}

impl Interval {
    /// First firing is one full period after `now_ms`.
    pub fn starting_at(now_ms: i64, period_ms: i64) -> Self {
        Self {
            period_ms,
            next_at: now_ms.saturating_add(period_ms),
        }
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        now_ms >= self.next_at
    }

    /// Schedules the next firing one period after `now_ms`.
    ///
    /// Missed periods are not replayed: a tick that arrives late fires once.
    pub fn reschedule(&mut self, now_ms: i64) {
        self.next_at = now_ms.saturating_add(self.period_ms);
    }
}
