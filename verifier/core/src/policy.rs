use std::time::Duration;

/// Governs how a single sample is retried.
///
/// Every sample gets one initial attempt plus up to `max_retries` more,
/// separated by a fixed `delay`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

/// Governs a bounded readiness poll.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

// === impl RetryPolicy ===

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

// === impl PollPolicy ===

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// The number of polls to issue. At least one poll is always made.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(1))
    }
}
