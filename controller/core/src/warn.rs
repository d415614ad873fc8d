use ahash::AHashMap as HashMap;
use std::time::{Duration, Instant};

/// Suppresses repeated warnings of the same category.
///
/// A warning is emitted the first time its key is seen and then at most once
/// per `interval`.
#[derive(Debug)]
pub struct WarnLimiter {
    interval: Duration,
    last: HashMap<String, Instant>,
}

impl WarnLimiter {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    /// Returns true if a warning keyed by `key` should be logged at `now`.
    ///
    /// Keys whose interval has elapsed are forgotten, so only keys warned
    /// about within the last interval are retained.
    pub fn check(&mut self, key: &str, now: Instant) -> bool {
        let interval = self.interval;
        self.last
            .retain(|_, last| now.saturating_duration_since(*last) < interval);

        if self.last.contains_key(key) {
            return false;
        }
        self.last.insert(key.to_string(), now);
        true
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.last.len()
    }
}

impl Default for WarnLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}
