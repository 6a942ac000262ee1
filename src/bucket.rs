use std::time::Duration;

/// Buckets are topped up on this fixed cadence by the dispatcher.
pub const REFILL_INTERVAL: Duration = Duration::from_millis(10);

const REFILLS_PER_SECOND: i64 = 1000 / REFILL_INTERVAL.as_millis() as i64;

/// Byte-granular token bucket. The level may dip below zero when a transfer
/// overshoots; the deficit is paid back by later refills.
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    level: i64,
    rate: i64,
    burst: i64,
}

impl TokenBucket {
    /// `rate` is bytes per second, `burst` caps the level. Starts full.
    pub fn new(rate: i64, burst: i64) -> Self {
        Self {
            level: burst,
            rate,
            burst,
        }
    }

    pub fn available(&self) -> i64 {
        self.level
    }

    pub fn decrement(&mut self, n: u64) {
        self.level -= n as i64;
    }

    /// Add one interval's worth of tokens, capped at the burst. Returns the
    /// level before the refill so callers can detect an empty bucket coming
    /// back to life.
    pub fn refill(&mut self) -> i64 {
        let before = self.level;
        self.level = (self.level + self.rate / REFILLS_PER_SECOND).min(self.burst);
        before
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn starts_full_and_caps_at_burst() {
        let mut bucket = TokenBucket::new(100_000, 50_000);
        assert_eq!(bucket.available(), 50_000);
        assert_eq!(bucket.refill(), 50_000);
        assert_eq!(bucket.available(), 50_000);
    }

    #[test]
    fn refill_adds_one_interval() {
        let mut bucket = TokenBucket::new(100_000, 50_000);
        bucket.decrement(50_000);
        assert_eq!(bucket.available(), 0);
        let before = bucket.refill();
        assert_eq!(before, 0);
        assert_eq!(bucket.available(), 1000);
    }

    #[test]
    fn deficit_is_paid_back() {
        let mut bucket = TokenBucket::new(100_000, 50_000);
        bucket.decrement(50_512);
        assert_eq!(bucket.available(), -512);
        bucket.refill();
        assert_eq!(bucket.available(), 488);
    }
}
