//! Round-trip estimation over acknowledgement arrivals. Raw samples are kept
//! for the lifetime of a path; the smoothed value is a recursive EWMA over a
//! window derived from the congestion window.

/// Minimum sentinel until the first sample arrives, in seconds.
pub(crate) const INITIAL_MIN_RTT: f64 = 100.0;

/// Weight of the newest sample in the smoothing recursion.
const EWMA_DECAY: f64 = 0.8;

#[derive(Debug)]
pub(crate) struct RttEstimator {
    raw: Vec<f64>,
    min: f64,
    max: f64,
    current: f64,
}

impl RttEstimator {
    pub(crate) fn new() -> Self {
        Self {
            raw: Vec::new(),
            min: INITIAL_MIN_RTT,
            max: 0.0,
            current: 0.0,
        }
    }

    /// Record one sample (seconds) and refresh the smoothed value over the
    /// last `window` raw samples.
    ///
    /// # Panics
    /// Panics on a non-positive sample: an ack cannot precede its cells.
    pub(crate) fn record(&mut self, sample: f64, window: usize) -> f64 {
        assert!(sample > 0.0, "non-positive rtt sample {sample}");
        self.raw.push(sample);
        if sample < self.min {
            self.min = sample;
        }
        if sample > self.max {
            self.max = sample;
        }
        self.current = if self.raw.len() >= window {
            ewma_decay(&self.raw, window)
        } else {
            sample
        };
        self.current
    }

    pub(crate) fn current(&self) -> f64 {
        self.current
    }

    pub(crate) fn min(&self) -> f64 {
        self.min
    }

    pub(crate) fn max(&self) -> f64 {
        self.max
    }

    pub(crate) fn samples(&self) -> &[f64] {
        &self.raw
    }

    /// Pull the lifetime maximum toward the minimum by factor `m`.
    pub(crate) fn backoff_max(&mut self, m: f64) {
        self.max = self.min + m * (self.max - self.min);
    }
}

/// Recursive EWMA over the last `n` values, seeded from the oldest of them;
/// each step weighs the newer value by [`EWMA_DECAY`].
fn ewma_decay(values: &[f64], n: usize) -> f64 {
    let tail = &values[values.len() - n..];
    let mut acc = EWMA_DECAY * tail[0];
    for v in &tail[1..] {
        acc = EWMA_DECAY * v + (1.0 - EWMA_DECAY) * acc;
    }
    acc
}

/// N-EWMA in the standard `2x/(N+1) + (N-1)/(N+1)·prev` form over the last
/// `n` values.
pub(crate) fn ewma_n(values: &[f64], n: usize, big_n: f64) -> f64 {
    let tail = &values[values.len() - n..];
    let mut acc = 2.0 * tail[0] / (big_n + 1.0);
    for v in &tail[1..] {
        acc = 2.0 * v / (big_n + 1.0) + (big_n - 1.0) * acc / (big_n + 1.0);
    }
    acc
}

/// Smoothing window: a percentage of the congestion window measured in ack
/// units, clamped to `[2, max]`.
pub(crate) fn smoothing_window(cwnd: i32, sendme_inc: i32, pct: i32, max: i32) -> usize {
    let w = (f64::from(cwnd) / f64::from(sendme_inc) * f64::from(pct) / 100.0).round() as i64;
    w.clamp(2, i64::from(max)) as usize
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn min_max_bound_every_sample() {
        let mut rtt = RttEstimator::new();
        for sample in [0.3, 0.1, 0.7, 0.2, 0.5] {
            rtt.record(sample, 3);
            for s in rtt.samples() {
                assert!(rtt.min() <= *s && *s <= rtt.max());
            }
        }
        assert_close(rtt.min(), 0.1);
        assert_close(rtt.max(), 0.7);
    }

    #[test]
    fn current_is_raw_until_window_fills() {
        let mut rtt = RttEstimator::new();
        assert_close(rtt.record(0.4, 3), 0.4);
        assert_close(rtt.record(0.2, 3), 0.2);
        // window of 3 filled: 0.8*0.2 + 0.2*(0.8*0.2 + 0.2*(0.8*0.4))
        let smoothed = rtt.record(0.2, 3);
        assert_close(smoothed, 0.8 * 0.2 + 0.2 * (0.8 * 0.2 + 0.2 * (0.8 * 0.4)));
        assert_close(rtt.current(), smoothed);
    }

    #[test]
    fn ewma_weighs_newest_most() {
        // tail [2.0, 3.0]: 0.8*3 + 0.2*(0.8*2)
        assert_close(ewma_decay(&[1.0, 2.0, 3.0], 2), 2.72);
    }

    #[test]
    fn n_ewma_matches_recursion() {
        let values = [10.0, 20.0];
        let n_big = 3.0;
        let expect = 2.0 * 20.0 / 4.0 + (2.0 / 4.0) * (2.0 * 10.0 / 4.0);
        assert_close(ewma_n(&values, 2, n_big), expect);
    }

    #[test]
    fn smoothing_window_clamps() {
        assert_eq!(smoothing_window(500, 50, 50, 10), 5);
        assert_eq!(smoothing_window(50, 50, 50, 10), 2);
        assert_eq!(smoothing_window(5000, 50, 50, 10), 10);
        // rounds, does not truncate
        assert_eq!(smoothing_window(460, 50, 50, 10), 5);
    }

    #[test]
    fn backoff_pulls_max_toward_min() {
        let mut rtt = RttEstimator::new();
        rtt.record(0.1, 2);
        rtt.record(0.5, 2);
        rtt.backoff_max(0.5);
        assert_close(rtt.max(), 0.3);
    }

    #[test]
    #[should_panic(expected = "non-positive rtt")]
    fn zero_sample_panics() {
        let mut rtt = RttEstimator::new();
        rtt.record(0.0, 2);
    }
}
