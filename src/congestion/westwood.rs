use super::CongestionControl;
use crate::rtt::RttEstimator;

/// Grow while the smoothed RTT stays below a blend of the lifetime extremes;
/// otherwise back the window off against the BDP and decay the maximum so a
/// single spike cannot poison the threshold forever.
pub(super) fn update(
    cc: &mut CongestionControl,
    bdp: f64,
    conn_blocked: bool,
    rtt: &mut RttEstimator,
) {
    let p = cc.params;
    let thresh = f64::from(p.westwood_rtt_thresh);
    let cutoff = ((100.0 - thresh) * rtt.min() + thresh * rtt.max()) / 100.0;
    if rtt.current() < cutoff || conn_blocked {
        if cc.in_slow_start {
            cc.cwnd += cc.cwnd * p.cwnd_inc_pct_ss / 100;
        } else {
            cc.cwnd += p.cwnd_inc;
        }
    } else {
        let backoff = f64::from(cc.cwnd) * p.westwood_cwnd_m;
        cc.cwnd = if p.westwood_min_backoff {
            backoff.min(bdp) as i32
        } else {
            backoff.max(bdp) as i32
        };
        cc.in_slow_start = false;
        rtt.backoff_max(p.westwood_rtt_m);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CongestionAlgorithm;

    fn low_rtt() -> RttEstimator {
        // min 0.1, max 0.5, smoothed 0.16 < cutoff 0.232
        let mut rtt = RttEstimator::new();
        rtt.record(0.5, 2);
        rtt.record(0.1, 2);
        rtt
    }

    fn high_rtt() -> RttEstimator {
        // min 0.1, max 0.5, smoothed 0.416 >= cutoff 0.232
        let mut rtt = RttEstimator::new();
        rtt.record(0.1, 2);
        rtt.record(0.5, 2);
        rtt
    }

    #[test]
    fn grows_under_cutoff() {
        let mut rtt = low_rtt();
        let mut cc = CongestionControl::new(CongestionAlgorithm::Westwood, 100, 10);
        update(&mut cc, 0.0, false, &mut rtt);
        // slow start grows by half the window
        assert_eq!(cc.cwnd, 150);
        assert!(cc.in_slow_start);

        cc.in_slow_start = false;
        update(&mut cc, 0.0, false, &mut rtt);
        assert_eq!(cc.cwnd, 160);
    }

    #[test]
    fn blocked_channel_still_grows() {
        let mut rtt = high_rtt();
        let mut cc = CongestionControl::new(CongestionAlgorithm::Westwood, 100, 10);
        cc.in_slow_start = false;
        update(&mut cc, 0.0, true, &mut rtt);
        assert_eq!(cc.cwnd, 110);
    }

    #[test]
    fn backs_off_and_decays_max() {
        let mut rtt = high_rtt();
        let mut cc = CongestionControl::new(CongestionAlgorithm::Westwood, 100, 10);
        update(&mut cc, 80.0, false, &mut rtt);
        // max(0.75 * 100, bdp 80) = 80, exits slow start
        assert_eq!(cc.cwnd, 80);
        assert!(!cc.in_slow_start);
        assert!((rtt.max() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn min_backoff_takes_the_smaller() {
        let mut rtt = high_rtt();
        let mut cc = CongestionControl::new(CongestionAlgorithm::Westwood, 100, 10);
        cc.params.westwood_min_backoff = true;
        update(&mut cc, 80.0, false, &mut rtt);
        assert_eq!(cc.cwnd, 75);
    }
}
