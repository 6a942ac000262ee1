//! Ack-clocked congestion control. The shared state and the event gating
//! live here; the per-law update rules live in their own files.

/// Window tracking by bandwidth estimate
pub(crate) mod nola;

/// Delay-based queue steering
pub(crate) mod vegas;

/// Threshold backoff
pub(crate) mod westwood;

use log::debug;

use crate::config::CongestionAlgorithm;
use crate::rtt::RttEstimator;

/// Minimum number of acks before bandwidth can be estimated; also scales the
/// congestion window floor.
pub(crate) const CC_BWE_MIN: i32 = 5;

/// The law re-runs once per this many full windows of acks.
const CC_CWND_INC_RATE: i32 = 5;

/// Slow-start growth, percent of the current window.
const CC_CWND_INC_PCT_SS: i32 = 50;

/// The first law run happens on this ack.
const INITIAL_CC_EVENT_GAP: i32 = 10;

/// Per-law tunables, derived from the ack granularity at path creation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CcParams {
    pub(crate) sendme_inc: i32,
    pub(crate) cwnd_inc: i32,
    pub(crate) cwnd_inc_rate: i32,
    pub(crate) cwnd_inc_pct_ss: i32,
    pub(crate) nola_overshoot: i32,
    pub(crate) westwood_rtt_thresh: i32,
    pub(crate) westwood_min_backoff: bool,
    pub(crate) westwood_cwnd_m: f64,
    pub(crate) westwood_rtt_m: f64,
    pub(crate) vegas_alpha: i32,
    pub(crate) vegas_beta: i32,
    pub(crate) vegas_gamma: i32,
    pub(crate) vegas_delta: i32,
}

impl CcParams {
    pub(crate) fn from_increment(inc: i32) -> Self {
        Self {
            sendme_inc: inc,
            cwnd_inc: inc,
            cwnd_inc_rate: CC_CWND_INC_RATE,
            cwnd_inc_pct_ss: CC_CWND_INC_PCT_SS,
            nola_overshoot: 100,
            westwood_rtt_thresh: 33,
            westwood_min_backoff: false,
            westwood_cwnd_m: 0.75,
            westwood_rtt_m: 0.5,
            vegas_alpha: 5 * inc,
            vegas_beta: 6 * inc,
            vegas_gamma: 6 * inc,
            vegas_delta: 8 * inc,
        }
    }
}

/// Congestion window state shared by all laws.
#[derive(Debug)]
pub(crate) struct CongestionControl {
    pub(crate) algorithm: CongestionAlgorithm,
    pub(crate) cwnd: i32,
    pub(crate) cwnd_min: i32,
    pub(crate) cwnd_max: i32,
    pub(crate) in_slow_start: bool,
    pub(crate) next_cc_event: i32,
    pub(crate) params: CcParams,
}

impl CongestionControl {
    pub(crate) fn new(algorithm: CongestionAlgorithm, cwnd_init: i32, increment: i32) -> Self {
        Self {
            algorithm,
            cwnd: cwnd_init,
            cwnd_min: (CC_BWE_MIN * increment).max(increment),
            cwnd_max: i32::MAX,
            in_slow_start: true,
            next_cc_event: INITIAL_CC_EVENT_GAP,
            params: CcParams::from_increment(increment),
        }
    }

    /// One acknowledgement tick. The law itself only runs when the event
    /// gate hits zero; every run re-arms the gate from the new window.
    pub(crate) fn on_ack(&mut self, bdp: f64, conn_blocked: bool, rtt: &mut RttEstimator) {
        if self.next_cc_event > 0 {
            self.next_cc_event -= 1;
            if self.next_cc_event > 0 {
                return;
            }
        }
        match self.algorithm {
            CongestionAlgorithm::Nola => nola::update(self, bdp, conn_blocked),
            CongestionAlgorithm::Westwood => westwood::update(self, bdp, conn_blocked, rtt),
            CongestionAlgorithm::Vegas => vegas::update(self, bdp, conn_blocked),
        }
        self.cwnd = self.cwnd.clamp(self.cwnd_min, self.cwnd_max);
        self.next_cc_event = if self.in_slow_start && self.algorithm == CongestionAlgorithm::Vegas
        {
            self.cwnd / self.params.sendme_inc
        } else {
            self.cwnd / (self.params.cwnd_inc_rate * self.params.sendme_inc)
        };
        debug!(
            "[cc] {:?}: cwnd {} (slow start: {}), next event in {} acks",
            self.algorithm, self.cwnd, self.in_slow_start, self.next_cc_event
        );
    }
}
