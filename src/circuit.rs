use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};

use crate::config::{BdpEstimator, Config, FlowControl};
use crate::congestion::{CongestionControl, CC_BWE_MIN};
use crate::rtt::{self, RttEstimator};
use crate::{ConnId, Direction};

/// Samples of the sendme BDP estimator are smoothed over this percentage of
/// the window, same shape as the RTT smoothing.
const CC_EWMA_CWND_PCT: i32 = 50;

/// Upper bound of the smoothing window, in ack units.
const CC_EWMA_MAX: i32 = 10;

/// One path through this relay: a pair of connections with a cell queue
/// toward each, plus the flow-control state that paces the edge feeding it.
pub struct Circuit {
    id: u16,
    n_conn: ConnId,
    p_conn: ConnId,
    n_queue: VecDeque<Bytes>,
    p_queue: VecDeque<Bytes>,
    /// Ring successors per connection, threading the circular service list.
    pub(crate) next_on_n: Option<u16>,
    pub(crate) next_on_p: Option<u16>,

    mode: FlowControl,
    window_start: i32,
    window_increment: i32,
    package_window: i32,
    deliver_window: i32,

    estimator: BdpEstimator,
    /// Total data cells packaged onto this path.
    cells_sent: u64,
    inflight: i32,
    num_acks: u32,
    /// Departure time of every `window_increment`-th cell, keyed by its
    /// ordinal.
    sent_stamps: HashMap<u64, Duration>,
    /// Arrival time of every ack, keyed by its ordinal.
    ack_stamps: HashMap<u32, Duration>,
    ack_delta_sum: f64,
    sendme_bdp: Vec<f64>,
    bwe_min: u32,

    pub(crate) cc: CongestionControl,
    pub(crate) rtt: RttEstimator,
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("package_window", &self.package_window)
            .field("deliver_window", &self.deliver_window)
            .field("cwnd", &self.cc.cwnd)
            .field("inflight", &self.inflight)
            .field("num_acks", &self.num_acks)
            .finish_non_exhaustive()
    }
}

impl Circuit {
    pub(crate) fn new(id: u16, n_conn: ConnId, p_conn: ConnId, config: &Config) -> Self {
        let cc = CongestionControl::new(
            config.algorithm,
            config.window_start,
            config.window_increment,
        );
        let bwe_min = CC_BWE_MIN.min(cc.cwnd_min / config.window_increment) as u32;
        Self {
            id,
            n_conn,
            p_conn,
            n_queue: VecDeque::new(),
            p_queue: VecDeque::new(),
            next_on_n: None,
            next_on_p: None,
            mode: config.flow_control,
            window_start: config.window_start,
            window_increment: config.window_increment,
            package_window: config.window_start,
            deliver_window: config.window_start,
            estimator: config.estimator,
            cells_sent: 0,
            inflight: 0,
            num_acks: 0,
            sent_stamps: HashMap::new(),
            ack_stamps: HashMap::new(),
            ack_delta_sum: 0.0,
            sendme_bdp: Vec::new(),
            bwe_min,
            cc,
            rtt: RttEstimator::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn mode(&self) -> FlowControl {
        self.mode
    }

    pub fn cwnd(&self) -> i32 {
        self.cc.cwnd
    }

    pub fn inflight(&self) -> i32 {
        self.inflight
    }

    pub fn package_window(&self) -> i32 {
        self.package_window
    }

    pub fn deliver_window(&self) -> i32 {
        self.deliver_window
    }

    pub fn num_acks(&self) -> u32 {
        self.num_acks
    }

    pub fn in_slow_start(&self) -> bool {
        self.cc.in_slow_start
    }

    /// The connection a cell traveling `direction` is heading to.
    pub(crate) fn conn(&self, direction: Direction) -> ConnId {
        match direction {
            Direction::Outbound => self.n_conn,
            Direction::Inbound => self.p_conn,
        }
    }

    pub(crate) fn opposite_conn(&self, direction: Direction) -> ConnId {
        self.conn(direction.opposite())
    }

    /// Travel direction of cells this circuit sends over `conn`.
    pub(crate) fn direction_to(&self, conn: ConnId) -> Direction {
        if conn == self.n_conn {
            Direction::Outbound
        } else {
            Direction::Inbound
        }
    }

    pub(crate) fn opposite_direction_of(&self, conn: ConnId) -> Direction {
        self.direction_to(conn).opposite()
    }

    pub(crate) fn queue_mut(&mut self, direction: Direction) -> &mut VecDeque<Bytes> {
        match direction {
            Direction::Outbound => &mut self.n_queue,
            Direction::Inbound => &mut self.p_queue,
        }
    }

    pub(crate) fn queue_len(&self, direction: Direction) -> usize {
        match direction {
            Direction::Outbound => self.n_queue.len(),
            Direction::Inbound => self.p_queue.len(),
        }
    }

    pub(crate) fn next_circuit(&self, conn: ConnId) -> Option<u16> {
        if conn == self.n_conn {
            self.next_on_n
        } else {
            self.next_on_p
        }
    }

    pub(crate) fn set_next_circuit(&mut self, conn: ConnId, circ: Option<u16>) {
        if conn == self.n_conn {
            self.next_on_n = circ;
        } else {
            self.next_on_p = circ;
        }
    }

    /// Sender-side bookkeeping for one packaged data cell. Returns whether
    /// the edge feeding this path must stop reading.
    pub(crate) fn on_cell_packaged(&mut self, now: Duration) -> bool {
        self.cells_sent += 1;
        match self.mode {
            FlowControl::LegacyWindow => {
                self.package_window -= 1;
                trace!(
                    "[circuit {}] packaged cell, package window {}",
                    self.id,
                    self.package_window
                );
                self.package_window <= 0
            }
            FlowControl::DynamicCwnd => {
                self.inflight += 1;
                if self.cells_sent % self.cc.params.sendme_inc as u64 == 0 {
                    self.sent_stamps.insert(self.cells_sent, now);
                }
                self.cc.cwnd - self.inflight <= 0
            }
        }
    }

    /// Receiver-side bookkeeping for one cell handed to an edge. Returns
    /// whether an ack must be queued back.
    pub(crate) fn on_cell_delivered(&mut self) -> bool {
        self.deliver_window -= 1;
        let threshold = match self.mode {
            FlowControl::LegacyWindow => self.window_start - self.window_increment,
            FlowControl::DynamicCwnd => self.window_start - self.cc.params.sendme_inc,
        };
        if self.deliver_window <= threshold {
            self.deliver_window = (self.deliver_window + self.window_increment).min(self.window_start);
            return true;
        }
        false
    }

    /// Legacy ack: restore a window increment, capped at the start value.
    pub(crate) fn inc_package_window(&mut self) {
        self.package_window = (self.package_window + self.window_increment).min(self.window_start);
        debug!(
            "[circuit {}] ack, package window {}",
            self.id, self.package_window
        );
    }

    /// Dynamic ack: one RTT sample, then a BDP estimate and a law run once
    /// enough acks have been seen.
    pub(crate) fn on_ack(&mut self, now: Duration, edge_blocked: bool, direction: Direction) {
        self.num_acks += 1;
        self.inflight -= self.cc.params.sendme_inc;
        debug_assert!(self.inflight >= 0, "acked more cells than were sent");
        self.ack_stamps.insert(self.num_acks, now);
        self.record_rtt(now);
        if self.num_acks >= self.bwe_min {
            let bdp = self.estimate_bdp(edge_blocked, direction);
            let Circuit { cc, rtt, .. } = self;
            cc.on_ack(bdp, edge_blocked, rtt);
        }
        debug!(
            "[circuit {}] ack {}, inflight {}, cwnd {}",
            self.id, self.num_acks, self.inflight, self.cc.cwnd
        );
    }

    /// # Panics
    /// Panics when the acked cell was never stamped or the sample is not
    /// positive; both mean the ack stream desynced from the cell stream.
    fn record_rtt(&mut self, now: Duration) {
        let pckno = u64::from(self.num_acks) * self.cc.params.sendme_inc as u64;
        let sent = *self
            .sent_stamps
            .get(&pckno)
            .unwrap_or_else(|| panic!("circuit {}: no departure stamp for cell {pckno}", self.id));
        let sample = now.saturating_sub(sent).as_secs_f64();
        let window = self.smoothing_window();
        self.rtt.record(sample, window);
    }

    fn smoothing_window(&self) -> usize {
        rtt::smoothing_window(
            self.cc.cwnd,
            self.cc.params.sendme_inc,
            CC_EWMA_CWND_PCT,
            CC_EWMA_MAX,
        )
    }

    pub(crate) fn estimate_bdp(&mut self, edge_blocked: bool, direction: Direction) -> f64 {
        match self.estimator {
            BdpEstimator::Sendme => self.bdp_sendme(),
            BdpEstimator::Cwnd => self.bdp_cwnd(),
            BdpEstimator::Inflight => self.bdp_inflight(direction),
            BdpEstimator::Piecewise => {
                let by_sendme = self.bdp_sendme();
                if edge_blocked {
                    self.bdp_inflight(direction).min(by_sendme)
                } else {
                    by_sendme.max(self.bdp_cwnd())
                }
            }
        }
    }

    /// Bandwidth from ack spacing times the minimum RTT. With fewer than two
    /// acks the spacing degenerates to the arrival time of the only one.
    fn bdp_sendme(&mut self) -> f64 {
        let inc = f64::from(self.cc.params.sendme_inc);
        let t_last = self.ack_stamps[&self.num_acks].as_secs_f64();
        let bwe = if self.num_acks < 2 {
            inc / t_last
        } else {
            let t_prev = self.ack_stamps[&(self.num_acks - 1)].as_secs_f64();
            self.ack_delta_sum += t_last - t_prev;
            f64::from(self.num_acks - 1) * inc / self.ack_delta_sum
        };
        let raw = bwe * self.rtt.min();
        self.sendme_bdp.push(raw);
        let window = self.smoothing_window();
        if self.sendme_bdp.len() > window {
            rtt::ewma_n(&self.sendme_bdp, window, f64::from(CC_EWMA_CWND_PCT))
        } else {
            raw
        }
    }

    fn bdp_cwnd(&self) -> f64 {
        f64::from(self.cc.cwnd) * self.rtt.min() / self.rtt.current()
    }

    fn bdp_inflight(&self, direction: Direction) -> f64 {
        f64::from(self.inflight - self.queue_len(direction) as i32) * self.rtt.min()
            / self.rtt.current()
    }
}
