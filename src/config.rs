use std::str::FromStr;

use crate::errors::Error;

/// Flow-control discipline of a path, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// Fixed package/deliver windows.
    LegacyWindow,
    /// Congestion window fed by RTT/BDP estimation.
    DynamicCwnd,
}

/// Congestion-control law, effective in dynamic mode only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionAlgorithm {
    Nola,
    Westwood,
    Vegas,
}

impl FromStr for CongestionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nola" => Ok(CongestionAlgorithm::Nola),
            "westwood" => Ok(CongestionAlgorithm::Westwood),
            "vegas" => Ok(CongestionAlgorithm::Vegas),
            _ => Err(Error::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Bandwidth-delay-product estimator, effective in dynamic mode only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BdpEstimator {
    /// Ack spacing times minimum RTT.
    Sendme,
    /// Window scaled by RTT ratio.
    Cwnd,
    /// Unacked cells minus queued cells, scaled by RTT ratio.
    Inflight,
    /// Blend of the other three keyed on the blocked state.
    Piecewise,
}

impl FromStr for BdpEstimator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sendme" => Ok(BdpEstimator::Sendme),
            "cwnd" => Ok(BdpEstimator::Cwnd),
            "inflight" => Ok(BdpEstimator::Inflight),
            "piecewise" => Ok(BdpEstimator::Piecewise),
            _ => Err(Error::UnknownEstimator(s.to_string())),
        }
    }
}

/// Node and path configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Initial window in cells, both the legacy windows and the congestion
    /// window start here.
    pub(crate) window_start: i32,
    /// Cells per flow-control acknowledgement.
    pub(crate) window_increment: i32,
    pub(crate) flow_control: FlowControl,
    pub(crate) algorithm: CongestionAlgorithm,
    pub(crate) estimator: BdpEstimator,
    /// Token bucket rate, bytes per second.
    pub(crate) bandwidth_rate: i64,
    /// Token bucket burst, bytes.
    pub(crate) bandwidth_burst: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            window_start: 1000,
            window_increment: 100,
            flow_control: FlowControl::DynamicCwnd,
            algorithm: CongestionAlgorithm::Nola,
            estimator: BdpEstimator::Piecewise,
            bandwidth_rate: 1_500_000,
            bandwidth_burst: 1_500_000,
        }
    }

    /// Set the initial window, in cells
    /// The default value is 1000
    pub fn window_start(mut self, cells: i32) -> Self {
        self.window_start = cells;
        self
    }

    /// Set the ack granularity, in cells
    /// The default value is 100
    pub fn window_increment(mut self, cells: i32) -> Self {
        self.window_increment = cells;
        self
    }

    /// Set the flow-control discipline
    /// The default value is dynamic
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    /// Set the congestion-control law
    /// The default value is nola
    pub fn algorithm(mut self, algorithm: CongestionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the BDP estimator
    /// The default value is piecewise
    pub fn estimator(mut self, estimator: BdpEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Set the token bucket rate, in bytes per second
    /// The default value is 1500000
    pub fn bandwidth_rate(mut self, rate: i64) -> Self {
        self.bandwidth_rate = rate;
        self
    }

    /// Set the token bucket burst, in bytes
    /// The default value is 1500000
    pub fn bandwidth_burst(mut self, burst: i64) -> Self {
        self.bandwidth_burst = burst;
        self
    }
}
