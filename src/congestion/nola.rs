use super::CongestionControl;

/// Track the measured BDP directly, overshooting by a constant as long as
/// the channel keeps up.
pub(super) fn update(cc: &mut CongestionControl, bdp: f64, conn_blocked: bool) {
    cc.cwnd = if conn_blocked {
        bdp as i32
    } else {
        bdp as i32 + cc.params.nola_overshoot
    };
}
