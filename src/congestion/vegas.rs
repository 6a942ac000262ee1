use super::CongestionControl;

/// Steer the queue occupancy (window minus BDP, in cells) between the
/// alpha/beta/gamma/delta marks.
pub(super) fn update(cc: &mut CongestionControl, bdp: f64, conn_blocked: bool) {
    let p = cc.params;
    let bdp_cells = bdp as i32;
    let queue_use = if bdp > f64::from(cc.cwnd) {
        0
    } else {
        cc.cwnd - bdp_cells
    };
    if cc.in_slow_start {
        if queue_use < p.vegas_gamma && !conn_blocked {
            let inc = (cc.cwnd * p.cwnd_inc_pct_ss / 100).max(2 * p.sendme_inc);
            cc.cwnd = (cc.cwnd + inc).max(bdp_cells);
        } else {
            cc.cwnd = bdp_cells + p.vegas_gamma;
            cc.in_slow_start = false;
        }
    } else if queue_use > p.vegas_delta {
        cc.cwnd = bdp_cells + p.vegas_delta - p.cwnd_inc;
    } else if queue_use > p.vegas_beta || conn_blocked {
        cc.cwnd -= p.cwnd_inc;
    } else if queue_use < p.vegas_alpha {
        cc.cwnd += p.cwnd_inc;
    }
}
