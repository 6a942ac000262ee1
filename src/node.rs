use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};

use crate::bucket::{TokenBucket, REFILL_INTERVAL};
use crate::cell::{Cell, Command, CELL_NETWORK_SIZE};
use crate::circuit::Circuit;
use crate::config::{Config, FlowControl};
use crate::conn::{ConnKind, Connection};
use crate::event::{Event, Scheduler};
use crate::transport::Transport;
use crate::{ConnId, Direction, NodeId};

/// Virtual processing cost of received bytes; a follow-up read is scheduled
/// this far in the future per byte when more input remains.
const READ_DELAY_PER_BYTE: Duration = Duration::from_nanos(2);

/// Re-armed reads after a refill land slightly in the future so the refill
/// event itself finishes first.
const REARM_DELAY: Duration = Duration::from_nanos(10);

/// A write against a full transport is retried on this cadence until the
/// peer frees up space.
const WRITE_RETRY_DELAY: Duration = Duration::from_micros(100);

/// Optional observability callbacks. Fire-and-forget: nothing in the data
/// path depends on them.
#[derive(Default)]
pub struct Hooks {
    pub on_new_connection: Option<Box<dyn FnMut(ConnId)>>,
    pub on_new_circuit: Option<Box<dyn FnMut(u16)>>,
    /// Inclusive 1-based byte range `(circ, from, to)` handed to the network
    /// at a server edge.
    pub on_bytes_entered_network: Option<Box<dyn FnMut(u16, u64, u64)>>,
    /// Inclusive 1-based byte range `(circ, from, to)` delivered out of the
    /// network at a client edge.
    pub on_bytes_left_network: Option<Box<dyn FnMut(u16, u64, u64)>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_new_connection", &self.on_new_connection.is_some())
            .field("on_new_circuit", &self.on_new_circuit.is_some())
            .field(
                "on_bytes_entered_network",
                &self.on_bytes_entered_network.is_some(),
            )
            .field(
                "on_bytes_left_network",
                &self.on_bytes_left_network.is_some(),
            )
            .finish()
    }
}

/// One relay: connection and circuit arenas plus the dispatch logic that
/// moves cells between them under token-bucket pacing.
pub struct Node {
    id: NodeId,
    name: String,
    config: Config,
    conns: Vec<Connection>,
    circuits: HashMap<u16, Circuit>,
    read_bucket: TokenBucket,
    write_bucket: TokenBucket,
    /// First connection starved by an empty bucket; refill re-arming starts
    /// from it so it is not starved twice in a row.
    read_head: Option<ConnId>,
    write_head: Option<ConnId>,
    hooks: Hooks,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("conns", &self.conns.len())
            .field("circuits", &self.circuits.len())
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, config: Config) -> Self {
        Self {
            id,
            name: name.into(),
            conns: Vec::new(),
            circuits: HashMap::new(),
            read_bucket: TokenBucket::new(config.bandwidth_rate, config.bandwidth_burst),
            write_bucket: TokenBucket::new(config.bandwidth_rate, config.bandwidth_burst),
            read_head: None,
            write_head: None,
            hooks: Hooks::default(),
            config,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    pub fn circuit(&self, id: u16) -> Option<&Circuit> {
        self.circuits.get(&id)
    }

    pub fn connection(&self, conn: ConnId) -> &Connection {
        &self.conns[conn.0]
    }

    /// Add a path between two remotes, creating or reusing the connections.
    ///
    /// # Panics
    /// Panics on a duplicate circuit id.
    pub fn add_circuit(
        &mut self,
        id: u16,
        n_remote: SocketAddr,
        n_kind: ConnKind,
        p_remote: SocketAddr,
        p_kind: ConnKind,
    ) {
        assert!(
            !self.circuits.contains_key(&id),
            "duplicate circuit id {id}"
        );
        let n_conn = self.add_connection(n_remote, n_kind);
        let p_conn = self.add_connection(p_remote, p_kind);
        self.circuits
            .insert(id, Circuit::new(id, n_conn, p_conn, &self.config));
        self.attach_to_ring(n_conn, id);
        self.attach_to_ring(p_conn, id);
        debug!("[{}] new circuit {id}", self.name);
        if let Some(f) = self.hooks.on_new_circuit.as_mut() {
            f(id);
        }
    }

    /// Connections are keyed by remote address and shared between circuits.
    pub fn add_connection(&mut self, remote: SocketAddr, kind: ConnKind) -> ConnId {
        if let Some(i) = self.conns.iter().position(|c| c.remote() == remote) {
            return ConnId(i);
        }
        let conn = ConnId(self.conns.len());
        self.conns.push(Connection::new(remote, kind));
        debug!("[{}] new connection to {remote}", self.name);
        if let Some(f) = self.hooks.on_new_connection.as_mut() {
            f(conn);
        }
        conn
    }

    /// Splice the circuit into the service ring of `conn`, right behind the
    /// head.
    fn attach_to_ring(&mut self, conn: ConnId, circ_id: u16) {
        match self.conns[conn.0].ring_head {
            None => {
                self.conns[conn.0].ring_head = Some(circ_id);
                self.circuit_mut(circ_id).set_next_circuit(conn, Some(circ_id));
            }
            Some(head) => {
                let after = self.circuits[&head].next_circuit(conn);
                self.circuit_mut(circ_id).set_next_circuit(conn, after);
                self.circuit_mut(head).set_next_circuit(conn, Some(circ_id));
            }
        }
    }

    fn circuit_mut(&mut self, id: u16) -> &mut Circuit {
        self.circuits
            .get_mut(&id)
            .unwrap_or_else(|| panic!("no circuit {id}"))
    }

    pub fn attach_transport(&mut self, conn: ConnId, transport: Box<dyn Transport>) {
        self.conns[conn.0].attach_transport(transport);
    }

    /// Arm the periodic refills and an initial read/write pass over every
    /// wired connection.
    pub fn start(&mut self, sched: &mut Scheduler) {
        sched.schedule_in(REFILL_INTERVAL, Event::RefillRead { node: self.id });
        sched.schedule_in(REFILL_INTERVAL, Event::RefillWrite { node: self.id });
        for i in 0..self.conns.len() {
            self.schedule_read(ConnId(i), Duration::ZERO, sched);
            self.schedule_write(ConnId(i), Duration::ZERO, sched);
        }
    }

    /// Dispatch one fired event.
    pub fn handle(&mut self, event: Event, sched: &mut Scheduler) {
        match event {
            Event::ReadReady { conn, .. } => self.on_read_ready(conn, sched),
            Event::WriteReady { conn, .. } => self.on_write_ready(conn, sched),
            Event::RefillRead { .. } => self.on_refill_read(sched),
            Event::RefillWrite { .. } => self.on_refill_write(sched),
        }
    }

    /// At most one read event per connection is ever pending; re-scheduling
    /// is a no-op. Detached connections are skipped.
    pub fn schedule_read(&mut self, conn: ConnId, delay: Duration, sched: &mut Scheduler) {
        let c = &mut self.conns[conn.0];
        if !c.has_transport() || c.read_pending {
            return;
        }
        c.read_pending = true;
        sched.schedule_in(
            delay,
            Event::ReadReady {
                node: self.id,
                conn,
            },
        );
    }

    pub fn schedule_write(&mut self, conn: ConnId, delay: Duration, sched: &mut Scheduler) {
        let c = &mut self.conns[conn.0];
        if !c.has_transport() || c.write_pending {
            return;
        }
        c.write_pending = true;
        sched.schedule_in(
            delay,
            Event::WriteReady {
                node: self.id,
                conn,
            },
        );
    }

    fn on_read_ready(&mut self, conn: ConnId, sched: &mut Scheduler) {
        self.conns[conn.0].read_pending = false;
        if self.conns[conn.0].is_blocked() {
            trace!(
                "[{}: conn {}] read fired while blocked",
                self.name,
                self.conns[conn.0].name()
            );
            return;
        }
        let base = self.conns[conn.0].base_size();
        let mut max_read = round_robin_budget(base, self.read_bucket.available());
        if self.read_bucket.available() <= 0 && self.read_head.is_none() {
            self.read_head = Some(conn);
        }
        max_read = max_read.min(self.conns[conn.0].transport().rx_available());
        if !self.conns[conn.0].kind().speaks_cells() {
            // edges only pull what the window allows in one pass
            let circ_id = self.conns[conn.0]
                .ring_head
                .expect("edge connection without a circuit");
            let circ = &self.circuits[&circ_id];
            let allowance = match circ.mode() {
                FlowControl::LegacyWindow => circ.package_window(),
                FlowControl::DynamicCwnd => circ.cwnd() - circ.inflight(),
            };
            max_read = max_read.min(allowance.max(0) as usize * base);
        }
        if max_read == 0 {
            return;
        }

        let (nread, chunks) = self.conns[conn.0].read(max_read);
        trace!(
            "[{}: conn {}] read {nread} bytes, {} chunks",
            self.name,
            self.conns[conn.0].name(),
            chunks.len()
        );
        for chunk in chunks {
            if self.conns[conn.0].kind().speaks_cells() {
                let cell = Cell::decode(chunk).expect("malformed cell from cooperative peer");
                self.receive_relay_cell(conn, cell, sched);
            } else {
                self.package_relay_cell(conn, &chunk, sched);
            }
        }
        if nread > 0 {
            self.read_bucket.decrement(nread as u64);
            if self.conns[conn.0].transport().rx_available() > 0 {
                self.schedule_read(conn, READ_DELAY_PER_BYTE * nread as u32, sched);
            }
        }
    }

    /// Raw edge bytes become one data cell on the circuit of the edge,
    /// heading away from it.
    fn package_relay_cell(&mut self, conn: ConnId, payload: &[u8], sched: &mut Scheduler) {
        let circ_id = self.conns[conn.0]
            .ring_head
            .expect("edge connection without a circuit");
        let direction = self.circuits[&circ_id].opposite_direction_of(conn);
        let cell = Cell::frame(circ_id, Command::Data, payload);
        self.push_cell(circ_id, direction, cell, sched);
    }

    /// A whole cell arrived on a relay connection; route it onward.
    ///
    /// # Panics
    /// Panics when the cell names a circuit this node does not carry.
    fn receive_relay_cell(&mut self, conn: ConnId, cell: Cell, sched: &mut Scheduler) {
        let circ_id = cell.circ_id();
        let circ = self
            .circuits
            .get(&circ_id)
            .unwrap_or_else(|| panic!("[{}] received cell for unknown circuit {circ_id}", self.name));
        let direction = circ.opposite_direction_of(conn);
        let target = circ.conn(direction);
        if self.conns[target.0].kind() == ConnKind::ClientEdge && !cell.is_sendme() {
            let len = CELL_NETWORK_SIZE as u64;
            let index = self.conns[target.0]
                .index_delivered
                .entry(circ_id)
                .or_insert(0);
            let (from, to) = (*index + 1, *index + len);
            *index += len;
            if let Some(f) = self.hooks.on_bytes_left_network.as_mut() {
                f(circ_id, from, to);
            }
        }
        self.push_cell(circ_id, direction, cell, sched);
    }

    /// Queue a cell onto a circuit heading `direction`, with flow-control
    /// bookkeeping on both ends: package accounting when the cell departs an
    /// edge, ack/deliver handling when it arrives at one.
    pub(crate) fn push_cell(
        &mut self,
        circ_id: u16,
        direction: Direction,
        cell: Cell,
        sched: &mut Scheduler,
    ) {
        let now = sched.now();
        let (conn, opp) = {
            let circ = &self.circuits[&circ_id];
            (circ.conn(direction), circ.opposite_conn(direction))
        };

        // sender side: cells leaving an edge consume the package window
        if !self.conns[opp.0].kind().speaks_cells()
            && !cell.is_sendme()
            && self.circuit_mut(circ_id).on_cell_packaged(now)
        {
            debug!(
                "[{}: circuit {circ_id}] window exhausted, blocking reads from {}",
                self.name,
                self.conns[opp.0].name()
            );
            self.conns[opp.0].set_blocked(true);
        }

        if !self.conns[conn.0].kind().speaks_cells() {
            // receiver side: the cell reached its edge
            if cell.is_sendme() {
                debug!("[{}: circuit {circ_id}] received ack", self.name);
                let edge_blocked = self.conns[conn.0].is_blocked();
                let circ = self.circuit_mut(circ_id);
                match circ.mode() {
                    FlowControl::LegacyWindow => circ.inc_package_window(),
                    FlowControl::DynamicCwnd => circ.on_ack(now, edge_blocked, direction),
                }
                if edge_blocked {
                    self.conns[conn.0].set_blocked(false);
                    self.schedule_read(conn, Duration::ZERO, sched);
                }
                return;
            }
            // edges receive bare payloads, the header has done its job
            let payload = cell.payload();
            self.circuit_mut(circ_id)
                .queue_mut(direction)
                .push_back(payload);
        } else {
            self.circuit_mut(circ_id)
                .queue_mut(direction)
                .push_back(cell.into_bytes());
        }
        self.schedule_write(conn, Duration::ZERO, sched);
    }

    /// Take the next queued item off a circuit, generating an ack back along
    /// the path when the item is delivered to an edge.
    fn pop_cell(
        &mut self,
        circ_id: u16,
        direction: Direction,
        sched: &mut Scheduler,
    ) -> Option<Bytes> {
        let item = self
            .circuits
            .get_mut(&circ_id)?
            .queue_mut(direction)
            .pop_front()?;
        let conn = self.circuits[&circ_id].conn(direction);
        if !self.conns[conn.0].kind().speaks_cells() {
            let circ = self.circuit_mut(circ_id);
            if circ.on_cell_delivered() {
                let opposite = direction.opposite();
                let opp_conn = circ.conn(opposite);
                circ.queue_mut(opposite)
                    .push_back(Cell::sendme(circ_id).into_bytes());
                debug!("[{}: circuit {circ_id}] queueing ack", self.name);
                self.schedule_write(opp_conn, Duration::ZERO, sched);
            }
        }
        Some(item)
    }

    fn on_write_ready(&mut self, conn: ConnId, sched: &mut Scheduler) {
        self.conns[conn.0].write_pending = false;
        let base = self.conns[conn.0].base_size();
        let mut budget = round_robin_budget(base, self.write_bucket.available());
        if self.write_bucket.available() <= 0 && self.write_head.is_none() {
            self.write_head = Some(conn);
        }
        budget = budget.min(self.conns[conn.0].transport().tx_available());
        if budget == 0 {
            // a full transport is polled until space frees up; an empty
            // bucket is re-armed by the refill fan-out instead
            if self.write_bucket.available() > 0 && self.has_pending_output(conn) {
                self.schedule_write(conn, WRITE_RETRY_DELAY, sched);
            }
            return;
        }
        let written = self.write_conn(conn, budget, sched);
        if written > 0 {
            self.write_bucket.decrement(written as u64);
        }
        if self.has_pending_output(conn) {
            let delay = if written > 0 {
                Duration::ZERO
            } else {
                WRITE_RETRY_DELAY
            };
            self.schedule_write(conn, delay, sched);
        }
    }

    /// Whether anything is still waiting to leave over `conn`: leftover bytes
    /// on the connection or a queued cell on any circuit of its ring.
    fn has_pending_output(&self, conn: ConnId) -> bool {
        if self.conns[conn.0].has_leftover_output() {
            return true;
        }
        let Some(start) = self.conns[conn.0].ring_head else {
            return false;
        };
        let mut circ_id = start;
        loop {
            let circ = &self.circuits[&circ_id];
            if circ.queue_len(circ.direction_to(conn)) > 0 {
                return true;
            }
            match circ.next_circuit(conn) {
                Some(next) if next != start => circ_id = next,
                _ => return false,
            }
        }
    }

    /// Ring-fair drain: one queued item per circuit per lap, stopping after
    /// a full silent lap or an exhausted budget. A partial send keeps its
    /// tail buffered on the connection.
    fn write_conn(&mut self, conn: ConnId, budget: usize, sched: &mut Scheduler) -> usize {
        let mut data = self.conns[conn.0].take_outbuf();
        let lap_start = self.conns[conn.0].ring_head;
        let mut flushed_this_lap = false;
        while data.len() < budget {
            let Some(circ_id) = self.conns[conn.0].ring_head else {
                break;
            };
            let direction = self.circuits[&circ_id].direction_to(conn);
            if let Some(item) = self.pop_cell(circ_id, direction, sched) {
                let opp = self.circuits[&circ_id].opposite_conn(direction);
                let from_server_edge = self.conns[opp.0].kind() == ConnKind::ServerEdge;
                let len = item.len() as u64;
                let index = self.conns[conn.0].index_seen.entry(circ_id).or_insert(0);
                let (from, to) = (*index + 1, *index + len);
                *index += len;
                if from_server_edge {
                    if let Some(f) = self.hooks.on_bytes_entered_network.as_mut() {
                        f(circ_id, from, to);
                    }
                }
                data.extend_from_slice(&item);
                flushed_this_lap = true;
            }
            let next = self.circuits[&circ_id].next_circuit(conn);
            self.conns[conn.0].ring_head = next;
            if next == lap_start {
                if !flushed_this_lap {
                    break;
                }
                flushed_this_lap = false;
            }
        }

        let to_send = data.len().min(budget);
        let sent = if to_send > 0 {
            self.conns[conn.0].transport_mut().send(&data[..to_send])
        } else {
            0
        };
        let _ = data.split_to(sent);
        if !data.is_empty() {
            trace!(
                "[{}: conn {}] keeping {} leftover bytes",
                self.name,
                self.conns[conn.0].name(),
                data.len()
            );
        }
        self.conns[conn.0].store_outbuf(data);
        sent
    }

    /// Top up the read bucket; when it comes back to life, re-arm every
    /// connection starting from the one that starved first.
    fn on_refill_read(&mut self, sched: &mut Scheduler) {
        let before = self.read_bucket.refill();
        if before <= 0 && self.read_bucket.available() > 0 && !self.conns.is_empty() {
            let start = self.read_head.take().map_or(0, |c| c.0);
            for offset in 0..self.conns.len() {
                let conn = ConnId((start + offset) % self.conns.len());
                self.schedule_read(conn, REARM_DELAY, sched);
            }
        }
        sched.schedule_in(REFILL_INTERVAL, Event::RefillRead { node: self.id });
    }

    fn on_refill_write(&mut self, sched: &mut Scheduler) {
        let before = self.write_bucket.refill();
        if before <= 0 && self.write_bucket.available() > 0 && !self.conns.is_empty() {
            let start = self.write_head.take().map_or(0, |c| c.0);
            for offset in 0..self.conns.len() {
                let conn = ConnId((start + offset) % self.conns.len());
                self.schedule_write(conn, Duration::ZERO, sched);
            }
        }
        sched.schedule_in(REFILL_INTERVAL, Event::RefillWrite { node: self.id });
    }
}

/// How many bytes one connection may move in a single pass: an eighth of the
/// bucket rounded down to whole base units, clamped to `[4, 32]` units, and
/// never more than the bucket itself holds.
fn round_robin_budget(base: usize, bucket: i64) -> usize {
    let low = 4 * base as i64;
    let high = 32 * base as i64;
    let mut at_most = bucket / 8;
    at_most -= at_most % base as i64;
    at_most = at_most.clamp(low, high);
    at_most = at_most.min(bucket);
    if at_most < 0 {
        0
    } else {
        at_most as usize
    }
}
