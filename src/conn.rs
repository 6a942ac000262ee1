use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use log::trace;

use crate::cell::{CELL_NETWORK_SIZE, CELL_PAYLOAD_SIZE};
use crate::transport::Transport;

/// What travels on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
    /// Relay-to-relay, whole cells on the wire.
    Relay,
    /// Local client endpoint, raw bytes.
    ClientEdge,
    /// Local server endpoint, raw bytes.
    ServerEdge,
}

impl ConnKind {
    /// Whether traffic is framed into cells on this connection.
    pub fn speaks_cells(self) -> bool {
        matches!(self, ConnKind::Relay)
    }
}

/// One duplex channel multiplexing the circuits attached to it. Circuits
/// with pending output form a circular list threaded through the circuits
/// themselves; the connection only remembers the head.
pub struct Connection {
    remote: SocketAddr,
    kind: ConnKind,
    name: String,
    inbuf: BytesMut,
    outbuf: BytesMut,
    blocked: bool,
    transport: Option<Box<dyn Transport>>,
    pub(crate) ring_head: Option<u16>,
    pub(crate) read_pending: bool,
    pub(crate) write_pending: bool,
    /// Highest byte index handed to the network, per circuit.
    pub(crate) index_seen: HashMap<u16, u64>,
    /// Highest byte index delivered out of the network, per circuit.
    pub(crate) index_delivered: HashMap<u16, u64>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("kind", &self.kind)
            .field("blocked", &self.blocked)
            .field("inbuf", &self.inbuf.len())
            .field("outbuf", &self.outbuf.len())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(remote: SocketAddr, kind: ConnKind) -> Self {
        Self {
            remote,
            kind,
            name: remote.to_string(),
            inbuf: BytesMut::new(),
            outbuf: BytesMut::new(),
            blocked: false,
            transport: None,
            ring_head: None,
            read_pending: false,
            write_pending: false,
            index_seen: HashMap::new(),
            index_delivered: HashMap::new(),
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn kind(&self) -> ConnKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub(crate) fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    pub(crate) fn attach_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    pub(crate) fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// # Panics
    /// Panics when no transport is attached; scheduling I/O on a detached
    /// connection is a wiring bug.
    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_deref().expect("no transport attached")
    }

    pub(crate) fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport
            .as_deref_mut()
            .expect("no transport attached")
    }

    /// Unit of framing on this connection: whole cells on relay links,
    /// cell payloads on edges.
    pub(crate) fn base_size(&self) -> usize {
        if self.kind.speaks_cells() {
            CELL_NETWORK_SIZE
        } else {
            CELL_PAYLOAD_SIZE
        }
    }

    /// Pull up to `budget` bytes off the transport and slice the input into
    /// whole base-size chunks; a trailing partial chunk stays buffered until
    /// the next read.
    pub(crate) fn read(&mut self, budget: usize) -> (usize, Vec<Bytes>) {
        if self.blocked {
            trace!("[conn {}] read while blocked, ignored", self.name);
            return (0, Vec::new());
        }
        let got = self
            .transport
            .as_deref_mut()
            .expect("no transport attached")
            .recv_up_to(budget);
        let nread = got.len();
        self.inbuf.extend_from_slice(&got);
        let base = self.base_size();
        let mut chunks = Vec::with_capacity(self.inbuf.len() / base);
        while self.inbuf.len() >= base {
            chunks.push(self.inbuf.split_to(base).freeze());
        }
        (nread, chunks)
    }

    pub(crate) fn has_leftover_output(&self) -> bool {
        !self.outbuf.is_empty()
    }

    pub(crate) fn take_outbuf(&mut self) -> BytesMut {
        std::mem::take(&mut self.outbuf)
    }

    pub(crate) fn store_outbuf(&mut self, leftover: BytesMut) {
        self.outbuf = leftover;
    }
}
