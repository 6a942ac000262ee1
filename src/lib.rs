//! Data-plane core of an overlay relay network, driven by a discrete-event
//! scheduler. Relays multiplex fixed-size cells over shared connections,
//! pace them with token buckets, and keep per-path flow control either as
//! fixed windows or as a congestion window fed by RTT/BDP estimation.

#![warn(
    clippy::cognitive_complexity,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::empty_line_after_outer_attr,
    clippy::empty_structs_with_brackets,
    clippy::float_cmp,
    clippy::float_cmp_const,
    clippy::float_equality_without_abs,
    keyword_idents,
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    non_ascii_idents,
    noop_method_call,
    clippy::option_if_let_else,
    clippy::print_stderr,
    clippy::print_stdout,
    clippy::semicolon_if_nothing_returned,
    clippy::unseparated_literal_suffix,
    clippy::shadow_unrelated,
    clippy::similar_names,
    clippy::suspicious_operation_groupings,
    unused_extern_crates,
    unused_import_braces,
    clippy::unused_self,
    clippy::use_debug,
    clippy::used_underscore_binding,
    clippy::useless_let_if_seq,
    clippy::wildcard_dependencies,
    clippy::wildcard_imports
)]

/// Token bucket rate limiting
mod bucket;

/// Cell framing
mod cell;

/// Per-path state and flow control
mod circuit;

/// Congestion control laws
mod congestion;

/// Configuration
mod config;

/// Multiplexed duplex channels
mod conn;

/// Errors
mod errors;

/// Discrete-event scheduler
mod event;

/// Relay dispatcher
mod node;

/// Round-trip time estimation
mod rtt;

/// Byte transports
mod transport;

/// Unit tests
#[cfg(test)]
mod tests;

pub use bucket::{TokenBucket, REFILL_INTERVAL};
pub use cell::{Cell, Command, CELL_HEADER_SIZE, CELL_NETWORK_SIZE, CELL_PAYLOAD_SIZE};
pub use circuit::Circuit;
pub use config::{BdpEstimator, Config, CongestionAlgorithm, FlowControl};
pub use conn::{ConnKind, Connection};
pub use errors::{CodecError, Error, Result};
pub use event::{Event, Scheduler};
pub use node::{Hooks, Node};
pub use transport::{ByteSink, ByteSource, Pipe, Transport};

/// The two travel directions on a path, named relative to its pair of
/// connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Toward the next connection.
    Outbound,
    /// Toward the previous connection.
    Inbound,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Outbound => write!(f, "outbound"),
            Direction::Inbound => write!(f, "inbound"),
        }
    }
}

/// Arena handle of a connection within one node. Handles are stable for the
/// lifetime of the node; connections are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub(crate) usize);

/// Handle of a node within a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);
