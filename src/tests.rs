use std::cell::Cell as StdCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use rand::Rng;

use crate::cell::{Cell, Command, CELL_NETWORK_SIZE, CELL_PAYLOAD_SIZE};
use crate::config::{Config, FlowControl};
use crate::conn::ConnKind;
use crate::event::Scheduler;
use crate::node::Node;
use crate::transport::{ByteSink, ByteSource, Pipe, Transport};
use crate::{ConnId, Direction, NodeId};

fn setup_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn legacy_window_exhausts_and_recovers_on_ack() {
    setup_logs();
    let config = Config::new()
        .flow_control(FlowControl::LegacyWindow)
        .window_start(500)
        .window_increment(50);
    let mut node = Node::new(NodeId(0), "exit", config);
    let mut sched = Scheduler::new();
    node.add_circuit(
        1,
        addr("10.0.0.2:9001"),
        ConnKind::Relay,
        addr("127.0.0.1:8000"),
        ConnKind::ServerEdge,
    );
    let edge = node.circuit(1).unwrap().conn(Direction::Inbound);

    for _ in 0..500 {
        let cell = Cell::frame(1, Command::Data, b"payload");
        node.push_cell(1, Direction::Outbound, cell, &mut sched);
    }
    assert_eq!(node.circuit(1).unwrap().package_window(), 0);
    assert!(node.connection(edge).is_blocked());

    node.push_cell(1, Direction::Inbound, Cell::sendme(1), &mut sched);
    assert_eq!(node.circuit(1).unwrap().package_window(), 50);
    assert!(!node.connection(edge).is_blocked());
}

#[test]
fn dynamic_window_exhausts_and_recovers_on_ack() {
    setup_logs();
    let config = Config::new().window_start(50).window_increment(10);
    let mut node = Node::new(NodeId(0), "exit", config);
    let mut sched = Scheduler::new();
    node.add_circuit(
        1,
        addr("10.0.0.2:9001"),
        ConnKind::Relay,
        addr("127.0.0.1:8000"),
        ConnKind::ServerEdge,
    );
    let edge = node.circuit(1).unwrap().conn(Direction::Inbound);

    for _ in 0..50 {
        sched.advance_by(Duration::from_micros(10));
        let cell = Cell::frame(1, Command::Data, b"payload");
        node.push_cell(1, Direction::Outbound, cell, &mut sched);
    }
    let circ = node.circuit(1).unwrap();
    assert_eq!(circ.inflight(), 50);
    assert_eq!(circ.cwnd() - circ.inflight(), 0);
    assert!(node.connection(edge).is_blocked());

    sched.advance_by(Duration::from_millis(5));
    node.push_cell(1, Direction::Inbound, Cell::sendme(1), &mut sched);
    let circ = node.circuit(1).unwrap();
    assert_eq!(circ.inflight(), 40);
    assert!(circ.cwnd() - circ.inflight() > 0);
    assert_eq!(circ.num_acks(), 1);
    // too few acks for the law to have run
    assert!(circ.in_slow_start());
    assert!(circ.rtt.min() > 0.0);
    assert!(circ.rtt.max() >= circ.rtt.min());
    assert!(!node.connection(edge).is_blocked());
}

/// Server edge at the exit, two relay hops, client edge at the proxy. The
/// harness loop adds one millisecond of propagation per relay link by
/// re-arming reads on connections with pending input.
#[test]
fn three_node_transfer_delivers_everything() {
    setup_logs();
    const CELLS: usize = 120;
    let total_payload = (CELLS * CELL_PAYLOAD_SIZE) as u64;
    let total_wire = (CELLS * CELL_NETWORK_SIZE) as u64;

    let config = Config::new()
        .window_start(50)
        .window_increment(10)
        .bandwidth_rate(6_000_000)
        .bandwidth_burst(600_000);
    let mut sched = Scheduler::new();
    let mut rng = rand::thread_rng();

    let mut proxy = Node::new(NodeId(0), "proxy", config);
    proxy.add_circuit(
        1,
        addr("10.0.0.2:9001"),
        ConnKind::Relay,
        addr("127.0.0.1:8000"),
        ConnKind::ClientEdge,
    );
    let mut middle = Node::new(NodeId(1), "middle", config);
    middle.add_circuit(
        1,
        addr("10.0.0.3:9001"),
        ConnKind::Relay,
        addr("10.0.0.1:9001"),
        ConnKind::Relay,
    );
    let mut exit = Node::new(NodeId(2), "exit", config);
    exit.add_circuit(
        1,
        addr("198.51.100.7:80"),
        ConnKind::ServerEdge,
        addr("10.0.0.2:9001"),
        ConnKind::Relay,
    );

    // wire the hops; generous buffers so writes never stall mid-cell
    let (pm_near, pm_far) = Pipe::pair(1 << 20);
    let (me_near, me_far) = Pipe::pair(1 << 20);
    proxy.attach_transport(ConnId(0), Box::new(pm_near));
    middle.attach_transport(ConnId(1), Box::new(pm_far));
    middle.attach_transport(ConnId(0), Box::new(me_near));
    exit.attach_transport(ConnId(1), Box::new(me_far));

    let (sink, received) = ByteSink::new();
    proxy.attach_transport(ConnId(1), Box::new(sink));
    exit.attach_transport(ConnId(0), Box::new(ByteSource::new(total_payload as usize)));

    let entered = Rc::new(StdCell::new(0u64));
    let left = Rc::new(StdCell::new(0u64));
    {
        let entered = Rc::clone(&entered);
        exit.hooks_mut().on_bytes_entered_network = Some(Box::new(move |_, from, to| {
            entered.set(entered.get() + (to - from + 1));
        }));
        let left = Rc::clone(&left);
        proxy.hooks_mut().on_bytes_left_network = Some(Box::new(move |_, from, to| {
            left.set(left.get() + (to - from + 1));
        }));
    }

    let mut nodes = [proxy, middle, exit];
    for node in &mut nodes {
        sched.advance_by(Duration::from_micros(rng.gen_range(0..100)));
        node.start(&mut sched);
    }

    // relay-link connections subject to propagation delay
    let wired = [(0usize, ConnId(0)), (1, ConnId(0)), (1, ConnId(1)), (2, ConnId(1))];
    let mut steps = 0u64;
    while let Some((_, event)) = sched.pop() {
        nodes[event.node().0].handle(event, &mut sched);
        for &(n, conn) in &wired {
            if nodes[n].connection(conn).transport().rx_available() > 0 {
                nodes[n].schedule_read(conn, Duration::from_millis(1), &mut sched);
            }
        }
        steps += 1;
        // the last ack is still in flight when the sink fills up
        let drained = received.get() >= total_payload
            && nodes[2].circuit(1).unwrap().inflight() == 0;
        if drained || steps > 500_000 {
            break;
        }
    }

    assert_eq!(received.get(), total_payload);
    assert_eq!(entered.get(), total_wire);
    assert_eq!(left.get(), total_wire);

    // every packaged cell was acked, every ack restored the deliver window
    let exit_circ = nodes[2].circuit(1).unwrap();
    assert_eq!(exit_circ.inflight(), 0);
    assert_eq!(exit_circ.num_acks() as usize, CELLS / 10);
    assert!(exit_circ.rtt.min() > 0.0);
    let proxy_circ = nodes[0].circuit(1).unwrap();
    assert_eq!(proxy_circ.deliver_window(), 50);
}
