use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bytes::{Bytes, BytesMut};

/// One end of a byte channel. All methods are non-blocking: zero capacity or
/// zero available bytes means "try again on a later event".
pub trait Transport {
    /// Bytes ready to be received.
    fn rx_available(&self) -> usize;

    /// Send-buffer space left.
    fn tx_available(&self) -> usize;

    /// Take up to `max` bytes out of the receive side.
    fn recv_up_to(&mut self, max: usize) -> Bytes;

    /// Hand bytes to the channel; returns how many were accepted.
    fn send(&mut self, data: &[u8]) -> usize;
}

#[derive(Debug)]
struct PipeHalf {
    buf: BytesMut,
    capacity: usize,
}

/// In-memory duplex link between two relays. Bytes become visible to the
/// peer immediately; link latency is modeled by the event scheduling of the
/// harness around it. `Rc<RefCell<_>>` is fine here, the whole simulation is
/// one logical thread.
#[derive(Debug)]
pub struct Pipe {
    rx: Rc<RefCell<PipeHalf>>,
    tx: Rc<RefCell<PipeHalf>>,
}

impl Pipe {
    /// Two connected endpoints with `capacity` bytes of buffer per direction.
    pub fn pair(capacity: usize) -> (Pipe, Pipe) {
        let a = Rc::new(RefCell::new(PipeHalf {
            buf: BytesMut::new(),
            capacity,
        }));
        let b = Rc::new(RefCell::new(PipeHalf {
            buf: BytesMut::new(),
            capacity,
        }));
        (
            Pipe {
                rx: Rc::clone(&a),
                tx: Rc::clone(&b),
            },
            Pipe { rx: b, tx: a },
        )
    }
}

impl Transport for Pipe {
    fn rx_available(&self) -> usize {
        self.rx.borrow().buf.len()
    }

    fn tx_available(&self) -> usize {
        let tx = self.tx.borrow();
        tx.capacity - tx.buf.len()
    }

    fn recv_up_to(&mut self, max: usize) -> Bytes {
        let mut rx = self.rx.borrow_mut();
        let n = rx.buf.len().min(max);
        rx.buf.split_to(n).freeze()
    }

    fn send(&mut self, data: &[u8]) -> usize {
        let mut tx = self.tx.borrow_mut();
        let n = (tx.capacity - tx.buf.len()).min(data.len());
        tx.buf.extend_from_slice(&data[..n]);
        n
    }
}

/// Pseudo server-side endpoint: offers a fixed total of bytes to read and
/// absorbs whatever is written to it.
#[derive(Debug)]
pub struct ByteSource {
    remaining: usize,
}

impl ByteSource {
    pub fn new(total: usize) -> Self {
        Self { remaining: total }
    }
}

impl Transport for ByteSource {
    fn rx_available(&self) -> usize {
        self.remaining
    }

    fn tx_available(&self) -> usize {
        usize::MAX
    }

    fn recv_up_to(&mut self, max: usize) -> Bytes {
        let n = self.remaining.min(max);
        self.remaining -= n;
        Bytes::from(vec![0u8; n])
    }

    fn send(&mut self, data: &[u8]) -> usize {
        data.len()
    }
}

/// Pseudo client-side endpoint: counts every byte written to it and offers
/// nothing to read.
#[derive(Debug)]
pub struct ByteSink {
    received: Rc<Cell<u64>>,
}

impl ByteSink {
    /// The returned counter tracks total bytes delivered into the sink.
    pub fn new() -> (Self, Rc<Cell<u64>>) {
        let received = Rc::new(Cell::new(0));
        (
            Self {
                received: Rc::clone(&received),
            },
            received,
        )
    }
}

impl Transport for ByteSink {
    fn rx_available(&self) -> usize {
        0
    }

    fn tx_available(&self) -> usize {
        usize::MAX
    }

    fn recv_up_to(&mut self, _max: usize) -> Bytes {
        Bytes::new()
    }

    fn send(&mut self, data: &[u8]) -> usize {
        self.received.set(self.received.get() + data.len() as u64);
        data.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pipe_transfers_and_backpressures() {
        let (mut a, mut b) = Pipe::pair(8);
        assert_eq!(a.send(b"hello world"), 8);
        assert_eq!(a.tx_available(), 0);
        assert_eq!(b.rx_available(), 8);
        assert_eq!(&b.recv_up_to(5)[..], b"hello");
        assert_eq!(a.tx_available(), 5);
        assert_eq!(a.send(b"!!!"), 3);
        assert_eq!(&b.recv_up_to(64)[..], b" wo!!!");
        assert_eq!(b.rx_available(), 0);
    }

    #[test]
    fn pipe_directions_are_independent() {
        let (mut a, mut b) = Pipe::pair(16);
        a.send(b"ping");
        b.send(b"pong");
        assert_eq!(&a.recv_up_to(16)[..], b"pong");
        assert_eq!(&b.recv_up_to(16)[..], b"ping");
    }

    #[test]
    fn source_drains_and_sink_counts() {
        let mut source = ByteSource::new(10);
        assert_eq!(source.recv_up_to(7).len(), 7);
        assert_eq!(source.rx_available(), 3);
        assert_eq!(source.recv_up_to(7).len(), 3);
        assert_eq!(source.rx_available(), 0);

        let (mut sink, received) = ByteSink::new();
        assert_eq!(sink.send(&[0; 100]), 100);
        sink.send(&[0; 28]);
        assert_eq!(received.get(), 128);
        assert_eq!(sink.rx_available(), 0);
    }
}
