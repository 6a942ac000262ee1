use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::CodecError;

/// On-wire size of every cell, data and control alike.
pub const CELL_NETWORK_SIZE: usize = 512;

/// Payload capacity of a single cell.
pub const CELL_PAYLOAD_SIZE: usize = 498;

/// Header: circuit id (2) + cell type (1) + command (1) + recognized (2) +
/// stream id (2) + digest (4) + payload length (2).
pub const CELL_HEADER_SIZE: usize = CELL_NETWORK_SIZE - CELL_PAYLOAD_SIZE;

/// Flow-control acknowledgements travel on this pseudo stream.
const STREAM_ID_SENDME: u16 = 42;

const CELL_TYPE_RELAY: u8 = 0x03;

/// Relay commands carried in the cell header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Data = 0x02,
    Sendme = 0x05,
}

impl Command {
    fn from_u8(cmd: u8) -> Result<Command, CodecError> {
        match cmd {
            0x02 => Ok(Command::Data),
            0x05 => Ok(Command::Sendme),
            _ => Err(CodecError::InvalidCommand(cmd)),
        }
    }
}

/// A fixed-size relay cell. Immutable once framed; cheap to clone and to
/// queue as raw [`Bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    bytes: Bytes,
}

impl Cell {
    /// Frame a payload into a padded cell.
    ///
    /// # Panics
    /// Panics if the payload exceeds [`CELL_PAYLOAD_SIZE`].
    pub fn frame(circ_id: u16, cmd: Command, payload: &[u8]) -> Self {
        assert!(
            payload.len() <= CELL_PAYLOAD_SIZE,
            "payload does not fit into a cell"
        );
        let mut buf = BytesMut::with_capacity(CELL_NETWORK_SIZE);
        buf.put_u16(circ_id);
        buf.put_u8(CELL_TYPE_RELAY);
        buf.put_u8(cmd as u8);
        buf.put_u16(0); // recognized
        buf.put_u16(match cmd {
            Command::Data => 0,
            Command::Sendme => STREAM_ID_SENDME,
        });
        buf.put_u32(0); // digest
        buf.put_u16(payload.len() as u16);
        buf.put_slice(payload);
        buf.resize(CELL_NETWORK_SIZE, 0);
        Self { bytes: buf.freeze() }
    }

    /// An empty flow-control acknowledgement for `circ_id`.
    pub fn sendme(circ_id: u16) -> Self {
        Self::frame(circ_id, Command::Sendme, &[])
    }

    /// Decode one cell from its wire form.
    ///
    /// # Errors
    /// Returns a [`CodecError`] on a wrong length, an unknown cell type or
    /// command, or a payload length exceeding the cell capacity.
    pub fn decode(bytes: Bytes) -> Result<Self, CodecError> {
        if bytes.len() != CELL_NETWORK_SIZE {
            return Err(CodecError::InvalidCellLength(bytes.len()));
        }
        if bytes[2] != CELL_TYPE_RELAY {
            return Err(CodecError::InvalidCellType(bytes[2]));
        }
        Command::from_u8(bytes[3])?;
        let length = u16::from_be_bytes([bytes[12], bytes[13]]) as usize;
        if length > CELL_PAYLOAD_SIZE {
            return Err(CodecError::InvalidPayloadLength(length));
        }
        Ok(Self { bytes })
    }

    pub fn circ_id(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    /// Non-destructive peek at the command byte.
    ///
    /// # Panics
    /// Never for cells built by [`Cell::frame`] or [`Cell::decode`].
    pub fn cmd(&self) -> Command {
        Command::from_u8(self.bytes[3]).expect("command was validated when framed")
    }

    pub fn is_sendme(&self) -> bool {
        self.cmd() == Command::Sendme
    }

    /// The unpadded payload, header stripped.
    pub fn payload(&self) -> Bytes {
        let length = u16::from_be_bytes([self.bytes[12], self.bytes[13]]) as usize;
        self.bytes.slice(CELL_HEADER_SIZE..CELL_HEADER_SIZE + length)
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}
