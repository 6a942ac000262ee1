/// Result type in relaysim
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("codec error {0}")]
    Codec(#[from] CodecError),
    #[error("unknown congestion control algorithm {0}")]
    UnknownAlgorithm(String),
    #[error("unknown bandwidth-delay estimator {0}")]
    UnknownEstimator(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("invalid cell length {0}")]
    InvalidCellLength(usize),
    #[error("invalid cell type {0}")]
    InvalidCellType(u8),
    #[error("invalid relay command {0}")]
    InvalidCommand(u8),
    #[error("payload length {0} exceeds cell capacity")]
    InvalidPayloadLength(usize),
}
