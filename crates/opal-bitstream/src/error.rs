use thiserror::Error;

/// Errors that can occur while reading from or writing to a [`BitStream`].
///
/// [`BitStream`]: crate::stream::BitStream
#[derive(Error, Debug)]
pub enum BitStreamError {
    /// Not enough bits remaining in the stream for the requested read.
    #[error("bit stream underflow: needed {needed} bits, {remaining} remaining")]
    Underflow { needed: usize, remaining: usize },

    /// A value is too large for the length prefix that has to describe it.
    #[error("bit stream overflow: {len} does not fit the length prefix")]
    Overflow { len: usize },

    /// The operation belongs to a protocol extension this revision omits.
    #[error("{0} is not supported")]
    NotSupported(&'static str),

    /// String data could not be decoded with the expected encoding.
    #[error("invalid string data: {0}")]
    InvalidString(String),
}

pub type Result<T> = std::result::Result<T, BitStreamError>;
