use std::fmt;

use crate::address::Address;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while navigating or materializing a data center.
#[derive(Debug, Clone)]
pub enum Error {
    /// A malformed record: bad name/extension index, non-zero flags,
    /// unknown attribute type code, duplicate attribute name, or a
    /// string attribute whose address is missing from the value table.
    Structural(String),
    /// `address` fell outside the bounds of the heap it was read from.
    OutOfBounds { address: Address, heap: &'static str },
    /// Operation attempted on an `Element` or `DataCenter` after close.
    UseAfterDispose,
    /// `DataCenter::close` attempted while the center is frozen.
    FrozenViolation,
    /// A caller passed a null/empty name, or an unsupported fallback type.
    InvalidArgument(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Structural(msg) => write!(f, "structural error: {msg}"),
            Error::OutOfBounds { address, heap } => {
                write!(f, "address {address} out of bounds for {heap} heap")
            }
            Error::UseAfterDispose => write!(f, "use after dispose"),
            Error::FrozenViolation => write!(f, "data center is frozen"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
