//! Error types for the wire codec.

use thiserror::Error;

/// Reasons a base-chain transaction is not a protocol transaction.
///
/// None of these are fatal: the driver skips the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// No null-data output carries the protocol marker.
    #[error("no protocol payload")]
    NoPayload,

    /// No input resolves to an address, so there is no sender.
    #[error("no sender address")]
    NoSender,

    /// The payload ended before a field could be read.
    #[error("truncated payload: {0}")]
    Truncated(&'static str),

    /// A text field was not valid UTF-8.
    #[error("invalid text in field {0}")]
    InvalidText(&'static str),

    /// A text field exceeded the maximum length.
    #[error("text field {field} too long: {len} bytes")]
    TextTooLong {
        /// The field name.
        field: &'static str,
        /// Its length in bytes.
        len: usize,
    },

    /// A text field contains an embedded NUL and cannot be encoded.
    #[error("text field {0} contains a NUL byte")]
    EmbeddedNul(&'static str),

    /// A send-to-many message lists more receivers than fit in a byte.
    #[error("too many outputs: {0}")]
    TooManyOutputs(usize),

    /// The marked payload does not fit in a null-data output.
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Marker plus payload length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// Input value arithmetic overflowed while resolving the sender.
    #[error("input values overflow")]
    ValueOverflow,
}

/// A specialized Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
