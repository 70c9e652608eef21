//! # Strata Codec
//!
//! Wire codec for protocol messages carried inside base-chain
//! transactions.
//!
//! ```text
//! ┌──────────────────────── base-chain transaction ───────────────────────┐
//! │ inputs ──► sender (largest contributor)                               │
//! │ outputs:                                                              │
//! │   null-data  "om" ‖ version:u16 ‖ type:u16 ‖ fields…  ──► Message     │
//! │   payment    address  ──► reference receiver / send-to-many targets   │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decoding is pure. A transaction that fails to decode is simply not a
//! protocol transaction; a type/version pair this software does not know
//! decodes to [`Message::Unrecognized`] and is ignored by the engine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod message;
mod transaction;

pub use error::{CodecError, Result};
pub use message::{CrowdsaleTerms, IssuanceHeader, ManyOutput, Message, MessageType, OrderTerms};
pub use transaction::{
    embed_payload, parse_transaction, ProtocolTransaction, RawTransaction, TxInput, TxOutput,
    DEFAULT_MAX_NULL_DATA, PAYLOAD_MARKER,
};
