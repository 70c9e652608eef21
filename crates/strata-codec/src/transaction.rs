//! Base-chain transaction view and protocol payload extraction.
//!
//! The codec never talks to the base chain itself. Callers hand it the
//! already-validated inputs and outputs of a transaction; the codec finds
//! the marked null-data output, resolves the sender and the reference
//! receiver, and decodes the payload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strata_types::{Address, Txid};

use crate::error::{CodecError, Result};
use crate::message::Message;

/// Marker bytes that prefix every protocol payload in a null-data output.
pub const PAYLOAD_MARKER: [u8; 2] = *b"om";

/// Default upper bound on the null-data size, marker included.
pub const DEFAULT_MAX_NULL_DATA: usize = 80;

/// A spent output as seen by the transaction that spends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Address that owned the spent output, if it had one.
    pub address: Option<Address>,
    /// Value of the spent output in base-chain units.
    pub value: i64,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxOutput {
    /// Payment to an address.
    Payment {
        /// Receiving address.
        address: Address,
        /// Value in base-chain units.
        value: i64,
    },
    /// Unspendable data carrier.
    NullData {
        /// Carried bytes.
        #[serde(with = "hex::serde")]
        data: Vec<u8>,
    },
    /// Any other script.
    Other {
        /// Value in base-chain units.
        value: i64,
    },
}

impl TxOutput {
    /// Returns the paid address, if this is a payment output.
    #[must_use]
    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::Payment { address, .. } => Some(address),
            _ => None,
        }
    }
}

/// A base-chain transaction, reduced to what the protocol needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Transaction identifier.
    pub txid: Txid,
    /// Spent outputs, in input order.
    pub inputs: Vec<TxInput>,
    /// Created outputs, in output order.
    pub outputs: Vec<TxOutput>,
}

impl RawTransaction {
    /// Returns the protocol payload, without its marker, if present.
    ///
    /// The first marked null-data output wins.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.outputs.iter().find_map(|output| match output {
            TxOutput::NullData { data } if data.starts_with(&PAYLOAD_MARKER) => {
                Some(&data[PAYLOAD_MARKER.len()..])
            }
            _ => None,
        })
    }

    /// Resolves the sender: the address contributing the most input value.
    ///
    /// Ties go to the address that appears first.
    pub fn sender(&self) -> Result<Address> {
        let mut totals: HashMap<&Address, i64> = HashMap::new();
        let mut order: Vec<&Address> = Vec::new();
        for input in &self.inputs {
            let Some(address) = input.address.as_ref() else {
                continue;
            };
            let total = totals.entry(address).or_insert_with(|| {
                order.push(address);
                0
            });
            *total = total
                .checked_add(input.value)
                .ok_or(CodecError::ValueOverflow)?;
        }

        let mut best: Option<(&Address, i64)> = None;
        for address in order {
            let total = totals.get(address).copied().unwrap_or_default();
            if best.map_or(true, |(_, b)| total > b) {
                best = Some((address, total));
            }
        }
        best.map(|(a, _)| a.clone()).ok_or(CodecError::NoSender)
    }

    /// Resolves the reference receiver.
    ///
    /// This is the last payment output not paying the sender; if every
    /// payment output pays the sender, the last payment output.
    #[must_use]
    pub fn reference(&self, sender: &Address) -> Option<Address> {
        let payments = || self.outputs.iter().filter_map(TxOutput::address);
        payments()
            .filter(|a| *a != sender)
            .last()
            .or_else(|| payments().last())
            .cloned()
    }

    /// Address of the payment output at `index`.
    #[must_use]
    pub fn output_address(&self, index: usize) -> Option<&Address> {
        self.outputs.get(index).and_then(TxOutput::address)
    }
}

/// A transaction that carries a decodable protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolTransaction {
    /// Transaction identifier.
    pub txid: Txid,
    /// Resolved sender.
    pub sender: Address,
    /// Resolved reference receiver.
    pub reference: Option<Address>,
    /// Payment output addresses by output index.
    pub outputs: Vec<Option<Address>>,
    /// Decoded message.
    pub message: Message,
}

impl ProtocolTransaction {
    /// Address of the payment output at `index`.
    #[must_use]
    pub fn output_address(&self, index: usize) -> Option<&Address> {
        self.outputs.get(index).and_then(Option::as_ref)
    }
}

/// Extracts and decodes the protocol message carried by `tx`.
///
/// Any error means `tx` is not a protocol transaction.
pub fn parse_transaction(tx: &RawTransaction) -> Result<ProtocolTransaction> {
    let payload = tx.payload().ok_or(CodecError::NoPayload)?;
    let sender = tx.sender()?;
    let message = Message::decode(payload)?;
    let reference = tx.reference(&sender);

    tracing::trace!(
        txid = %tx.txid,
        sender = %sender,
        version = message.version(),
        kind = message.type_code(),
        "decoded protocol payload"
    );

    Ok(ProtocolTransaction {
        txid: tx.txid,
        sender,
        reference,
        outputs: tx.outputs.iter().map(|o| o.address().cloned()).collect(),
        message,
    })
}

/// Builds the null-data content for `payload`: marker followed by payload.
pub fn embed_payload(payload: &[u8], max_len: usize) -> Result<Vec<u8>> {
    let len = PAYLOAD_MARKER.len() + payload.len();
    if len > max_len {
        return Err(CodecError::PayloadTooLarge { len, max: max_len });
    }
    let mut data = Vec::with_capacity(len);
    data.extend_from_slice(&PAYLOAD_MARKER);
    data.extend_from_slice(payload);
    Ok(data)
}
