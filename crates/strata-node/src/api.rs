//! Protocol operations exposed to callers.
//!
//! Reads go straight to the engine's committed state. Every `send_*`
//! validates its inputs, encodes the message and hands a
//! [`TransactionRequest`] to a [`TransactionBroadcaster`]; nothing is
//! broadcast when validation fails. The engine later sees the mined
//! transaction like any other.

use crate::error::{ApiError, Result};
use crate::validation::{validate_text_field, AddressValidator, CheckedAddress};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use strata_codec::{
    embed_payload, IssuanceHeader, ManyOutput, Message, RawTransaction, TxInput, TxOutput,
};
use strata_consensus::{Activation, AlertKind, Balance, Property, PropertyKind, StateReader};
use strata_types::{
    format_amount, parse_amount, Address, AddressForm, Amount, BlockHeight, Ecosystem,
    PropertyId, Txid,
};

/// Value attached to each receiver output when none is requested.
pub const DUST_THRESHOLD: i64 = 546;

/// A base-chain transaction for the wallet to fund, sign and broadcast.
///
/// Outputs are laid out as the null-data carrier first, then one payment
/// per receiver in order. Change goes back to the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRequest {
    /// Funding address; becomes the protocol sender.
    pub sender: Address,
    /// Payment outputs after the carrier.
    pub receivers: Vec<Address>,
    /// Value of each receiver output.
    pub reference_amount: i64,
    /// Null-data content: marker followed by payload.
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

impl TransactionRequest {
    /// Outputs in broadcast order.
    #[must_use]
    pub fn outputs(&self) -> Vec<TxOutput> {
        let mut outputs = Vec::with_capacity(1 + self.receivers.len());
        outputs.push(TxOutput::NullData {
            data: self.data.clone(),
        });
        outputs.extend(self.receivers.iter().map(|address| TxOutput::Payment {
            address: address.clone(),
            value: self.reference_amount,
        }));
        outputs
    }

    /// The transaction as it appears once mined, funded by one input of
    /// `input_value` from the sender.
    #[must_use]
    pub fn to_raw(&self, txid: Txid, input_value: i64) -> RawTransaction {
        RawTransaction {
            txid,
            inputs: vec![TxInput {
                address: Some(self.sender.clone()),
                value: input_value,
            }],
            outputs: self.outputs(),
        }
    }
}

/// Hands finished transactions to the base-chain wallet.
pub trait TransactionBroadcaster: Send + Sync {
    /// Funds, signs and broadcasts `request`, returning its txid.
    fn broadcast(&self, request: TransactionRequest) -> Result<Txid>;
}

/// Keeps requests in memory instead of broadcasting them.
#[derive(Debug, Default)]
pub struct MemoryBroadcaster {
    sent: Mutex<Vec<(Txid, TransactionRequest)>>,
}

impl MemoryBroadcaster {
    /// Creates an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything broadcast so far, oldest first.
    pub fn sent(&self) -> Vec<(Txid, TransactionRequest)> {
        self.sent.lock().clone()
    }

    /// Removes and returns everything broadcast so far.
    pub fn drain(&self) -> Vec<(Txid, TransactionRequest)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl TransactionBroadcaster for MemoryBroadcaster {
    fn broadcast(&self, request: TransactionRequest) -> Result<Txid> {
        let mut sent = self.sent.lock();
        let mut preimage =
            serde_json::to_vec(&request).map_err(|e| ApiError::Internal(e.to_string()))?;
        preimage.extend_from_slice(&(sent.len() as u64).to_be_bytes());
        let txid = Txid::digest(&preimage);
        sent.push((txid, request));
        Ok(txid)
    }
}

/// A balance formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    /// Spendable.
    pub balance: String,
    /// Locked in open orders.
    pub reserved: String,
    /// Held by a freeze.
    pub frozen: String,
}

impl BalanceView {
    fn new(balance: Balance, divisible: bool) -> Self {
        Self {
            balance: format_amount(balance.available, divisible),
            reserved: format_amount(balance.reserved, divisible),
            frozen: format_amount(balance.frozen, divisible),
        }
    }
}

/// Feature activations split by state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationsView {
    /// Scheduled, not yet live.
    pub pending: Vec<Activation>,
    /// Live.
    pub completed: Vec<Activation>,
}

/// What the ledger recorded for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    /// Identifier.
    pub txid: Txid,
    /// Whether the message took effect.
    pub valid: bool,
    /// Rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Rejection code, zero when valid.
    pub invalid_code: i32,
    /// Block height.
    pub block: BlockHeight,
    /// Position in the block.
    pub position: u32,
    /// Sender.
    pub sending_address: String,
    /// Reference receiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_address: Option<String>,
    /// Message type code.
    pub type_int: u16,
    /// Message version.
    pub version: u16,
}

/// Parameters of a new property, shared by the issuance calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceRequest {
    /// Ecosystem byte: 1 main, 2 test.
    pub ecosystem: u8,
    /// Property kind: 1 indivisible, 2 divisible, 5 non-fungible.
    pub kind: u16,
    /// Property this one replaces or appends to; zero for none.
    pub previous: u32,
    /// Category text.
    pub category: String,
    /// Subcategory text.
    pub subcategory: String,
    /// Name text.
    pub name: String,
    /// URL text.
    pub url: String,
    /// Data text.
    pub data: String,
}

/// The protocol operation surface.
pub struct ProtocolApi {
    reader: StateReader,
    validator: AddressValidator,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    max_null_data: usize,
}

impl fmt::Debug for ProtocolApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolApi")
            .field("validator", &self.validator)
            .field("max_null_data", &self.max_null_data)
            .finish_non_exhaustive()
    }
}

impl ProtocolApi {
    /// Creates the API over committed engine state.
    pub fn new(
        reader: StateReader,
        validator: AddressValidator,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        max_null_data: usize,
    ) -> Self {
        Self {
            reader,
            validator,
            broadcaster,
            max_null_data,
        }
    }

    /// The address validator in use.
    pub fn validator(&self) -> &AddressValidator {
        &self.validator
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    /// Converts a raw base-chain address to its derived form.
    pub fn encode_address(&self, address: &str) -> Result<String> {
        let checked = self.validator.parse(address).map_err(|e| ApiError::address(&e))?;
        if checked.form != AddressForm::Raw {
            return Err(ApiError::InvalidAddress(format!(
                "'{address}' is already a derived address"
            )));
        }
        Ok(checked.base.encode_derived(self.validator.network())?)
    }

    /// Converts a derived address back to its raw base-chain form.
    pub fn decode_address(&self, address: &str) -> Result<String> {
        let checked = self.validator.parse(address).map_err(|e| ApiError::address(&e))?;
        if checked.form != AddressForm::Derived {
            return Err(ApiError::InvalidAddress(format!(
                "'{address}' is not a derived address"
            )));
        }
        Ok(checked.ledger.to_string())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Balance of one property. Either address form may be used.
    pub fn get_balance(&self, address: &str, property: u32) -> Result<BalanceView> {
        let ledger = self.query_address(address)?;
        let property = self.property(property)?;
        Ok(BalanceView::new(
            self.reader.balance(&ledger, property.id),
            property.divisible(),
        ))
    }

    /// Every non-empty balance of an address.
    pub fn get_all_balances(&self, address: &str) -> Result<BTreeMap<PropertyId, BalanceView>> {
        let ledger = self.query_address(address)?;
        let state = self.reader.current();
        Ok(state
            .tally
            .balances_of(&ledger)
            .into_iter()
            .filter(|(_, balance)| !balance.is_empty())
            .map(|(id, balance)| {
                let divisible = state.registry.get(id).is_some_and(Property::divisible);
                (id, BalanceView::new(balance, divisible))
            })
            .collect())
    }

    /// Pending and completed feature activations.
    pub fn get_activations(&self) -> ActivationsView {
        let state = self.reader.current();
        let height = state.height.unwrap_or(0);
        ActivationsView {
            pending: state.activations.pending(height).into_iter().cloned().collect(),
            completed: state.activations.completed(height).into_iter().cloned().collect(),
        }
    }

    /// What the ledger recorded for `txid`.
    pub fn get_transaction(&self, txid: &str) -> Result<TransactionView> {
        let id: Txid = txid
            .parse()
            .map_err(|_| ApiError::InvalidParameter(format!("'{txid}' is not a transaction id")))?;
        let record = self.reader.transaction(&id).ok_or_else(|| {
            ApiError::InvalidAddress("No information available about transaction".to_string())
        })?;
        Ok(TransactionView {
            txid: record.txid,
            valid: record.valid,
            invalid_reason: record.reason.as_ref().map(ToString::to_string),
            invalid_code: record.reason_code(),
            block: record.block,
            position: record.index,
            sending_address: self.validator.display(&record.sender),
            reference_address: record.reference.as_ref().map(|a| self.validator.display(a)),
            type_int: record.message.type_code(),
            version: record.message.version(),
        })
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    /// Sends `amount` of `property` from `from` to `to`.
    pub fn send(&self, from: &str, to: &str, property: u32, amount: &str) -> Result<Txid> {
        let [from, to] = self.operation_addresses([from, to])?;
        let property = self.property(property)?;
        let amount = self.amount(&property, amount)?;
        self.require_available(&from.ledger, &property, amount)?;

        let message = Message::SimpleSend {
            property: property.id,
            amount: amount.unsigned_abs(),
        };
        self.submit(&from, vec![to.ledger], &message)
    }

    /// Sends every available balance in `ecosystem` from `from` to `to`.
    pub fn send_all(&self, from: &str, to: &str, ecosystem: u8) -> Result<Txid> {
        let [from, to] = self.operation_addresses([from, to])?;
        let ecosystem = Ecosystem::from_u8(ecosystem)
            .ok_or_else(|| ApiError::InvalidParameter(format!("invalid ecosystem {ecosystem}")))?;

        let has_balance = self
            .reader
            .balances(&from.ledger)
            .iter()
            .any(|(id, balance)| id.ecosystem() == Some(ecosystem) && balance.available > 0);
        if !has_balance {
            return Err(ApiError::InsufficientFunds(format!(
                "sender has no available balance in the {ecosystem} ecosystem"
            )));
        }

        let message = Message::SendAll {
            ecosystem: ecosystem.as_u8(),
        };
        self.submit(&from, vec![to.ledger], &message)
    }

    /// Sends `property` to several receivers in one transaction.
    pub fn send_to_many(&self, from: &str, property: u32, receivers: &[(&str, &str)]) -> Result<Txid> {
        if receivers.is_empty() {
            return Err(ApiError::InvalidParameter("no receivers given".to_string()));
        }
        if receivers.len() > usize::from(u8::MAX) - 1 {
            return Err(ApiError::InvalidParameter(format!(
                "at most {} receivers per transaction",
                u8::MAX - 1
            )));
        }

        let mut addresses = Vec::with_capacity(1 + receivers.len());
        addresses.push(from);
        addresses.extend(receivers.iter().map(|(address, _)| *address));
        let checked = self
            .validator
            .check_operation(&addresses)
            .map_err(|e| ApiError::address(&e))?;

        let property = self.property(property)?;
        let mut outputs = Vec::with_capacity(receivers.len());
        let mut total: Amount = 0;
        for (i, (_, amount)) in receivers.iter().enumerate() {
            let amount = self.amount(&property, amount)?;
            total = total
                .checked_add(amount)
                .ok_or_else(|| ApiError::InvalidAmount("total amount out of range".to_string()))?;
            outputs.push(ManyOutput {
                // the carrier sits at index 0
                output_index: (i + 1) as u8,
                amount: amount.unsigned_abs(),
            });
        }
        self.require_available(&checked[0].ledger, &property, total)?;

        let message = Message::SendToMany {
            property: property.id,
            outputs,
        };
        let receivers = checked[1..].iter().map(|c| c.ledger.clone()).collect();
        self.submit(&checked[0], receivers, &message)
    }

    /// Distributes `amount` of `property` to the holders of `source`, or
    /// of `property` itself when `source` is `None`.
    pub fn send_sto(&self, from: &str, property: u32, amount: &str, source: Option<u32>) -> Result<Txid> {
        let [from] = self.operation_addresses([from])?;
        let property = self.property(property)?;
        let source = source.map(|id| self.property(id)).transpose()?;
        let amount = self.amount(&property, amount)?;
        self.require_available(&from.ledger, &property, amount)?;

        let message = Message::SendToOwners {
            property: property.id,
            amount: amount.unsigned_abs(),
            source: source.map(|p| p.id),
        };
        self.submit(&from, Vec::new(), &message)
    }

    // ------------------------------------------------------------------
    // Issuance
    // ------------------------------------------------------------------

    /// Issues a new fixed-supply property.
    pub fn send_issuance_fixed(&self, issuer: &str, request: &IssuanceRequest, amount: &str) -> Result<Txid> {
        let [issuer] = self.operation_addresses([issuer])?;
        let header = self.issuance_header(request)?;
        let kind = PropertyKind::from_wire(request.kind).ok_or_else(|| {
            ApiError::InvalidParameter(format!("invalid property type {}", request.kind))
        })?;
        if kind == PropertyKind::NonFungible {
            return Err(ApiError::InvalidParameter(
                "non-fungible properties must be issued as managed".to_string(),
            ));
        }
        let amount = parse_amount(amount, kind == PropertyKind::Divisible)?;
        if amount <= 0 {
            return Err(ApiError::InvalidAmount("amount must be positive".to_string()));
        }

        let message = Message::CreateFixed {
            header,
            amount: amount.unsigned_abs(),
        };
        self.submit(&issuer, Vec::new(), &message)
    }

    // ------------------------------------------------------------------
    // Governance
    // ------------------------------------------------------------------

    /// Schedules a feature activation.
    pub fn send_activation(
        &self,
        from: &str,
        feature: u16,
        activation_height: BlockHeight,
        min_client_version: u32,
    ) -> Result<Txid> {
        let [from] = self.operation_addresses([from])?;
        if let Some(height) = self.reader.height() {
            if activation_height <= height {
                return Err(ApiError::InvalidParameter(format!(
                    "activation height {activation_height} is not above the current height {height}"
                )));
            }
        }

        let message = Message::Activation {
            feature,
            activation_height,
            min_client_version,
        };
        self.submit(&from, Vec::new(), &message)
    }

    /// Publishes an alert.
    pub fn send_alert(&self, from: &str, alert_type: u16, expiry_value: u32, message: &str) -> Result<Txid> {
        let [from] = self.operation_addresses([from])?;
        AlertKind::from_wire(alert_type)
            .map_err(|_| ApiError::InvalidParameter(format!("invalid alert type {alert_type}")))?;
        validate_text_field("message", message)
            .map_err(|e| ApiError::InvalidParameter(e.to_string()))?;

        let message = Message::Alert {
            alert_type,
            expiry_value,
            message: message.to_string(),
        };
        self.submit(&from, Vec::new(), &message)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn query_address(&self, address: &str) -> Result<Address> {
        self.validator
            .check_query(address)
            .map_err(|e| ApiError::address(&e))
    }

    fn operation_addresses<const N: usize>(&self, addresses: [&str; N]) -> Result<[CheckedAddress; N]> {
        let checked = self
            .validator
            .check_operation(&addresses)
            .map_err(|e| ApiError::address(&e))?;
        checked
            .try_into()
            .map_err(|_| ApiError::Internal("address count changed during validation".to_string()))
    }

    fn property(&self, id: u32) -> Result<Property> {
        self.reader.property(PropertyId(id)).ok_or_else(|| {
            ApiError::InvalidParameter("Property identifier does not exist".to_string())
        })
    }

    fn amount(&self, property: &Property, input: &str) -> Result<Amount> {
        let amount = parse_amount(input, property.divisible())?;
        if amount <= 0 {
            return Err(ApiError::InvalidAmount("amount must be positive".to_string()));
        }
        Ok(amount)
    }

    fn require_available(&self, address: &Address, property: &Property, amount: Amount) -> Result<()> {
        let available = self.reader.balance(address, property.id).available;
        if available < amount {
            return Err(ApiError::InsufficientFunds(format!(
                "sender has {} of property {}, {} needed",
                format_amount(available, property.divisible()),
                property.id,
                format_amount(amount, property.divisible())
            )));
        }
        Ok(())
    }

    fn issuance_header(&self, request: &IssuanceRequest) -> Result<IssuanceHeader> {
        if Ecosystem::from_u8(request.ecosystem).is_none() {
            return Err(ApiError::InvalidParameter(format!(
                "invalid ecosystem {}",
                request.ecosystem
            )));
        }
        if request.name.is_empty() {
            return Err(ApiError::InvalidParameter("property name is empty".to_string()));
        }
        for (field, value) in [
            ("category", &request.category),
            ("subcategory", &request.subcategory),
            ("name", &request.name),
            ("url", &request.url),
            ("data", &request.data),
        ] {
            validate_text_field(field, value)
                .map_err(|e| ApiError::InvalidParameter(e.to_string()))?;
        }
        if request.previous != 0 {
            self.property(request.previous)?;
        }
        Ok(IssuanceHeader {
            ecosystem: request.ecosystem,
            kind: request.kind,
            previous: request.previous,
            category: request.category.clone(),
            subcategory: request.subcategory.clone(),
            name: request.name.clone(),
            url: request.url.clone(),
            data: request.data.clone(),
        })
    }

    fn submit(&self, sender: &CheckedAddress, receivers: Vec<Address>, message: &Message) -> Result<Txid> {
        let payload = message.encode()?;
        let data = embed_payload(&payload, self.max_null_data)?;
        let request = TransactionRequest {
            sender: sender.ledger.clone(),
            receivers,
            reference_amount: DUST_THRESHOLD,
            data,
        };
        let txid = self.broadcaster.broadcast(request)?;
        tracing::info!(
            %txid,
            sender = %sender.ledger,
            message = message.message_type().map_or("unknown", |t| t.name()),
            "protocol transaction broadcast"
        );
        Ok(txid)
    }
}
