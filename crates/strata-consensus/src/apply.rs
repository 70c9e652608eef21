//! Message application.
//!
//! Every handler checks all of its preconditions before touching the
//! state, so a rejected message leaves the state exactly as it was.

use strata_codec::{CrowdsaleTerms, IssuanceHeader, ManyOutput, Message, OrderTerms, ProtocolTransaction};
use strata_types::{Address, Amount, BlockHeight, Ecosystem, PropertyId};

use crate::activation::SenderAuthorization;
use crate::alert::{Alert, AlertKind};
use crate::crowdsale;
use crate::dex::Order;
use crate::distribution;
use crate::error::InvalidReason;
use crate::params::{ConsensusParams, Feature};
use crate::state::{
    CloseReason, Crowdsale, DistributionRecord, EngineState, IssuanceMode, LedgerError,
    Participation, Property, PropertyKind,
};

type Outcome = Result<(), InvalidReason>;

/// Block-level context of a transaction.
#[derive(Debug, Clone, Copy)]
pub struct TxContext<'a> {
    /// Network rules.
    pub params: &'a ConsensusParams,
    /// Governance authorization.
    pub auth: &'a dyn SenderAuthorization,
    /// Block height.
    pub height: BlockHeight,
    /// Block timestamp.
    pub time: u64,
    /// Position of the transaction in its block.
    pub index: u32,
}

/// Applies the message carried by `tx` to `state`.
pub fn apply(state: &mut EngineState, tx: &ProtocolTransaction, ctx: &TxContext<'_>) -> Outcome {
    match &tx.message {
        Message::SimpleSend { property, amount } => simple_send(state, tx, ctx, *property, *amount),
        Message::SendToOwners {
            property,
            amount,
            source,
        } => send_to_owners(state, tx, ctx, *property, *amount, *source),
        Message::SendAll { ecosystem } => send_all(state, tx, ctx, *ecosystem),
        Message::SendNonFungible {
            property,
            first,
            last,
        } => send_non_fungible(state, tx, ctx, *property, *first, *last),
        Message::SendToMany { property, outputs } => {
            send_to_many(state, tx, ctx, *property, outputs)
        }
        Message::Trade(terms) => trade(state, tx, ctx, terms),
        Message::CancelAtPrice(terms) => cancel_at_price(state, tx, ctx, terms),
        Message::CancelPair { for_sale, desired } => {
            cancel_pair(state, tx, ctx, *for_sale, *desired)
        }
        Message::CancelEcosystem { ecosystem } => cancel_ecosystem(state, tx, ctx, *ecosystem),
        Message::CreateFixed { header, amount } => create_fixed(state, tx, ctx, header, *amount),
        Message::CreateCrowdsale { header, terms } => {
            create_crowdsale(state, tx, ctx, header, terms)
        }
        Message::CloseCrowdsale { property } => close_crowdsale(state, tx, ctx, *property),
        Message::CreateManaged { header } => create_managed(state, tx, ctx, header),
        Message::Grant {
            property, amount, ..
        } => grant(state, tx, *property, *amount),
        Message::Revoke {
            property, amount, ..
        } => revoke(state, tx, *property, *amount),
        Message::ChangeIssuer { property } => change_issuer(state, tx, ctx, *property),
        Message::EnableFreezing { property } => enable_freezing(state, tx, ctx, *property),
        Message::DisableFreezing { property } => disable_freezing(state, tx, ctx, *property),
        Message::Freeze { property, .. } => freeze(state, tx, ctx, *property),
        Message::Unfreeze { property, .. } => unfreeze(state, tx, ctx, *property),
        Message::Activation {
            feature,
            activation_height,
            min_client_version,
        } => activation(state, tx, ctx, *feature, *activation_height, *min_client_version),
        Message::Alert {
            alert_type,
            expiry_value,
            message,
        } => alert(state, tx, ctx, *alert_type, *expiry_value, message),
        Message::Unrecognized { .. } => Ok(()),
    }
}

/// Housekeeping before a block's transactions: lapse stale orders and
/// close crowdsales whose deadline has passed.
pub fn begin_block(
    state: &mut EngineState,
    height: BlockHeight,
    time: u64,
) -> Result<(), LedgerError> {
    let expired = state.book.expire(&mut state.tally, height)?;
    for order in &expired {
        tracing::debug!(order = %order.txid, height, "order expired");
    }

    let due: Vec<PropertyId> = state
        .registry
        .active_crowdsales()
        .into_iter()
        .filter(|id| {
            state
                .registry
                .get(*id)
                .and_then(|p| p.crowdsale.as_ref())
                .is_some_and(|c| c.deadline < time)
        })
        .collect();
    for id in due {
        if state
            .registry
            .close_crowdsale(id, height, CloseReason::Deadline)
            .is_ok()
        {
            tracing::info!(property = %id, height, "crowdsale closed at deadline");
        }
    }
    Ok(())
}

fn positive(amount: u64) -> Result<Amount, InvalidReason> {
    match amount {
        0 => Err(InvalidReason::ZeroAmount),
        v => Amount::try_from(v).map_err(|_| InvalidReason::AmountOutOfRange),
    }
}

fn ecosystem(byte: u8) -> Result<Ecosystem, InvalidReason> {
    Ecosystem::from_u8(byte).ok_or(InvalidReason::InvalidEcosystem(byte))
}

fn reference(tx: &ProtocolTransaction) -> Result<&Address, InvalidReason> {
    tx.reference.as_ref().ok_or(InvalidReason::MissingReference)
}

fn spendable(state: &EngineState, address: &Address, property: PropertyId, amount: Amount) -> Outcome {
    if state.tally.is_frozen(address, property) {
        return Err(InvalidReason::SenderFrozen(property));
    }
    let available = state.tally.available(address, property);
    if available < amount {
        return Err(InvalidReason::InsufficientBalance {
            available,
            required: amount,
        });
    }
    Ok(())
}

fn fungible(state: &EngineState, property: PropertyId) -> Result<&Property, InvalidReason> {
    let entry = state.registry.require(property)?;
    if entry.non_fungible() {
        return Err(InvalidReason::NonFungibleProperty(property));
    }
    Ok(entry)
}

fn issuer_managed<'s>(
    state: &'s EngineState,
    tx: &ProtocolTransaction,
    property: PropertyId,
) -> Result<&'s Property, InvalidReason> {
    let entry = state.registry.require(property)?;
    if !entry.managed() {
        return Err(InvalidReason::NotManaged(property));
    }
    if entry.issuer != tx.sender {
        return Err(InvalidReason::NotIssuer(property));
    }
    Ok(entry)
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

fn simple_send(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
    amount: u64,
) -> Outcome {
    let amount = positive(amount)?;
    fungible(state, property)?;
    let receiver = reference(tx)?.clone();
    spendable(state, &tx.sender, property, amount)?;

    let sale = state
        .registry
        .active_crowdsale_of(&receiver)
        .filter(|_| receiver != tx.sender)
        .and_then(|id| state.registry.get(id))
        .and_then(|p| {
            let c = p.crowdsale.as_ref()?;
            (c.desired == property).then(|| {
                let divisible = state.registry.get(property).is_some_and(Property::divisible);
                (p.id, crowdsale::issuance(c, amount, divisible, ctx.time, p.headroom()))
            })
        });

    state.tally.transfer(&tx.sender, &receiver, property, amount)?;

    if let Some((id, issued)) = sale {
        state.mint(id, &tx.sender, issued.tokens)?;
        state.mint(id, &receiver, issued.issuer_tokens)?;
        if let Some(c) = state.registry.get_mut(id).and_then(|p| p.crowdsale.as_mut()) {
            c.participations.push(Participation {
                txid: tx.txid,
                block: ctx.height,
                participant: tx.sender.clone(),
                contributed: amount,
                tokens: issued.tokens,
                issuer_tokens: issued.issuer_tokens,
            });
        }
        if issued.exhausted {
            state
                .registry
                .close_crowdsale(id, ctx.height, CloseReason::MaxTokens)?;
        }
        tracing::debug!(property = %id, tokens = issued.tokens, "crowdsale participation");
    }
    Ok(())
}

fn send_to_owners(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
    amount: u64,
    source: Option<PropertyId>,
) -> Outcome {
    if source.is_some() {
        state
            .activations
            .require(Feature::CrossPropertyDistribution, ctx.height)?;
    }
    let amount = positive(amount)?;
    fungible(state, property)?;
    let source = source.unwrap_or(property);
    state.registry.require(source)?;
    spendable(state, &tx.sender, property, amount)?;

    let plan = distribution::plan(&state.tally, source, amount)?;
    distribution::execute(&mut state.tally, &tx.sender, property, amount, &plan)?;

    state.records.distributions.insert(
        tx.txid,
        DistributionRecord {
            txid: tx.txid,
            block: ctx.height,
            sender: tx.sender.clone(),
            property,
            source,
            total: amount,
            payouts: plan.payouts,
            remainder: plan.remainder,
        },
    );
    Ok(())
}

fn send_all(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    ecosystem_byte: u8,
) -> Outcome {
    state.activations.require(Feature::SendAll, ctx.height)?;
    let eco = ecosystem(ecosystem_byte)?;
    let receiver = reference(tx)?.clone();

    let moves: Vec<(PropertyId, Amount)> = state
        .tally
        .balances_of(&tx.sender)
        .into_iter()
        .filter(|(p, b)| {
            p.ecosystem() == Some(eco)
                && b.available > 0
                && !state.tally.is_frozen(&tx.sender, *p)
                && state.registry.get(*p).is_some_and(|e| !e.non_fungible())
        })
        .map(|(p, b)| (p, b.available))
        .collect();
    if moves.is_empty() {
        return Err(InvalidReason::NothingToSend);
    }
    for (property, amount) in moves {
        state.tally.transfer(&tx.sender, &receiver, property, amount)?;
    }
    Ok(())
}

fn send_non_fungible(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
    first: u64,
    last: u64,
) -> Outcome {
    state.activations.require(Feature::NonFungible, ctx.height)?;
    let entry = state.registry.require(property)?;
    if !entry.non_fungible() {
        return Err(InvalidReason::FungibleProperty(property));
    }
    if first == 0 || first > last {
        return Err(InvalidReason::InvalidTokenRange { first, last });
    }
    let count = Amount::try_from(last - first + 1).map_err(|_| InvalidReason::AmountOutOfRange)?;
    let receiver = reference(tx)?.clone();
    spendable(state, &tx.sender, property, count)?;
    if !state.tokens.owns(property, first, last, &tx.sender) {
        return Err(InvalidReason::TokenRangeNotOwned { first, last });
    }

    state.tally.transfer(&tx.sender, &receiver, property, count)?;
    state.tokens.transfer(property, first, last, &receiver);
    Ok(())
}

fn send_to_many(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
    outputs: &[ManyOutput],
) -> Outcome {
    state.activations.require(Feature::SendToMany, ctx.height)?;
    fungible(state, property)?;
    if outputs.is_empty() {
        return Err(InvalidReason::NoReceivers);
    }
    let mut total: Amount = 0;
    let mut legs = Vec::with_capacity(outputs.len());
    for output in outputs {
        let amount = positive(output.amount)?;
        let receiver = tx
            .output_address(usize::from(output.output_index))
            .ok_or(InvalidReason::InvalidOutputIndex(output.output_index))?;
        total = total
            .checked_add(amount)
            .ok_or(InvalidReason::AmountOutOfRange)?;
        legs.push((receiver.clone(), amount));
    }
    spendable(state, &tx.sender, property, total)?;

    for (receiver, amount) in legs {
        state.tally.transfer(&tx.sender, &receiver, property, amount)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DEX
// ---------------------------------------------------------------------------

fn trade(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    terms: &OrderTerms,
) -> Outcome {
    state.activations.require(Feature::Dex, ctx.height)?;
    if terms.for_sale == terms.desired {
        return Err(InvalidReason::SamePropertyTrade);
    }
    let offered = fungible(state, terms.for_sale)?.ecosystem();
    let wanted = fungible(state, terms.desired)?.ecosystem();
    if offered != wanted {
        return Err(InvalidReason::CrossEcosystem);
    }
    let amount_for_sale = positive(terms.amount_for_sale)?;
    let amount_desired = positive(terms.amount_desired)?;
    spendable(state, &tx.sender, terms.for_sale, amount_for_sale)?;

    let order = Order {
        txid: tx.txid,
        address: tx.sender.clone(),
        block: ctx.height,
        index: ctx.index,
        for_sale: terms.for_sale,
        amount_for_sale,
        desired: terms.desired,
        amount_desired,
        remaining: amount_for_sale,
        expires_at: None,
    };
    let outcome = state.book.place(
        &mut state.tally,
        order,
        ctx.height,
        ctx.params.order_expiry_blocks,
    )?;
    tracing::debug!(
        order = %tx.txid,
        fills = outcome.fills.len(),
        rested = outcome.rested,
        released = outcome.released,
        makers_released = outcome.makers_released.len(),
        "order placed"
    );
    state.records.trades.extend(outcome.fills);
    Ok(())
}

fn cancel_matching(state: &mut EngineState, predicate: impl Fn(&Order) -> bool) -> Outcome {
    if !state.book.orders().any(&predicate) {
        return Err(InvalidReason::NoOrdersToCancel);
    }
    state.book.cancel_where(&mut state.tally, predicate)?;
    Ok(())
}

fn cancel_at_price(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    terms: &OrderTerms,
) -> Outcome {
    state.activations.require(Feature::Dex, ctx.height)?;
    let amount_for_sale = positive(terms.amount_for_sale)?;
    let amount_desired = positive(terms.amount_desired)?;
    let sender = tx.sender.clone();
    let (for_sale, desired) = (terms.for_sale, terms.desired);
    cancel_matching(state, |o| {
        o.address == sender
            && o.for_sale == for_sale
            && o.desired == desired
            && o.has_price(amount_for_sale, amount_desired)
    })
}

fn cancel_pair(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    for_sale: PropertyId,
    desired: PropertyId,
) -> Outcome {
    state.activations.require(Feature::Dex, ctx.height)?;
    let sender = tx.sender.clone();
    cancel_matching(state, |o| {
        o.address == sender && o.for_sale == for_sale && o.desired == desired
    })
}

fn cancel_ecosystem(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    ecosystem_byte: u8,
) -> Outcome {
    state.activations.require(Feature::Dex, ctx.height)?;
    let eco = ecosystem(ecosystem_byte)?;
    let sender = tx.sender.clone();
    cancel_matching(state, |o| {
        o.address == sender && o.for_sale.ecosystem() == Some(eco)
    })
}

// ---------------------------------------------------------------------------
// Issuance
// ---------------------------------------------------------------------------

fn check_header(
    state: &EngineState,
    ctx: &TxContext<'_>,
    header: &IssuanceHeader,
) -> Result<(Ecosystem, PropertyKind), InvalidReason> {
    let eco = ecosystem(header.ecosystem)?;
    let kind = PropertyKind::from_wire(header.kind)
        .ok_or(InvalidReason::InvalidPropertyKind(header.kind))?;
    if kind == PropertyKind::NonFungible {
        state.activations.require(Feature::NonFungible, ctx.height)?;
    }
    if header.previous != 0 {
        return Err(InvalidReason::InvalidPreviousProperty(header.previous));
    }
    if header.name.is_empty() {
        return Err(InvalidReason::EmptyName);
    }
    state.registry.ensure_id_available(eco)?;
    Ok((eco, kind))
}

fn new_property(
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    header: &IssuanceHeader,
    kind: PropertyKind,
    mode: IssuanceMode,
) -> Property {
    Property {
        id: PropertyId::BASE_CURRENCY,
        issuer: tx.sender.clone(),
        kind,
        mode,
        category: header.category.clone(),
        subcategory: header.subcategory.clone(),
        name: header.name.clone(),
        url: header.url.clone(),
        data: header.data.clone(),
        issued: 0,
        destroyed: 0,
        creation_txid: tx.txid,
        creation_block: ctx.height,
        crowdsale: None,
        freezing_from: None,
        issuer_history: Vec::new(),
    }
}

fn create_fixed(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    header: &IssuanceHeader,
    amount: u64,
) -> Outcome {
    let (eco, kind) = check_header(state, ctx, header)?;
    if kind == PropertyKind::NonFungible {
        return Err(InvalidReason::InvalidPropertyKind(header.kind));
    }
    let amount = positive(amount)?;
    let id = state
        .registry
        .register(eco, new_property(tx, ctx, header, kind, IssuanceMode::Fixed))?;
    state.mint(id, &tx.sender, amount)?;
    tracing::info!(property = %id, issuer = %tx.sender, amount, "fixed property created");
    Ok(())
}

fn create_crowdsale(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    header: &IssuanceHeader,
    terms: &CrowdsaleTerms,
) -> Outcome {
    let (eco, kind) = check_header(state, ctx, header)?;
    if kind == PropertyKind::NonFungible {
        return Err(InvalidReason::InvalidPropertyKind(header.kind));
    }
    let desired = fungible(state, terms.desired)?;
    if desired.ecosystem() != Some(eco) {
        return Err(InvalidReason::CrossEcosystem);
    }
    if terms.tokens_per_unit == 0 {
        return Err(InvalidReason::ZeroTokensPerUnit);
    }
    if terms.deadline <= ctx.time {
        return Err(InvalidReason::DeadlinePassed);
    }
    if state.registry.active_crowdsale_of(&tx.sender).is_some() {
        return Err(InvalidReason::CrowdsaleAlreadyActive);
    }

    let mut property = new_property(tx, ctx, header, kind, IssuanceMode::Crowdsale);
    property.crowdsale = Some(Crowdsale {
        desired: terms.desired,
        tokens_per_unit: terms.tokens_per_unit,
        deadline: terms.deadline,
        early_bird: terms.early_bird,
        issuer_percentage: terms.issuer_percentage,
        active: true,
        closed_at: None,
        close_reason: None,
        participations: Vec::new(),
    });
    let id = state.registry.register(eco, property)?;
    tracing::info!(property = %id, issuer = %tx.sender, deadline = terms.deadline, "crowdsale opened");
    Ok(())
}

fn close_crowdsale(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
) -> Outcome {
    let entry = state.registry.require(property)?;
    if entry.issuer != tx.sender {
        return Err(InvalidReason::NotIssuer(property));
    }
    state
        .registry
        .close_crowdsale(property, ctx.height, CloseReason::Manual)
}

fn create_managed(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    header: &IssuanceHeader,
) -> Outcome {
    let (eco, kind) = check_header(state, ctx, header)?;
    let id = state
        .registry
        .register(eco, new_property(tx, ctx, header, kind, IssuanceMode::Managed))?;
    tracing::info!(property = %id, issuer = %tx.sender, "managed property created");
    Ok(())
}

fn grant(state: &mut EngineState, tx: &ProtocolTransaction, property: PropertyId, amount: u64) -> Outcome {
    let entry = issuer_managed(state, tx, property)?;
    let amount = positive(amount)?;
    if amount > entry.headroom() {
        return Err(InvalidReason::SupplyOverflow);
    }
    let non_fungible = entry.non_fungible();
    let receiver = tx.reference.clone().unwrap_or_else(|| tx.sender.clone());

    if non_fungible {
        let count = amount.unsigned_abs();
        state
            .tokens
            .mint(property, count, &receiver)
            .ok_or(InvalidReason::SupplyOverflow)?;
    }
    state.mint(property, &receiver, amount)
}

fn revoke(state: &mut EngineState, tx: &ProtocolTransaction, property: PropertyId, amount: u64) -> Outcome {
    let entry = issuer_managed(state, tx, property)?;
    if entry.non_fungible() {
        return Err(InvalidReason::NonFungibleProperty(property));
    }
    let amount = positive(amount)?;
    spendable(state, &tx.sender, property, amount)?;

    state.tally.debit(&tx.sender, property, amount)?;
    let entry = state.registry.require_mut(property)?;
    entry.destroyed += amount;
    Ok(())
}

fn change_issuer(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
) -> Outcome {
    let entry = state.registry.require(property)?;
    if entry.issuer != tx.sender {
        return Err(InvalidReason::NotIssuer(property));
    }
    if entry.crowdsale_active() {
        return Err(InvalidReason::CrowdsaleInProgress(property));
    }
    let receiver = reference(tx)?.clone();
    state
        .registry
        .change_issuer(property, receiver, ctx.height, ctx.index)
}

// ---------------------------------------------------------------------------
// Freezing
// ---------------------------------------------------------------------------

fn enable_freezing(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
) -> Outcome {
    state.activations.require(Feature::Freezing, ctx.height)?;
    if issuer_managed(state, tx, property)?.freezing_from.is_some() {
        return Err(InvalidReason::FreezingAlreadyEnabled(property));
    }
    let from = ctx.height.saturating_add(ctx.params.freeze_wait_blocks);
    state.registry.require_mut(property)?.freezing_from = Some(from);
    tracing::info!(property = %property, from, "freezing enabled");
    Ok(())
}

fn disable_freezing(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
) -> Outcome {
    state.activations.require(Feature::Freezing, ctx.height)?;
    if issuer_managed(state, tx, property)?.freezing_from.is_none() {
        return Err(InvalidReason::FreezingNotEnabled(property));
    }
    state.tally.unfreeze_all(property)?;
    state.registry.require_mut(property)?.freezing_from = None;
    tracing::info!(property = %property, "freezing disabled");
    Ok(())
}

fn freezing_target<'t>(
    state: &EngineState,
    tx: &'t ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
) -> Result<&'t Address, InvalidReason> {
    state.activations.require(Feature::Freezing, ctx.height)?;
    if !issuer_managed(state, tx, property)?.freezing_effective(ctx.height) {
        return Err(InvalidReason::FreezingNotEnabled(property));
    }
    reference(tx)
}

fn freeze(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
) -> Outcome {
    let target = freezing_target(state, tx, ctx, property)?.clone();
    if state.tally.is_frozen(&target, property) {
        return Err(InvalidReason::AlreadyFrozen(property));
    }
    state
        .book
        .cancel_where(&mut state.tally, |o| o.address == target && o.for_sale == property)?;
    state.tally.freeze(&target, property)?;
    tracing::info!(property = %property, address = %target, "address frozen");
    Ok(())
}

fn unfreeze(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    property: PropertyId,
) -> Outcome {
    let target = freezing_target(state, tx, ctx, property)?.clone();
    if !state.tally.is_frozen(&target, property) {
        return Err(InvalidReason::NotFrozen(property));
    }
    state.tally.unfreeze(&target, property)?;
    tracing::info!(property = %property, address = %target, "address unfrozen");
    Ok(())
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

fn activation(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    feature: u16,
    activation_height: BlockHeight,
    min_client_version: u32,
) -> Outcome {
    if !ctx.auth.may_activate(&tx.sender) {
        return Err(InvalidReason::Unauthorized);
    }
    let entry = state.activations.schedule(
        ctx.params,
        tx.txid,
        feature,
        activation_height,
        min_client_version,
        ctx.height,
    )?;
    tracing::info!(
        feature,
        name = %entry.name,
        activation_height,
        min_client_version,
        supported = entry.supported,
        "feature activation scheduled"
    );
    if !entry.supported {
        tracing::warn!(feature, activation_height, "scheduled feature is not supported by this client");
    }
    Ok(())
}

fn alert(
    state: &mut EngineState,
    tx: &ProtocolTransaction,
    ctx: &TxContext<'_>,
    alert_type: u16,
    expiry_value: u32,
    message: &str,
) -> Outcome {
    if !ctx.auth.may_alert(&tx.sender) {
        return Err(InvalidReason::Unauthorized);
    }
    let kind = AlertKind::from_wire(alert_type)?;
    tracing::warn!(sender = %tx.sender, ?kind, expiry_value, text = message, "network alert");
    state.alerts.insert(Alert {
        txid: tx.txid,
        sender: tx.sender.clone(),
        block: ctx.height,
        kind,
        expiry_value,
        message: message.to_string(),
    });
    Ok(())
}
