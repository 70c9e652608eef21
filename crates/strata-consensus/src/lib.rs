//! Strata Consensus Engine
//!
//! The deterministic state machine behind Strata. Every node that feeds the
//! same base-chain blocks through an [`Engine`] ends up with the same
//! [`EngineState`], and proves it by publishing the same consensus
//! fingerprints.
//!
//! # Components
//!
//! - [`Registry`]: issued properties, their supply and issuance terms
//! - [`Tally`]: per-address balances in available, reserved and frozen buckets
//! - [`OrderBook`]: token-for-token DEX orders, matched at the resting price
//! - [`distribution`]: send-to-owners payouts
//! - [`ActivationSet`]: feature switches and their activation heights
//! - [`fingerprint()`]: canonical digest of the ledger
//! - [`compat`]: the client compatibility gate
//! - [`Engine::sync`]: snapshot-plus-replay recovery from reorganizations
//!
//! # Block Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ BlockSource  │────▶│ Engine::sync │────▶│process_block │
//! │ (base chain) │     │ (reorg check)│     │              │
//! └──────────────┘     └──────┬───────┘     └──────┬───────┘
//!                             │ fork               │ clone committed state
//!                             ▼                    ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │ restore snap │     │ decode and   │
//!                      │ ≤ ancestor,  │     │ apply each tx│
//!                      │ replay       │     └──────┬───────┘
//!                      └──────────────┘            ▼
//!                                           ┌──────────────┐
//!                                           │ fingerprint, │
//!                                           │ swap, store  │
//!                                           └──────┬───────┘
//!                                                  ▼
//!                                           ┌──────────────┐
//!                                           │ compat gate  │──▶ halt
//!                                           └──────────────┘
//! ```
//!
//! Readers obtained through [`Engine::reader`] always see the last fully
//! committed block.

mod activation;
mod alert;
mod apply;
mod block;
pub mod compat;
pub mod crowdsale;
mod dex;
pub mod distribution;
mod engine;
mod error;
mod fingerprint;
mod genesis;
mod params;
mod state;
mod sync;

pub use activation::{
    Activation, ActivationSet, ActivationSource, AllowAny, AllowList, SenderAuthorization,
};
pub use alert::{Alert, AlertKind, AlertSet};
pub use apply::{apply, begin_block, TxContext};
pub use block::Block;
pub use dex::{Order, OrderBook, PlaceOutcome};
pub use engine::{BlockSummary, Engine, EngineEvent, StateReader};
pub use error::{EngineError, FatalError, InvalidReason, Result};
pub use fingerprint::{fingerprint, Checkpoint};
pub use genesis::{Genesis, GenesisAllocation};
pub use params::{client_version, ConsensusParams, EngineConfig, Feature, CLIENT_VERSION};
pub use state::{
    Balance, Bucket, CloseReason, Crowdsale, DistributionRecord, EngineState, IssuanceMode,
    IssuerChange, LedgerError, Participation, Payout, Property, PropertyKind, Records, Registry,
    SupplyMismatch, Tally, TokenRange, TokenRanges, TradeRecord, TxRecord,
};
pub use sync::{BlockSource, MemoryChain, SyncReport};
