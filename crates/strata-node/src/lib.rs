//! # Strata Node
//!
//! Operator surface of a Strata node: configuration, logging, the address
//! safety validator, the protocol operations and the replay binary.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        Strata Node                         │
//! ├────────────────────────────────────────────────────────────┤
//! │  ProtocolApi                                               │
//! │  • address safety checks (AddressValidator)                │
//! │  • balance, activation and transaction queries             │
//! │  • send / send_all / send_to_many / send_sto / issuance    │
//! │  • activation and alert messages                           │
//! │        │ TransactionRequest               ▲ StateReader    │
//! │        ▼                                  │                │
//! │  TransactionBroadcaster           strata-consensus Engine  │
//! │  (base-chain wallet)                      ▲                │
//! │                                           │ blocks         │
//! │                                     BlockSource            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin strata-node -- --network regtest --blocks blocks.jsonl
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Protocol operations and transaction requests
//! - [`config`] - Layered node configuration
//! - [`error`] - Caller-facing errors and their numeric codes
//! - [`node`] - Store, engine and API assembly
//! - [`observability`] - Logging setup
//! - [`validation`] - Address safety validator

pub mod api;
pub mod config;
pub mod error;
pub mod node;
pub mod observability;
pub mod validation;

pub use api::{
    ActivationsView, BalanceView, IssuanceRequest, MemoryBroadcaster, ProtocolApi,
    TransactionBroadcaster, TransactionRequest, TransactionView,
};
pub use config::{AuthorizationConfig, AuthorizationMode, NodeConfig, StorageBackend};
pub use error::{ApiError, Result};
pub use node::Node;
pub use validation::{AddressValidator, CheckedAddress};
