//! Error types for the HashPerp settlement engine.
//!
//! All errors use the `HP_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by kind:
//! - 1xx: Not found
//! - 2xx: Invalid lifecycle state (including version conflicts)
//! - 3xx: Unauthorized caller
//! - 4xx: Invalid parameters
//! - 5xx: Invalid signature
//! - 6xx: Chain oracle / broadcast
//! - 7xx: Inconsistent multi-step operation
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{
    ContractId, ContractStatus, LedgerEntryId, OrderId, OrderStatus, PreSignedExitId,
    SwapOfferId, SwapOfferStatus, Txid, UserId, VtxoId,
};

/// Central error enum for all HashPerp operations.
#[derive(Debug, Error)]
pub enum HashPerpError {
    // =================================================================
    // Not Found (1xx)
    // =================================================================
    #[error("HP_ERR_100: Contract not found: {0}")]
    ContractNotFound(ContractId),

    #[error("HP_ERR_101: VTXO not found: {0}")]
    VtxoNotFound(VtxoId),

    #[error("HP_ERR_102: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("HP_ERR_103: Swap offer not found: {0}")]
    SwapOfferNotFound(SwapOfferId),

    #[error("HP_ERR_104: Pre-signed exit not found: {0}")]
    PreSignedExitNotFound(PreSignedExitId),

    #[error("HP_ERR_105: Ledger entry not found: {0}")]
    LedgerEntryNotFound(LedgerEntryId),

    /// The user never registered a public key, so no script can name them.
    #[error("HP_ERR_106: No public key registered for user {0}")]
    PublicKeyNotFound(UserId),

    // =================================================================
    // Invalid State (2xx)
    // =================================================================
    /// The contract is not in a status that permits the operation.
    #[error("HP_ERR_200: Contract {contract_id} is {actual}, operation requires {required}")]
    InvalidContractStatus {
        contract_id: ContractId,
        actual: ContractStatus,
        required: &'static str,
    },

    #[error("HP_ERR_201: VTXO is not active: {0}")]
    VtxoNotActive(VtxoId),

    #[error("HP_ERR_202: Order {order_id} is {actual}, expected OPEN")]
    InvalidOrderStatus {
        order_id: OrderId,
        actual: OrderStatus,
    },

    #[error("HP_ERR_203: Swap offer {offer_id} is {actual}, expected OPEN")]
    InvalidOfferStatus {
        offer_id: SwapOfferId,
        actual: SwapOfferStatus,
    },

    /// Settlement is never early.
    #[error("HP_ERR_204: Contract {contract_id} expires at {expiry_height}, chain is at {current_height}")]
    SettlementNotDue {
        contract_id: ContractId,
        expiry_height: u64,
        current_height: u64,
    },

    #[error("HP_ERR_205: Exit path {path} not available: {reason}")]
    ExitPathUnavailable { path: String, reason: String },

    /// Sweep attempted too early and the contract is not SETTLEMENT_PENDING.
    #[error("HP_ERR_206: Sweep window closed for {vtxo_id}: {blocks_to_expiry} blocks to expiry")]
    SweepWindowClosed {
        vtxo_id: VtxoId,
        blocks_to_expiry: u64,
    },

    #[error("HP_ERR_207: Contract {contract_id} already has a {position} position")]
    PositionOccupied {
        contract_id: ContractId,
        position: String,
    },

    #[error("HP_ERR_208: Swap offer has expired: {0}")]
    SwapOfferExpired(SwapOfferId),

    #[error("HP_ERR_209: Pre-signed exit already used: {0}")]
    PreSignedExitUsed(PreSignedExitId),

    /// A VTXO was asked to transition twice.
    #[error("HP_ERR_210: Invalid VTXO transition for {vtxo_id}: {reason}")]
    InvalidVtxoTransition { vtxo_id: VtxoId, reason: String },

    /// Optimistic version check failed at the persistence boundary.
    #[error("HP_ERR_211: Concurrent modification of {entity} {id}")]
    VersionConflict { entity: &'static str, id: String },

    #[error("HP_ERR_212: Duplicate {entity} {id}")]
    Duplicate { entity: &'static str, id: String },

    // =================================================================
    // Unauthorized (3xx)
    // =================================================================
    #[error("HP_ERR_300: User {user_id} is not a participant in contract {contract_id}")]
    NotParticipant {
        contract_id: ContractId,
        user_id: UserId,
    },

    #[error("HP_ERR_301: User {user_id} does not own VTXO {vtxo_id}")]
    NotVtxoOwner { vtxo_id: VtxoId, user_id: UserId },

    #[error("HP_ERR_302: User {user_id} does not own order {order_id}")]
    NotOrderOwner { order_id: OrderId, user_id: UserId },

    #[error("HP_ERR_303: User {user_id} may not act on swap offer {offer_id}")]
    NotOfferParty {
        offer_id: SwapOfferId,
        user_id: UserId,
    },

    // =================================================================
    // Invalid Parameters (4xx)
    // =================================================================
    #[error("HP_ERR_400: Invalid {field}: {reason}")]
    InvalidParameters { field: &'static str, reason: String },

    // =================================================================
    // Invalid Signature (5xx)
    // =================================================================
    #[error("HP_ERR_500: Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    // =================================================================
    // Chain Oracle (6xx)
    // =================================================================
    /// Read against the chain oracle failed. Retryable.
    #[error("HP_ERR_600: Chain oracle unavailable during {operation}: {reason}")]
    OracleUnavailable { operation: String, reason: String },

    /// Broadcast was rejected or its outcome could not be confirmed.
    #[error("HP_ERR_601: Broadcast of {stage} transaction {txid} failed: {reason}")]
    BroadcastFailed {
        stage: String,
        txid: Txid,
        reason: String,
    },

    // =================================================================
    // Inconsistent (7xx)
    // =================================================================
    /// A multi-step operation partially completed and compensation failed too.
    #[error("HP_ERR_700: Inconsistent state after {operation}: {detail} [entities: {}]", .entities.join(", "))]
    Inconsistent {
        operation: &'static str,
        detail: String,
        entities: Vec<String>,
    },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("HP_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("HP_ERR_901: Serialization error: {0}")]
    Serialization(String),

    #[error("HP_ERR_902: Configuration error: {0}")]
    Configuration(String),

    #[error("HP_ERR_903: Persistence error: {0}")]
    Persistence(String),

    /// Script or transaction construction failed (bad key, oversize push).
    #[error("HP_ERR_904: Script error: {0}")]
    Script(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, HashPerpError>;

/// Coarse error taxonomy exposed to callers and the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Unauthorized,
    InvalidParameters,
    InvalidSignature,
    OracleUnavailable,
    BroadcastFailed,
    Inconsistent,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::InvalidState => write!(f, "INVALID_STATE"),
            Self::Unauthorized => write!(f, "UNAUTHORIZED"),
            Self::InvalidParameters => write!(f, "INVALID_PARAMETERS"),
            Self::InvalidSignature => write!(f, "INVALID_SIGNATURE"),
            Self::OracleUnavailable => write!(f, "ORACLE_UNAVAILABLE"),
            Self::BroadcastFailed => write!(f, "BROADCAST_FAILED"),
            Self::Inconsistent => write!(f, "INCONSISTENT"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl HashPerpError {
    /// Shorthand for [`HashPerpError::InvalidParameters`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field,
            reason: reason.into(),
        }
    }

    /// Map onto the coarse taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContractNotFound(_)
            | Self::VtxoNotFound(_)
            | Self::OrderNotFound(_)
            | Self::SwapOfferNotFound(_)
            | Self::PreSignedExitNotFound(_)
            | Self::LedgerEntryNotFound(_)
            | Self::PublicKeyNotFound(_) => ErrorKind::NotFound,

            Self::InvalidContractStatus { .. }
            | Self::VtxoNotActive(_)
            | Self::InvalidOrderStatus { .. }
            | Self::InvalidOfferStatus { .. }
            | Self::SettlementNotDue { .. }
            | Self::ExitPathUnavailable { .. }
            | Self::SweepWindowClosed { .. }
            | Self::PositionOccupied { .. }
            | Self::SwapOfferExpired(_)
            | Self::PreSignedExitUsed(_)
            | Self::InvalidVtxoTransition { .. }
            | Self::VersionConflict { .. }
            | Self::Duplicate { .. } => ErrorKind::InvalidState,

            Self::NotParticipant { .. }
            | Self::NotVtxoOwner { .. }
            | Self::NotOrderOwner { .. }
            | Self::NotOfferParty { .. } => ErrorKind::Unauthorized,

            Self::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            Self::InvalidSignature { .. } => ErrorKind::InvalidSignature,
            Self::OracleUnavailable { .. } => ErrorKind::OracleUnavailable,
            Self::BroadcastFailed { .. } => ErrorKind::BroadcastFailed,
            Self::Inconsistent { .. } => ErrorKind::Inconsistent,

            Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Persistence(_)
            | Self::Script(_) => ErrorKind::Internal,
        }
    }

    /// Oracle reads and broadcasts may be retried by the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::OracleUnavailable | ErrorKind::BroadcastFailed
        )
    }
}

impl From<serde_json::Error> for HashPerpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
