//! Globally unique identifiers used throughout HashPerp.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! On-chain objects ([`Txid`], [`XOnlyKey`]) wrap their raw 32-byte encodings.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUIDv7-backed entity identifier.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a hash-rate derivative contract.
    ContractId,
    "ct:"
);

entity_id!(
    /// Identifier of a virtual transaction output.
    VtxoId,
    "vtxo:"
);

entity_id!(
    /// Identifier of a standing order in the book.
    OrderId,
    ""
);

entity_id!(
    /// Unique identifier for a user / trading account.
    UserId,
    ""
);

entity_id!(
    /// Identifier of a swap offer.
    SwapOfferId,
    "offer:"
);

entity_id!(
    /// Identifier of an escrowed pre-signed exit transaction.
    PreSignedExitId,
    "exit:"
);

entity_id!(
    /// Identifier of an append-only ledger entry.
    LedgerEntryId,
    "tx:"
);

impl OrderId {
    /// Extract the embedded timestamp (milliseconds since UNIX epoch) from UUIDv7.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes([
            0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
        ])
    }
}

// ---------------------------------------------------------------------------
// Txid
// ---------------------------------------------------------------------------

/// A Bitcoin transaction id in internal byte order.
///
/// Displayed the way Bitcoin Core prints it: byte-reversed hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Txid(pub [u8; 32]);

impl Txid {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse the display (byte-reversed) hex form.
    pub fn from_display_hex(s: &str) -> crate::Result<Self> {
        let raw = hex::decode(s)
            .map_err(|e| crate::HashPerpError::Serialization(format!("txid hex: {e}")))?;
        let mut bytes: [u8; 32] = raw.try_into().map_err(|_| {
            crate::HashPerpError::Serialization("txid must be 32 bytes".to_string())
        })?;
        bytes.reverse();
        Ok(Self(bytes))
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

// ---------------------------------------------------------------------------
// XOnlyKey
// ---------------------------------------------------------------------------

/// A BIP340 x-only public key (32 bytes), as registered by a user.
///
/// Curve validity is checked by the script crate when the key is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct XOnlyKey(pub [u8; 32]);

impl XOnlyKey {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for XOnlyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
