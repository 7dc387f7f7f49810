//! Domain models shared by processors.
//!
//! These models are storage-agnostic and represent the canonical
//! form of processed data within the domain layer.

mod amount;
mod entity;
mod ss58;

pub use amount::{option_u128_str, u128_str};
pub use entity::{Entity, EntityMap};
pub use ss58::{Ss58Codec, Ss58Error};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Fixed-size byte newtypes
// =============================================================================

/// Macro to generate fixed-size byte newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed hex string
/// - `Display` trait implementation
/// - `From<[u8; N]>` implementation
macro_rules! bytes_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

bytes_newtype!(
    /// 32-byte block hash (Blake2-256).
    BlockHash, 32
);

bytes_newtype!(
    /// 32-byte account identifier (SS58 decoded public key).
    AccountId, 32
);

bytes_newtype!(
    /// 20-byte EVM address.
    H160, 20
);

bytes_newtype!(
    /// sha256 of a canonical schema descriptor.
    ///
    /// Two layouts of the same item kind have different fingerprints; the
    /// node adapter computes them from runtime metadata.
    SchemaFingerprint, 32
);

impl SchemaFingerprint {
    pub fn of_descriptor(descriptor: &str) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(descriptor.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

// =============================================================================
// Block Identification
// =============================================================================

/// A block addressed by height and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub hash: BlockHash,
}

/// Inclusive block range of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks in the range.
    pub fn len(&self) -> u64 {
        if self.to < self.from {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}..=#{}", self.from, self.to)
    }
}

// =============================================================================
// Item identifiers
// =============================================================================

/// Stable id of an event: `{height}-{index}-{hash prefix}`.
///
/// Height is zero-padded to 10 digits, index to 6, and the suffix is the
/// first five hex characters of the block hash. Ids sort by position.
pub fn event_id(height: u64, block_hash: &BlockHash, index: u32) -> String {
    let hash = hex::encode(block_hash.0);
    format!("{:010}-{:06}-{}", height, index, &hash[..5])
}

/// Stable id of a call: `{height}-{extrinsic index}`.
pub fn call_id(height: u64, extrinsic_index: u32) -> String {
    format!("{:010}-{:06}", height, extrinsic_index)
}

// =============================================================================
// Processor State
// =============================================================================

/// Processor cursor tracking progress.
///
/// The cursor tracks the last fully persisted block for a processor,
/// enabling it to resume from where it left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorCursor {
    /// Processor name.
    pub processor: String,
    /// Last fully processed block number.
    pub last_block: u64,
    /// Hash of that block.
    pub last_hash: BlockHash,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Convert a millisecond unix timestamp to a UTC datetime.
pub fn timestamp_from_millis(ms: u64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(ms).ok()?)
}

// =============================================================================
// Tests
// =============================================================================
