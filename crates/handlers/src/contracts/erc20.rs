//! Events of the ink! ERC-20 example contract.

use parity_scale_codec::{Decode, DecodeAll, Encode};

use sluice_core::error::{DomainError, DomainResult};

/// The contract's event enum, SCALE-encoded in `ContractEmitted.data`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Erc20Event {
    #[codec(index = 0)]
    Transfer {
        from: Option<[u8; 32]>,
        to: Option<[u8; 32]>,
        value: u128,
    },
    #[codec(index = 1)]
    Approval {
        owner: [u8; 32],
        spender: [u8; 32],
        value: u128,
    },
}

/// Decode an event payload; trailing bytes are an error.
pub fn decode_event(data: &[u8]) -> DomainResult<Erc20Event> {
    Erc20Event::decode_all(&mut &data[..])
        .map_err(|e| DomainError::DecodingError(format!("ink! ERC-20 event: {}", e)))
}
