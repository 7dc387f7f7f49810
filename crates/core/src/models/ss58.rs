//! SS58 address encoding.
//!
//! `base58(prefix || key || blake2b_512("SS58PRE" || prefix || key)[..2])`

use blake2::{Blake2b512, Digest};
use thiserror::Error;

use super::AccountId;

const CHECKSUM_PREFIX: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;

/// Errors raised while decoding an SS58 address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Ss58Error {
    #[error("invalid base58: {0}")]
    Base58(String),
    #[error("invalid address length {0}")]
    Length(usize),
    #[error("checksum mismatch")]
    Checksum,
    #[error("network prefix {found} does not match expected {expected}")]
    Prefix { expected: u16, found: u16 },
    #[error("unknown network {0}")]
    UnknownNetwork(String),
}

/// SS58 codec bound to one network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ss58Codec {
    prefix: u16,
}

impl Ss58Codec {
    /// Prefixes above 16383 are not representable.
    pub fn new(prefix: u16) -> Self {
        Self {
            prefix: prefix & 0x3fff,
        }
    }

    /// Look up a codec by well-known network name.
    pub fn for_network(name: &str) -> Result<Self, Ss58Error> {
        let prefix = match name {
            "polkadot" => 0,
            "kusama" => 2,
            "astar" | "shiden" | "shibuya" => 5,
            "substrate" => 42,
            "moonbeam" => 1284,
            "moonriver" => 1285,
            other => return Err(Ss58Error::UnknownNetwork(other.to_string())),
        };
        Ok(Self::new(prefix))
    }

    pub fn prefix(&self) -> u16 {
        self.prefix
    }

    /// Encode a 32-byte public key.
    pub fn encode(&self, account: &AccountId) -> String {
        let mut payload = prefix_bytes(self.prefix);
        payload.extend_from_slice(account.as_bytes());
        let checksum = checksum(&payload);
        payload.extend_from_slice(&checksum[..CHECKSUM_LEN]);
        bs58::encode(payload).into_string()
    }

    /// Decode an address, checking checksum and network prefix.
    pub fn decode(&self, address: &str) -> Result<AccountId, Ss58Error> {
        let (prefix, account) = Self::decode_any(address)?;
        if prefix != self.prefix {
            return Err(Ss58Error::Prefix {
                expected: self.prefix,
                found: prefix,
            });
        }
        Ok(account)
    }

    /// Decode an address of any network, returning its prefix.
    pub fn decode_any(address: &str) -> Result<(u16, AccountId), Ss58Error> {
        let data = bs58::decode(address)
            .into_vec()
            .map_err(|e| Ss58Error::Base58(e.to_string()))?;

        let (prefix, prefix_len) = match data.first() {
            Some(b) if b & 0b0100_0000 == 0 => (*b as u16, 1),
            Some(_) if data.len() >= 2 => {
                let lower = (data[0] << 2) | (data[1] >> 6);
                let upper = data[1] & 0b0011_1111;
                (lower as u16 | (upper as u16) << 8, 2)
            }
            _ => return Err(Ss58Error::Length(data.len())),
        };

        if data.len() != prefix_len + 32 + CHECKSUM_LEN {
            return Err(Ss58Error::Length(data.len()));
        }

        let body = &data[..prefix_len + 32];
        if checksum(body)[..CHECKSUM_LEN] != data[prefix_len + 32..] {
            return Err(Ss58Error::Checksum);
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&body[prefix_len..]);
        Ok((prefix, AccountId(key)))
    }
}

fn prefix_bytes(prefix: u16) -> Vec<u8> {
    if prefix < 64 {
        vec![prefix as u8]
    } else {
        vec![
            (((prefix & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000,
            ((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6),
        ]
    }
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(payload);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    fn alice() -> AccountId {
        AccountId::from_hex(ALICE).unwrap()
    }

    #[test]
    fn test_encode_known_networks() {
        let cases = [
            ("polkadot", "15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5"),
            ("kusama", "HNZata7iMYWmk5RvZRTiAsSDhV8366zq2YGb3tLH5Upf74F"),
            ("astar", "ajYMsCKsEAhEvHpeA4XqsfiA9v1CdzZPrCfS6pEfeGHW9j8"),
            ("substrate", "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"),
        ];
        for (network, expected) in cases {
            let codec = Ss58Codec::for_network(network).unwrap();
            assert_eq!(codec.encode(&alice()), expected, "{network}");
        }
    }

    #[test]
    fn test_two_byte_prefix() {
        let codec = Ss58Codec::for_network("moonriver").unwrap();
        let address = codec.encode(&alice());
        assert_eq!(address, "VkJhz5oK1f7Vg9RtfyWuHNU3quLboyyttHQ1rHKXavthLYwn6");
        assert_eq!(codec.decode(&address).unwrap(), alice());
    }

    #[test]
    fn test_decode_validates() {
        let kusama = Ss58Codec::new(2);
        let polkadot = Ss58Codec::new(0);
        let address = kusama.encode(&alice());

        assert_eq!(kusama.decode(&address).unwrap(), alice());
        assert_eq!(
            polkadot.decode(&address),
            Err(Ss58Error::Prefix {
                expected: 0,
                found: 2
            })
        );

        // Flip the last character to break the checksum
        let mut broken = address.clone();
        let last = broken.pop().unwrap();
        broken.push(if last == 'F' { 'G' } else { 'F' });
        assert!(kusama.decode(&broken).is_err());
    }

    #[test]
    fn test_unknown_network() {
        assert!(matches!(
            Ss58Codec::for_network("nowhere"),
            Err(Ss58Error::UnknownNetwork(_))
        ));
    }

    #[test]
    fn test_decode_any_reports_prefix() {
        let moonriver = Ss58Codec::for_network("moonriver").unwrap();
        let address = moonriver.encode(&alice());

        let (prefix, account) = Ss58Codec::decode_any(&address).unwrap();
        assert_eq!(prefix, 1285);
        assert_eq!(account, alice());
        assert!(Ss58Codec::decode_any("13000001-C-S-1").is_err());
    }
}
