//! Parsing of RMRK 2.0.0 interactions carried in remarks.
//!
//! A message reads `RMRK::<OP>::2.0.0::<args>` where arguments are
//! separated by `::`. Only `MINT`, `SEND`, `BUY` and `BURN` are handled.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const PREFIX: &str = "RMRK";
pub const VERSION: &str = "2.0.0";

/// A remark that announces itself as RMRK 2.0.0 but can't be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RmrkError {
    #[error("{op} is missing argument {name}")]
    MissingArgument { op: &'static str, name: &'static str },

    #[error("MINT payload is not url-encoded UTF-8: {0}")]
    Encoding(String),

    #[error("MINT payload is not an NFT: {0}")]
    Payload(String),
}

/// The NFT fields carried by `MINT`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MintedNft {
    pub collection: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "transferable")]
    pub transferable: Option<bool>,
    #[serde(default)]
    pub sn: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
}

impl MintedNft {
    /// `{block}-{collection}-{symbol}-{sn}`, the id RMRK 2.0.0 assigns.
    pub fn id(&self, block: u64) -> String {
        format!(
            "{}-{}-{}-{}",
            block,
            self.collection,
            self.symbol.as_deref().unwrap_or_default(),
            self.sn.as_deref().unwrap_or_default()
        )
    }
}

/// `transferable` is a number in 2.0.0 (0 = soulbound) and a bool in
/// some older tooling.
fn transferable<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => Some(n.as_u64().is_none_or(|n| n != 0)),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RmrkMessage {
    Mint { nft: MintedNft, recipient: Option<String> },
    Send { id: String, recipient: String },
    Buy { id: String, recipient: Option<String> },
    Burn { id: String },
}

/// Parse a remark.
///
/// Returns `Ok(None)` for anything that isn't a handled RMRK 2.0.0
/// interaction.
pub fn parse(message: &str) -> Result<Option<RmrkMessage>, RmrkError> {
    let mut parts = message.split("::");
    let (Some(PREFIX), Some(op), Some(VERSION)) = (parts.next(), parts.next(), parts.next()) else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();
    let arg = |index: usize, name: &'static str, op: &'static str| {
        args.get(index)
            .filter(|a| !a.is_empty())
            .map(|a| a.to_string())
            .ok_or(RmrkError::MissingArgument { op, name })
    };
    let optional = |index: usize| args.get(index).filter(|a| !a.is_empty()).map(|a| a.to_string());

    let parsed = match op {
        "MINT" => {
            let payload = arg(0, "nft", "MINT")?;
            let json = urlencoding::decode(&payload).map_err(|e| RmrkError::Encoding(e.to_string()))?;
            let nft = serde_json::from_str(&json).map_err(|e| RmrkError::Payload(e.to_string()))?;
            RmrkMessage::Mint { nft, recipient: optional(1) }
        }
        "SEND" => RmrkMessage::Send {
            id: arg(0, "id", "SEND")?,
            recipient: arg(1, "recipient", "SEND")?,
        },
        "BUY" => RmrkMessage::Buy {
            id: arg(0, "id", "BUY")?,
            recipient: optional(1),
        },
        "BURN" => RmrkMessage::Burn { id: arg(0, "id", "BURN")? },
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NFT: &str = "%7B%22collection%22%3A%22KANBIRD%22%2C%22symbol%22%3A%22KB1%22%2C%22transferable%22%3A1%2C%22sn%22%3A%2200000001%22%2C%22metadata%22%3A%22ipfs%3A%2F%2Fipfs%2Fbafk%22%7D";

    #[test]
    fn test_mint_payload_and_id() {
        let msg = parse(&format!("RMRK::MINT::2.0.0::{}", NFT)).unwrap().unwrap();
        let RmrkMessage::Mint { nft, recipient } = msg else {
            panic!("expected a mint");
        };
        assert!(recipient.is_none());
        assert_eq!(nft.collection, "KANBIRD");
        assert_eq!(nft.transferable, Some(true));
        assert_eq!(nft.metadata.as_deref(), Some("ipfs://ipfs/bafk"));
        assert_eq!(nft.id(13_000_001), "13000001-KANBIRD-KB1-00000001");
    }

    #[test]
    fn test_mint_with_recipient() {
        let msg = parse(&format!("RMRK::MINT::2.0.0::{}::HxYz", NFT)).unwrap();
        assert!(matches!(msg, Some(RmrkMessage::Mint { recipient: Some(r), .. }) if r == "HxYz"));
    }

    #[test]
    fn test_send_buy_burn() {
        assert_eq!(
            parse("RMRK::SEND::2.0.0::1-C-S-1::HxYz").unwrap(),
            Some(RmrkMessage::Send { id: "1-C-S-1".into(), recipient: "HxYz".into() })
        );
        assert_eq!(
            parse("RMRK::BUY::2.0.0::1-C-S-1").unwrap(),
            Some(RmrkMessage::Buy { id: "1-C-S-1".into(), recipient: None })
        );
        assert_eq!(
            parse("RMRK::BURN::2.0.0::1-C-S-1").unwrap(),
            Some(RmrkMessage::Burn { id: "1-C-S-1".into() })
        );
    }

    #[test]
    fn test_other_remarks_are_ignored() {
        assert_eq!(parse("hello").unwrap(), None);
        assert_eq!(parse("RMRK::MINT::1.0.0::x").unwrap(), None);
        assert_eq!(parse("RMRK::EQUIP::2.0.0::1-C-S-1::base").unwrap(), None);
    }

    #[test]
    fn test_malformed_interactions() {
        assert_eq!(
            parse("RMRK::SEND::2.0.0::1-C-S-1").unwrap_err(),
            RmrkError::MissingArgument { op: "SEND", name: "recipient" }
        );
        assert!(matches!(parse("RMRK::MINT::2.0.0::%7Bnope"), Err(RmrkError::Payload(_))));
    }
}
