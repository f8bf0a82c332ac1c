//! Domain and wire types for the REKT contract, subgraph and chat service
//!
//! # Design Principles
//! 1. Big integers (wei amounts, prices, 64-bit timestamps) travel as decimal
//!    strings on the wire and are never emitted as JSON numbers
//! 2. Subgraph entities keep numeric fields as the indexed strings
//! 3. Chat payloads carry a schema tag so their shape cannot drift silently
//! 4. Wire names are camelCase, matching the web client

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub use crate::market::state::{MarketPhase, MarketState};

// ============================================================================
// Decimal-string codec
// ============================================================================

/// Serde helpers emitting integers as decimal strings.
/// Deserialization accepts either a decimal string or a JSON integer.
pub mod decimal {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrInt {
        Str(String),
        Unsigned(u64),
        Signed(i64),
    }

    impl StrOrInt {
        fn parse<T: FromStr>(self) -> Result<T, String>
        where
            T::Err: fmt::Display,
        {
            let text = match self {
                StrOrInt::Str(s) => s,
                StrOrInt::Unsigned(n) => n.to_string(),
                StrOrInt::Signed(n) => n.to_string(),
            };
            text.trim().parse::<T>().map_err(|e| format!("invalid integer '{}': {}", text, e))
        }
    }

    pub fn serialize<T: fmt::Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, T, D>(d: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
        D: Deserializer<'de>,
    {
        StrOrInt::deserialize(d)?.parse().map_err(serde::de::Error::custom)
    }

    /// Same codec for optional fields (`null` / missing -> `None`)
    pub mod option {
        use super::*;

        pub fn serialize<T: fmt::Display, S: Serializer>(
            value: &Option<T>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(&v.to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, T, D>(d: D) -> Result<Option<T>, D::Error>
        where
            T: FromStr,
            T::Err: fmt::Display,
            D: Deserializer<'de>,
        {
            match Option::<StrOrInt>::deserialize(d)? {
                Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

// ============================================================================
// Address
// ============================================================================

/// 20-byte account address, rendered as lowercase `0x` hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

/// Rejected address text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address '{0}' is missing the 0x prefix")]
    MissingPrefix(String),
    #[error("address '{0}' must have 40 hex digits")]
    Length(String),
    #[error("address '{input}' is not valid hex: {reason}")]
    InvalidHex { input: String, reason: String },
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(s.to_string()))?;
        if body.len() != 40 {
            return Err(AddressError::Length(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(body, &mut bytes).map_err(|e| AddressError::InvalidHex {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Contract snapshots
// ============================================================================

/// Point-in-time snapshot of `markets(marketId)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub market_id: u64,
    pub name: String,
    /// Epoch seconds
    pub start_time: i64,
    /// Epoch seconds
    pub deadline: i64,
    /// Wei
    #[serde(with = "decimal")]
    pub entrance_fee: u128,
    #[serde(with = "decimal")]
    pub final_price: u128,
    /// Accumulated pool, wei
    #[serde(with = "decimal")]
    pub total_amount: u128,
    pub settled: bool,
}

/// `getPlayerData(marketId, player)` result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub player: Address,
    #[serde(with = "decimal")]
    pub prediction_price: u128,
    /// Participation time, zero when the player never joined
    pub timestamp: i64,
    /// bytes32 as `0x` hex
    pub data: String,
    pub has_participated: bool,
}

// ============================================================================
// Subgraph entities
// ============================================================================

fn parse_secs(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok()
}

/// `MarketCreated` event
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCreatedEvent {
    pub id: String,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub start_time: String,
    pub deadline: String,
    #[serde(default)]
    pub entrance_fee: Option<String>,
    #[serde(default)]
    pub block_timestamp: Option<String>,
    pub block_number: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

impl MarketCreatedEvent {
    pub fn block_timestamp_secs(&self) -> Option<i64> {
        self.block_timestamp.as_deref().and_then(parse_secs)
    }

    pub fn start_time_secs(&self) -> Option<i64> {
        parse_secs(&self.start_time)
    }
}

/// `MarketParticipation` event
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParticipationEvent {
    pub id: String,
    pub market_id: String,
    pub player: String,
    pub prediction_price: String,
    pub block_timestamp: String,
    pub block_number: String,
    pub transaction_hash: String,
}

/// `MarketSettled` event
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSettledEvent {
    pub id: String,
    pub market_id: String,
    pub final_price: String,
    pub prediction_price: String,
    pub total_amount: String,
    pub winner: String,
    pub block_timestamp: String,
    pub block_number: String,
    pub transaction_hash: String,
}

/// `WithdrawBalance` event
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawBalanceEvent {
    pub id: String,
    pub user: String,
    pub amount: String,
    pub block_timestamp: String,
    pub block_number: String,
    pub transaction_hash: String,
}

/// `OwnershipTransferred` event
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipTransferredEvent {
    pub id: String,
    pub previous_owner: String,
    pub new_owner: String,
    pub block_timestamp: String,
    pub block_number: String,
    pub transaction_hash: String,
}

// ============================================================================
// Chat service
// ============================================================================

/// Versioned prediction-chat payload (`chatData`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum ChatPayload {
    /// A submitted price prediction
    #[serde(rename = "prediction/v1", rename_all = "camelCase")]
    PredictionV1 {
        market_id: u64,
        #[serde(with = "decimal")]
        prediction_price: u128,
        #[serde(with = "decimal")]
        timestamp: i64,
    },
}

/// Untagged payload written by older web clients
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyPrediction {
    market_id: u64,
    #[serde(with = "decimal")]
    prediction_price: u128,
    #[serde(with = "decimal")]
    timestamp: i64,
}

impl ChatPayload {
    /// Parse a `chatData` value; untagged legacy payloads upgrade to v1
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("schema").is_some() {
            return serde_json::from_value(value);
        }
        let legacy: LegacyPrediction = serde_json::from_value(value)?;
        Ok(ChatPayload::PredictionV1 {
            market_id: legacy.market_id,
            prediction_price: legacy.prediction_price,
            timestamp: legacy.timestamp,
        })
    }

    pub fn market_id(&self) -> Option<u64> {
        match self {
            ChatPayload::PredictionV1 { market_id, .. } => Some(*market_id),
        }
    }
}

/// Chat row as returned by the service
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_data: ChatPayload,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(with = "decimal")]
    pub timestamp: i64,
    pub user_address: String,
    #[serde(default)]
    pub market_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Create/update body for `/api/chats`
///
/// Every field is optional on the wire so the service can answer 400 for
/// missing ones instead of failing deserialization.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_address: Option<String>,
}

impl NewChat {
    /// Chat announcing a confirmed prediction
    pub fn prediction(
        user: Address,
        market_id: u64,
        prediction_price: u128,
        timestamp: i64,
    ) -> serde_json::Result<Self> {
        let payload = ChatPayload::PredictionV1 { market_id, prediction_price, timestamp };
        Ok(Self {
            id: None,
            chat_data: Some(serde_json::to_value(payload)?),
            image_url: None,
            timestamp: Some(timestamp),
            user_address: Some(user.to_string()),
        })
    }
}

/// Pagination block of list responses
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// `GET /api/chats` list response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatPage {
    pub chats: Vec<ChatMessage>,
    pub pagination: Pagination,
}

/// Off-chain market record (`/api/markets`)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRecord {
    #[serde(with = "decimal")]
    pub market_id: u64,
    #[serde(with = "decimal")]
    pub start_time: i64,
    #[serde(with = "decimal")]
    pub deadline: i64,
    #[serde(with = "decimal")]
    pub participation_fee: u128,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub chats: Vec<ChatMessage>,
}

/// Create/update body for `/api/markets`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMarketRecord {
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub market_id: Option<u64>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<i64>,
    #[serde(default, with = "decimal::option", skip_serializing_if = "Option::is_none")]
    pub participation_fee: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Wallet user record (`/api/users`)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub chats: Vec<ChatMessage>,
}

/// Create/update body for `/api/users`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

/// JSON error body returned by the service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
