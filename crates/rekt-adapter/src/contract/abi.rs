//! Minimal Solidity ABI codec
//!
//! Covers the types the REKT contract uses: `uint256`, `bool`, `address`,
//! `bytes32`, `string` and `address[]`. Amounts are carried as `u128`;
//! decoding a `uint256` that does not fit fails with `Overflow` instead of
//! truncating.
//!
//! # Source
//! - https://docs.soliditylang.org/en/latest/abi-spec.html

use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

use crate::types::Address;

const WORD: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("return data too short: need {needed} bytes, have {len}")]
    ShortData { needed: usize, len: usize },
    #[error("uint256 value does not fit in {0} bits")]
    Overflow(u32),
    #[error("invalid bool word")]
    InvalidBool,
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Argument value for call encoding
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Bool(bool),
    Address(Address),
    FixedBytes([u8; 32]),
    String(String),
}

/// keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// First four bytes of keccak-256 over the canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Encode arguments (head/tail layout)
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(v) => head.extend_from_slice(&uint_word(*v)),
            Token::Bool(b) => head.extend_from_slice(&uint_word(u128::from(*b))),
            Token::Address(addr) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(&addr.0);
                head.extend_from_slice(&word);
            }
            Token::FixedBytes(bytes) => head.extend_from_slice(bytes),
            Token::String(s) => {
                let offset = (head_len + tail.len()) as u128;
                head.extend_from_slice(&uint_word(offset));
                tail.extend_from_slice(&uint_word(s.len() as u128));
                tail.extend_from_slice(s.as_bytes());
                tail.resize(tail.len() + padded_len(s.len()) - s.len(), 0);
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Selector followed by encoded arguments
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(tokens));
    data
}

/// `0x`-prefixed lowercase hex
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode `0x`-prefixed (or bare) hex
pub fn from_hex(s: &str) -> Result<Vec<u8>, AbiError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(body).map_err(|e| AbiError::InvalidHex(format!("{}: {}", s, e)))
}

/// JSON-RPC quantity encoding (`0x` + minimal hex)
pub fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Parse a JSON-RPC quantity
pub fn parse_quantity(s: &str) -> Result<u64, AbiError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    if body.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(body, 16).map_err(|e| AbiError::InvalidHex(format!("{}: {}", s, e)))
}

/// Sequential reader over return data
pub struct Decoder<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn word_at(&self, at: usize) -> Result<&'a [u8], AbiError> {
        let end = at.checked_add(WORD).ok_or(AbiError::Overflow(64))?;
        self.data
            .get(at..end)
            .ok_or(AbiError::ShortData { needed: end, len: self.data.len() })
    }

    fn next_word(&mut self) -> Result<&'a [u8], AbiError> {
        let word = self.word_at(self.cursor)?;
        self.cursor += WORD;
        Ok(word)
    }

    fn word_to_u128(word: &[u8]) -> Result<u128, AbiError> {
        if word[..16].iter().any(|b| *b != 0) {
            return Err(AbiError::Overflow(128));
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(buf))
    }

    fn word_to_usize(word: &[u8]) -> Result<usize, AbiError> {
        let value = Self::word_to_u128(word)?;
        usize::try_from(value).map_err(|_| AbiError::Overflow(usize::BITS))
    }

    pub fn uint(&mut self) -> Result<u128, AbiError> {
        Self::word_to_u128(self.next_word()?)
    }

    pub fn uint_u64(&mut self) -> Result<u64, AbiError> {
        u64::try_from(self.uint()?).map_err(|_| AbiError::Overflow(64))
    }

    /// uint256 holding epoch seconds
    pub fn timestamp(&mut self) -> Result<i64, AbiError> {
        i64::try_from(self.uint()?).map_err(|_| AbiError::Overflow(63))
    }

    pub fn bool(&mut self) -> Result<bool, AbiError> {
        match self.uint()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(AbiError::InvalidBool),
        }
    }

    pub fn address(&mut self) -> Result<Address, AbiError> {
        let word = self.next_word()?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Ok(Address(bytes))
    }

    pub fn bytes32(&mut self) -> Result<[u8; 32], AbiError> {
        let word = self.next_word()?;
        let mut out = [0u8; 32];
        out.copy_from_slice(word);
        Ok(out)
    }

    pub fn string(&mut self) -> Result<String, AbiError> {
        let offset = Self::word_to_usize(self.next_word()?)?;
        let len = Self::word_to_usize(self.word_at(offset)?)?;
        let start = offset + WORD;
        let end = start.checked_add(len).ok_or(AbiError::Overflow(64))?;
        let bytes = self
            .data
            .get(start..end)
            .ok_or(AbiError::ShortData { needed: end, len: self.data.len() })?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
    }

    pub fn address_array(&mut self) -> Result<Vec<Address>, AbiError> {
        let offset = Self::word_to_usize(self.next_word()?)?;
        let len = Self::word_to_usize(self.word_at(offset)?)?;
        let mut items = Decoder { data: self.data, cursor: offset + WORD };
        (0..len).map(|_| items.address()).collect()
    }
}
