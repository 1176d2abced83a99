//! Truncated-hash key fields and the verbatim fields that accompany them.
//!
//! The composite indexes never store a full identifier except in the `fi`
//! family; everywhere else an 8-byte prefix of SHA-256 stands in for the
//! 32-byte event id, the 32-byte pubkey, or an arbitrary tag key or value.
//! Collisions are tolerated: the query planner re-validates every candidate
//! against the full record before returning it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Width of every truncated hash field.
pub const HASH_LEN: usize = 8;

/// Width of event ids and x-only public keys.
pub const SOURCE_LEN: usize = 32;

fn truncated(input: &[u8]) -> [u8; HASH_LEN] {
    let digest = Sha256::digest(input);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&digest[..HASH_LEN]);
    out
}

fn take_hash(buf: &mut &[u8], what: &str) -> Result<[u8; HASH_LEN]> {
    let (head, tail) = buf
        .split_at_checked(HASH_LEN)
        .ok_or_else(|| StoreError::Corruption(format!("short read decoding {what}")))?;
    *buf = tail;
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(head);
    Ok(out)
}

/// Truncated hash of a 32-byte event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdHash([u8; HASH_LEN]);

impl IdHash {
    pub fn from_id(id: &[u8]) -> Result<Self> {
        if id.len() != SOURCE_LEN {
            return Err(StoreError::Length(format!(
                "invalid id length, got {} require {SOURCE_LEN}",
                id.len()
            )));
        }
        Ok(Self(truncated(id)))
    }

    pub fn from_hex(id: &str) -> Result<Self> {
        Self::from_id(&hex::decode(id)?)
    }

    pub fn from_base64(id: &str) -> Result<Self> {
        Self::from_id(&URL_SAFE_NO_PAD.decode(id)?)
    }

    pub fn bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    pub fn read_from(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self(take_hash(buf, "id-hash")?))
    }
}

/// Truncated hash of a 32-byte x-only public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PubHash([u8; HASH_LEN]);

impl PubHash {
    pub fn from_pubkey(pubkey: &[u8]) -> Result<Self> {
        if pubkey.len() != SOURCE_LEN {
            return Err(StoreError::Length(format!(
                "invalid pubkey length, got {} require {SOURCE_LEN}",
                pubkey.len()
            )));
        }
        Ok(Self(truncated(pubkey)))
    }

    pub fn from_hex(pubkey: &str) -> Result<Self> {
        Self::from_pubkey(&hex::decode(pubkey)?)
    }

    pub fn bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    pub fn read_from(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self(take_hash(buf, "pub-hash")?))
    }
}

/// Truncated hash of an arbitrary identifier, used for tag keys and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentHash([u8; HASH_LEN]);

impl IdentHash {
    pub fn from_ident(ident: &[u8]) -> Self {
        Self(truncated(ident))
    }

    pub fn bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    pub fn read_from(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self(take_hash(buf, "ident-hash")?))
    }
}

/// The full 32-byte event id, carried verbatim inside the `fi` family so
/// query results resolve without decoding the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FullId([u8; SOURCE_LEN]);

impl FullId {
    pub fn from_id(id: &[u8]) -> Result<Self> {
        if id.len() != SOURCE_LEN {
            return Err(StoreError::Length(format!(
                "invalid id length, got {} require {SOURCE_LEN}",
                id.len()
            )));
        }
        let mut out = [0u8; SOURCE_LEN];
        out.copy_from_slice(id);
        Ok(Self(out))
    }

    pub fn bytes(&self) -> &[u8; SOURCE_LEN] {
        &self.0
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    pub fn read_from(buf: &mut &[u8]) -> Result<Self> {
        let (head, tail) = buf
            .split_at_checked(SOURCE_LEN)
            .ok_or_else(|| StoreError::Corruption("short read decoding full id".into()))?;
        *buf = tail;
        let mut out = [0u8; SOURCE_LEN];
        out.copy_from_slice(head);
        Ok(Self(out))
    }
}

/// A full-text word carried whole inside the reserved `fw` family,
/// terminated by a zero byte on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Word(Vec<u8>);

impl Word {
    pub fn from_word(word: &[u8]) -> Result<Self> {
        if word.contains(&0x00) {
            return Err(StoreError::Format(
                "full-text word may not contain a zero byte".into(),
            ));
        }
        Ok(Self(word.to_vec()))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
        out.push(0x00);
    }

    pub fn read_from(buf: &mut &[u8]) -> Result<Self> {
        let end = buf
            .iter()
            .position(|&b| b == 0x00)
            .ok_or_else(|| StoreError::Corruption("unterminated full-text word".into()))?;
        let word = buf[..end].to_vec();
        *buf = &buf[end + 1..];
        Ok(Self(word))
    }
}
