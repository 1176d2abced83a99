//! The event record and its canonical textual codec.
//!
//! The canonical form is the wire format and, with the signature omitted,
//! the preimage hashed to produce the event id; a single byte of deviation
//! changes the id. Lines are separated by LF and each starts with one of
//! the sentinels `PUBKEY:`, `TIMESTAMP:`, `CONTENT:`, `TAG:`, `SIGNATURE:`.

mod binary;

use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use secp256k1::{schnorr::Signature, Message, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::signer::Signer;
use crate::text;

/// Width of an x-only public key.
pub const PUBKEY_LEN: usize = 32;
/// Width of a Schnorr signature.
pub const SIGNATURE_LEN: usize = 64;
/// Width of an event id.
pub const ID_LEN: usize = 32;

/// SHA-256 of the canonical textual form of an event without its signature.
pub type EventId = [u8; ID_LEN];

const SENTINEL_PUBKEY: &[u8] = b"PUBKEY:";
const SENTINEL_TIMESTAMP: &[u8] = b"TIMESTAMP:";
const SENTINEL_CONTENT: &[u8] = b"CONTENT:";
const SENTINEL_TAG: &[u8] = b"TAG:";
const SENTINEL_SIGNATURE: &[u8] = b"SIGNATURE:";

/// Marks a field as raw binary in the canonical textual form.
const BINARY_MARKER: &[u8] = b"b64:";

/// Content or a tag side: escaped text or a raw binary blob.
///
/// Text marshals through the escaping scheme in [`crate::text`]; binary
/// marshals as `b64:` followed by padded URL-safe base64. The distinction
/// lives in the variant only; neither the canonical nor the storage codec
/// carries an in-band marker inside the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Vec<u8>),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn text(raw: impl Into<Vec<u8>>) -> Self {
        Self::Text(raw.into())
    }

    pub fn binary(raw: impl Into<Vec<u8>>) -> Self {
        Self::Binary(raw.into())
    }

    /// The underlying bytes, variant-blind. Tag indexing and filter
    /// matching operate on these.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(raw) | Self::Binary(raw) => raw,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    fn write_canonical(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Text(raw) => {
                // `b64:` is reserved to introduce binary payloads; text
                // starting with it would not survive a round trip.
                if raw.starts_with(BINARY_MARKER) {
                    return Err(StoreError::Format(
                        "text payload may not begin with the reserved prefix `b64:`".into(),
                    ));
                }
                text::write_escaped(out, raw);
            }
            Self::Binary(raw) => {
                out.extend_from_slice(BINARY_MARKER);
                out.extend_from_slice(URL_SAFE.encode(raw).as_bytes());
            }
        }
        Ok(())
    }

    fn from_canonical(raw: &[u8]) -> Result<Self> {
        if let Some(encoded) = raw.strip_prefix(BINARY_MARKER) {
            Ok(Self::Binary(URL_SAFE.decode(encoded)?))
        } else {
            Ok(Self::Text(text::read_escaped(raw)))
        }
    }
}

/// An ordered key/value pair, the sole classification mechanism. There is
/// no out-of-band record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: Payload,
    pub value: Payload,
}

impl Tag {
    pub fn new(key: Payload, value: Payload) -> Self {
        Self { key, value }
    }
}

/// A self-contained signed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub pubkey: [u8; PUBKEY_LEN],
    pub timestamp: i64,
    pub content: Payload,
    pub tags: Vec<Tag>,
    pub signature: Option<[u8; SIGNATURE_LEN]>,
}

impl Event {
    pub fn new(pubkey: [u8; PUBKEY_LEN], timestamp: i64, content: Payload) -> Self {
        Self {
            pubkey,
            timestamp,
            content,
            tags: Vec::new(),
            signature: None,
        }
    }

    pub fn with_tag(mut self, key: Payload, value: Payload) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// Canonical textual form. When the event is unsigned the SIGNATURE
    /// line and its preceding newline are omitted, yielding the id
    /// preimage.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        self.marshal_inner(true)
    }

    fn marshal_inner(&self, with_signature: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(SENTINEL_PUBKEY);
        out.extend_from_slice(URL_SAFE_NO_PAD.encode(self.pubkey).as_bytes());

        out.push(b'\n');
        out.extend_from_slice(SENTINEL_TIMESTAMP);
        out.extend_from_slice(self.timestamp.to_string().as_bytes());

        out.push(b'\n');
        out.extend_from_slice(SENTINEL_CONTENT);
        self.content.write_canonical(&mut out)?;

        for tag in &self.tags {
            out.push(b'\n');
            out.extend_from_slice(SENTINEL_TAG);
            if let Payload::Text(raw) = &tag.key {
                // A colon inside a text key would shift the split point on
                // re-parse and alias two distinct events to one id.
                if raw.contains(&b':') {
                    return Err(StoreError::Format(
                        "tag key may not contain a colon".into(),
                    ));
                }
            }
            tag.key.write_canonical(&mut out)?;
            out.push(b':');
            tag.value.write_canonical(&mut out)?;
        }

        if with_signature {
            if let Some(signature) = &self.signature {
                out.push(b'\n');
                out.extend_from_slice(SENTINEL_SIGNATURE);
                out.extend_from_slice(URL_SAFE_NO_PAD.encode(signature).as_bytes());
            }
        }
        Ok(out)
    }

    /// Parses the canonical textual form, enforcing sentinel order and
    /// multiplicity: PUBKEY, then TIMESTAMP, then CONTENT, then any number
    /// of TAG lines, then at most one SIGNATURE line, which must be last.
    pub fn unmarshal(data: &[u8]) -> Result<Event> {
        let mut pubkey: Option<[u8; PUBKEY_LEN]> = None;
        let mut timestamp: Option<i64> = None;
        let mut content: Option<Payload> = None;
        let mut tags = Vec::new();
        let mut signature: Option<[u8; SIGNATURE_LEN]> = None;

        for (index, line) in data.split(|&b| b == b'\n').enumerate() {
            let number = index + 1;
            if signature.is_some() {
                return Err(StoreError::Format(format!(
                    "line {number} found after SIGNATURE"
                )));
            }
            if let Some(rest) = line.strip_prefix(SENTINEL_PUBKEY) {
                if pubkey.is_some() {
                    return Err(StoreError::Format(format!(
                        "multiple PUBKEY found at line {number}"
                    )));
                }
                pubkey = Some(decode_fixed::<PUBKEY_LEN>(rest, "PUBKEY")?);
            } else if let Some(rest) = line.strip_prefix(SENTINEL_TIMESTAMP) {
                if pubkey.is_none() {
                    return Err(StoreError::Format(format!(
                        "TIMESTAMP found before PUBKEY at line {number}"
                    )));
                }
                if timestamp.is_some() {
                    return Err(StoreError::Format(format!(
                        "multiple TIMESTAMP found at line {number}"
                    )));
                }
                timestamp = Some(parse_decimal(rest)?);
            } else if let Some(rest) = line.strip_prefix(SENTINEL_CONTENT) {
                if pubkey.is_none() || timestamp.is_none() {
                    return Err(StoreError::Format(format!(
                        "CONTENT found before PUBKEY and TIMESTAMP at line {number}"
                    )));
                }
                if content.is_some() {
                    return Err(StoreError::Format(format!(
                        "multiple CONTENT found at line {number}"
                    )));
                }
                content = Some(Payload::from_canonical(rest)?);
            } else if let Some(rest) = line.strip_prefix(SENTINEL_TAG) {
                if content.is_none() {
                    return Err(StoreError::Format(format!(
                        "TAG found before CONTENT at line {number}"
                    )));
                }
                let split = rest
                    .iter()
                    .position(|&b| b == b':')
                    .ok_or_else(|| StoreError::Format(format!("invalid TAG at line {number}")))?;
                let key = Payload::from_canonical(&rest[..split])?;
                let value = Payload::from_canonical(&rest[split + 1..])?;
                tags.push(Tag::new(key, value));
            } else if let Some(rest) = line.strip_prefix(SENTINEL_SIGNATURE) {
                if content.is_none() {
                    return Err(StoreError::Format(format!(
                        "SIGNATURE found before CONTENT at line {number}"
                    )));
                }
                signature = Some(decode_fixed::<SIGNATURE_LEN>(rest, "SIGNATURE")?);
            } else {
                return Err(StoreError::Format(format!(
                    "unknown sentinel at line {number}"
                )));
            }
        }

        let pubkey =
            pubkey.ok_or_else(|| StoreError::Format("missing PUBKEY line".into()))?;
        let timestamp =
            timestamp.ok_or_else(|| StoreError::Format("missing TIMESTAMP line".into()))?;
        let content =
            content.ok_or_else(|| StoreError::Format("missing CONTENT line".into()))?;

        Ok(Event {
            pubkey,
            timestamp,
            content,
            tags,
            signature,
        })
    }

    /// SHA-256 of the canonical form with the signature omitted.
    pub fn id(&self) -> Result<EventId> {
        let preimage = self.marshal_inner(false)?;
        let digest = Sha256::digest(&preimage);
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&digest);
        Ok(id)
    }

    /// Signs the event id. Re-signing an already-signed event is an error.
    pub fn sign(&mut self, signer: &impl Signer) -> Result<()> {
        if self.signature.is_some() {
            return Err(StoreError::Signature("event already signed".into()));
        }
        let id = self.id()?;
        self.signature = Some(signer.sign(&id)?);
        Ok(())
    }

    /// Checks the signature against the recomputed id under the author key.
    /// Any cryptographic mismatch (malformed key or signature, failed
    /// check) reports `false`; only an unsigned event is an error.
    pub fn verify(&self) -> Result<bool> {
        let Some(raw_signature) = &self.signature else {
            return Err(StoreError::Signature("event is not signed".into()));
        };
        let id = self.id()?;
        let Ok(pubkey) = XOnlyPublicKey::from_slice(&self.pubkey) else {
            return Ok(false);
        };
        let Ok(signature) = Signature::from_slice(raw_signature) else {
            return Ok(false);
        };
        let Ok(message) = Message::from_digest_slice(&id) else {
            return Ok(false);
        };
        let secp = Secp256k1::verification_only();
        Ok(secp.verify_schnorr(&signature, &message, &pubkey).is_ok())
    }
}

fn decode_fixed<const N: usize>(encoded: &[u8], sentinel: &str) -> Result<[u8; N]> {
    let raw = URL_SAFE_NO_PAD.decode(encoded)?;
    let array: [u8; N] = raw.try_into().map_err(|_| {
        StoreError::Format(format!("{sentinel} does not decode to {N} bytes"))
    })?;
    Ok(array)
}

fn parse_decimal(raw: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| StoreError::Format("timestamp is not ASCII decimal".into()))?;
    text.parse::<i64>()
        .map_err(|err| StoreError::Format(format!("invalid timestamp: {err}")))
}

pub use binary::{read_varint, write_varint};
