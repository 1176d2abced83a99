//! Binary storage form of an event, the value written under the `ev` key.
//!
//! Layout: 32-byte pubkey, varint timestamp, length-prefixed content,
//! varint tag count, length-prefixed tag keys and values, 64-byte signature.
//! Payload length varints carry the binary/text flag in their low bit, so
//! the tagged union survives a round trip without in-band markers.

use crate::error::{Result, StoreError};

use super::{Event, Payload, Tag, PUBKEY_LEN, SIGNATURE_LEN};

/// Appends `value` as an unsigned little-endian-group varint: seven bits
/// per byte, high bit set on every byte except the last.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Reads a varint written by [`write_varint`], advancing `buf` past it.
pub fn read_varint(buf: &mut &[u8]) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let (&byte, tail) = buf
            .split_first()
            .ok_or_else(|| StoreError::Corruption("short read decoding varint".into()))?;
        *buf = tail;
        if shift >= 64 || (shift == 63 && byte & 0x7f > 1) {
            return Err(StoreError::Corruption("varint overflows 64 bits".into()));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn write_payload(out: &mut Vec<u8>, payload: &Payload) {
    let raw = payload.as_bytes();
    let header = (raw.len() as u64) << 1 | u64::from(payload.is_binary());
    write_varint(out, header);
    out.extend_from_slice(raw);
}

fn read_payload(buf: &mut &[u8]) -> Result<Payload> {
    let header = read_varint(buf)?;
    let len = (header >> 1) as usize;
    let (raw, tail) = buf
        .split_at_checked(len)
        .ok_or_else(|| StoreError::Corruption("short read decoding payload".into()))?;
    *buf = tail;
    if header & 1 == 1 {
        Ok(Payload::Binary(raw.to_vec()))
    } else {
        Ok(Payload::Text(raw.to_vec()))
    }
}

impl Event {
    /// Encodes the storage form. Only signed events are storable.
    pub fn write_binary(&self, out: &mut Vec<u8>) -> Result<()> {
        let Some(signature) = &self.signature else {
            return Err(StoreError::Signature("event is not signed".into()));
        };
        out.extend_from_slice(&self.pubkey);
        write_varint(out, self.timestamp as u64);
        write_payload(out, &self.content);
        write_varint(out, self.tags.len() as u64);
        for tag in &self.tags {
            write_payload(out, &tag.key);
            write_payload(out, &tag.value);
        }
        out.extend_from_slice(signature);
        Ok(())
    }

    /// Decodes the storage form. The whole input must be consumed; any
    /// leftover or missing bytes indicate corruption.
    pub fn read_binary(data: &[u8]) -> Result<Event> {
        let mut buf = data;

        let (head, tail) = buf
            .split_at_checked(PUBKEY_LEN)
            .ok_or_else(|| StoreError::Corruption("short read decoding pubkey".into()))?;
        buf = tail;
        let mut pubkey = [0u8; PUBKEY_LEN];
        pubkey.copy_from_slice(head);

        let timestamp = read_varint(&mut buf)? as i64;
        let content = read_payload(&mut buf)?;

        let count = read_varint(&mut buf)?;
        let mut tags = Vec::new();
        for _ in 0..count {
            let key = read_payload(&mut buf)?;
            let value = read_payload(&mut buf)?;
            tags.push(Tag::new(key, value));
        }

        let (head, tail) = buf
            .split_at_checked(SIGNATURE_LEN)
            .ok_or_else(|| StoreError::Corruption("short read decoding signature".into()))?;
        buf = tail;
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(head);

        if !buf.is_empty() {
            return Err(StoreError::Corruption(format!(
                "{} trailing bytes after event",
                buf.len()
            )));
        }

        Ok(Event {
            pubkey,
            timestamp,
            content,
            tags,
            signature: Some(signature),
        })
    }
}
