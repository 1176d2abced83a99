//! Composite index keys.
//!
//! Every key starts with a two-byte ASCII family prefix followed by
//! fixed-width fields concatenated without separators (the reserved `fw`
//! family additionally carries a zero-terminated word). All fields encode
//! big-endian, so byte-lexicographic order over a whole key equals
//! field-major order over the logical tuple, which is the invariant the query
//! planner's prefix scans rely on.
//!
//! Each family exposes a full-key constructor, one or more search-prefix
//! builders taking only the known leading fields (the open-suffix form the
//! planner seeds its iterators with), and a parser that reads the fields
//! back in declaration order.

use crate::error::{Result, StoreError};
use crate::hashes::{FullId, IdHash, IdentHash, PubHash, Word};
use crate::numbers::{Uint24, Uint40, Uint64};

/// Width of the family prefix on every key.
pub const PREFIX_LEN: usize = 2;

/// The eight index families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    /// `ev`: serial → binary event. The only family with a value.
    Event,
    /// `id`: id-hash, serial. Secondary key of an event.
    Id,
    /// `fi`: serial, full id, pub-hash, timestamp. Resolves query
    /// candidates without decoding the event.
    IdPubkeyTimestamp,
    /// `ts`: timestamp, serial.
    Timestamp,
    /// `pt`: pub-hash, timestamp, serial.
    PubkeyTimestamp,
    /// `tp`: pub-hash, key-hash, value-hash, timestamp, serial.
    PubkeyTagTimestamp,
    /// `tt`: key-hash, value-hash, timestamp, serial.
    TagTimestamp,
    /// `fw`: zero-terminated word, position, serial. Reserved.
    FulltextWord,
}

impl Prefix {
    pub const fn bytes(self) -> &'static [u8; PREFIX_LEN] {
        match self {
            Prefix::Event => b"ev",
            Prefix::Id => b"id",
            Prefix::IdPubkeyTimestamp => b"fi",
            Prefix::Timestamp => b"ts",
            Prefix::PubkeyTimestamp => b"pt",
            Prefix::PubkeyTagTimestamp => b"tp",
            Prefix::TagTimestamp => b"tt",
            Prefix::FulltextWord => b"fw",
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        match raw {
            b"ev" => Ok(Prefix::Event),
            b"id" => Ok(Prefix::Id),
            b"fi" => Ok(Prefix::IdPubkeyTimestamp),
            b"ts" => Ok(Prefix::Timestamp),
            b"pt" => Ok(Prefix::PubkeyTimestamp),
            b"tp" => Ok(Prefix::PubkeyTagTimestamp),
            b"tt" => Ok(Prefix::TagTimestamp),
            b"fw" => Ok(Prefix::FulltextWord),
            other => Err(StoreError::Corruption(format!(
                "unknown index prefix {other:?}"
            ))),
        }
    }
}

fn with_prefix(prefix: Prefix) -> Vec<u8> {
    prefix.bytes().to_vec()
}

fn strip_prefix<'a>(key: &'a [u8], expected: Prefix) -> Result<&'a [u8]> {
    let (head, tail) = key
        .split_at_checked(PREFIX_LEN)
        .ok_or_else(|| StoreError::Corruption("key shorter than its prefix".into()))?;
    let found = Prefix::from_bytes(head)?;
    if found != expected {
        return Err(StoreError::Corruption(format!(
            "expected {:?} key, found {:?}",
            expected, found
        )));
    }
    Ok(tail)
}

// ev

pub fn event_key(serial: Uint40) -> Vec<u8> {
    let mut key = with_prefix(Prefix::Event);
    serial.write_to(&mut key);
    key
}

pub fn event_scan_prefix() -> Vec<u8> {
    with_prefix(Prefix::Event)
}

pub fn parse_event_key(key: &[u8]) -> Result<Uint40> {
    let mut buf = strip_prefix(key, Prefix::Event)?;
    Uint40::read_from(&mut buf)
}

// id

pub fn id_key(id: &IdHash, serial: Uint40) -> Vec<u8> {
    let mut key = with_prefix(Prefix::Id);
    id.write_to(&mut key);
    serial.write_to(&mut key);
    key
}

pub fn id_search_prefix(id: &IdHash) -> Vec<u8> {
    let mut key = with_prefix(Prefix::Id);
    id.write_to(&mut key);
    key
}

pub fn parse_id_key(key: &[u8]) -> Result<(IdHash, Uint40)> {
    let mut buf = strip_prefix(key, Prefix::Id)?;
    let id = IdHash::read_from(&mut buf)?;
    let serial = Uint40::read_from(&mut buf)?;
    Ok((id, serial))
}

// fi

pub fn id_pubkey_timestamp_key(
    serial: Uint40,
    id: &FullId,
    pubkey: &PubHash,
    timestamp: u64,
) -> Vec<u8> {
    let mut key = with_prefix(Prefix::IdPubkeyTimestamp);
    serial.write_to(&mut key);
    id.write_to(&mut key);
    pubkey.write_to(&mut key);
    Uint64::new(timestamp).write_to(&mut key);
    key
}

pub fn id_pubkey_timestamp_search(serial: Uint40) -> Vec<u8> {
    let mut key = with_prefix(Prefix::IdPubkeyTimestamp);
    serial.write_to(&mut key);
    key
}

pub fn parse_id_pubkey_timestamp_key(key: &[u8]) -> Result<(Uint40, FullId, PubHash, u64)> {
    let mut buf = strip_prefix(key, Prefix::IdPubkeyTimestamp)?;
    let serial = Uint40::read_from(&mut buf)?;
    let id = FullId::read_from(&mut buf)?;
    let pubkey = PubHash::read_from(&mut buf)?;
    let timestamp = Uint64::read_from(&mut buf)?;
    Ok((serial, id, pubkey, timestamp.get()))
}

// ts

pub fn timestamp_key(timestamp: u64, serial: Uint40) -> Vec<u8> {
    let mut key = with_prefix(Prefix::Timestamp);
    Uint64::new(timestamp).write_to(&mut key);
    serial.write_to(&mut key);
    key
}

pub fn timestamp_scan_prefix() -> Vec<u8> {
    with_prefix(Prefix::Timestamp)
}

pub fn parse_timestamp_key(key: &[u8]) -> Result<(u64, Uint40)> {
    let mut buf = strip_prefix(key, Prefix::Timestamp)?;
    let timestamp = Uint64::read_from(&mut buf)?;
    let serial = Uint40::read_from(&mut buf)?;
    Ok((timestamp.get(), serial))
}

// pt

pub fn pubkey_timestamp_key(pubkey: &PubHash, timestamp: u64, serial: Uint40) -> Vec<u8> {
    let mut key = with_prefix(Prefix::PubkeyTimestamp);
    pubkey.write_to(&mut key);
    Uint64::new(timestamp).write_to(&mut key);
    serial.write_to(&mut key);
    key
}

pub fn pubkey_timestamp_search(pubkey: &PubHash) -> Vec<u8> {
    let mut key = with_prefix(Prefix::PubkeyTimestamp);
    pubkey.write_to(&mut key);
    key
}

pub fn parse_pubkey_timestamp_key(key: &[u8]) -> Result<(PubHash, u64, Uint40)> {
    let mut buf = strip_prefix(key, Prefix::PubkeyTimestamp)?;
    let pubkey = PubHash::read_from(&mut buf)?;
    let timestamp = Uint64::read_from(&mut buf)?;
    let serial = Uint40::read_from(&mut buf)?;
    Ok((pubkey, timestamp.get(), serial))
}

// tp

pub fn pubkey_tag_timestamp_key(
    pubkey: &PubHash,
    key_hash: &IdentHash,
    value_hash: &IdentHash,
    timestamp: u64,
    serial: Uint40,
) -> Vec<u8> {
    let mut key = with_prefix(Prefix::PubkeyTagTimestamp);
    pubkey.write_to(&mut key);
    key_hash.write_to(&mut key);
    value_hash.write_to(&mut key);
    Uint64::new(timestamp).write_to(&mut key);
    serial.write_to(&mut key);
    key
}

pub fn pubkey_tag_timestamp_search(
    pubkey: &PubHash,
    key_hash: &IdentHash,
    value_hash: &IdentHash,
) -> Vec<u8> {
    let mut key = with_prefix(Prefix::PubkeyTagTimestamp);
    pubkey.write_to(&mut key);
    key_hash.write_to(&mut key);
    value_hash.write_to(&mut key);
    key
}

pub fn parse_pubkey_tag_timestamp_key(
    key: &[u8],
) -> Result<(PubHash, IdentHash, IdentHash, u64, Uint40)> {
    let mut buf = strip_prefix(key, Prefix::PubkeyTagTimestamp)?;
    let pubkey = PubHash::read_from(&mut buf)?;
    let key_hash = IdentHash::read_from(&mut buf)?;
    let value_hash = IdentHash::read_from(&mut buf)?;
    let timestamp = Uint64::read_from(&mut buf)?;
    let serial = Uint40::read_from(&mut buf)?;
    Ok((pubkey, key_hash, value_hash, timestamp.get(), serial))
}

// tt

pub fn tag_timestamp_key(
    key_hash: &IdentHash,
    value_hash: &IdentHash,
    timestamp: u64,
    serial: Uint40,
) -> Vec<u8> {
    let mut key = with_prefix(Prefix::TagTimestamp);
    key_hash.write_to(&mut key);
    value_hash.write_to(&mut key);
    Uint64::new(timestamp).write_to(&mut key);
    serial.write_to(&mut key);
    key
}

pub fn tag_timestamp_search(key_hash: &IdentHash, value_hash: &IdentHash) -> Vec<u8> {
    let mut key = with_prefix(Prefix::TagTimestamp);
    key_hash.write_to(&mut key);
    value_hash.write_to(&mut key);
    key
}

pub fn parse_tag_timestamp_key(key: &[u8]) -> Result<(IdentHash, IdentHash, u64, Uint40)> {
    let mut buf = strip_prefix(key, Prefix::TagTimestamp)?;
    let key_hash = IdentHash::read_from(&mut buf)?;
    let value_hash = IdentHash::read_from(&mut buf)?;
    let timestamp = Uint64::read_from(&mut buf)?;
    let serial = Uint40::read_from(&mut buf)?;
    Ok((key_hash, value_hash, timestamp.get(), serial))
}

// fw (reserved)

pub fn fulltext_word_key(word: &Word, position: Uint24, serial: Uint40) -> Vec<u8> {
    let mut key = with_prefix(Prefix::FulltextWord);
    word.write_to(&mut key);
    position.write_to(&mut key);
    serial.write_to(&mut key);
    key
}

pub fn fulltext_word_search(word: &Word) -> Vec<u8> {
    let mut key = with_prefix(Prefix::FulltextWord);
    word.write_to(&mut key);
    key
}

pub fn parse_fulltext_word_key(key: &[u8]) -> Result<(Word, Uint24, Uint40)> {
    let mut buf = strip_prefix(key, Prefix::FulltextWord)?;
    let word = Word::read_from(&mut buf)?;
    let position = Uint24::read_from(&mut buf)?;
    let serial = Uint40::read_from(&mut buf)?;
    Ok((word, position, serial))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial(value: u64) -> Uint40 {
        Uint40::new(value).unwrap()
    }

    #[test]
    fn event_key_layout_and_round_trip() {
        let key = event_key(serial(0x0102030405));
        assert_eq!(key, b"ev\x01\x02\x03\x04\x05");
        assert_eq!(parse_event_key(&key).unwrap().get(), 0x0102030405);
    }

    #[test]
    fn id_key_round_trip() {
        let id = IdHash::from_id(&[9u8; 32]).unwrap();
        let key = id_key(&id, serial(77));
        assert_eq!(key.len(), PREFIX_LEN + 8 + 5);
        assert!(key.starts_with(b"id"));
        assert!(key.starts_with(&id_search_prefix(&id)));

        let (parsed_id, parsed_serial) = parse_id_key(&key).unwrap();
        assert_eq!(parsed_id, id);
        assert_eq!(parsed_serial.get(), 77);
    }

    #[test]
    fn id_pubkey_timestamp_key_round_trip() {
        let id = FullId::from_id(&[3u8; 32]).unwrap();
        let pubkey = PubHash::from_pubkey(&[4u8; 32]).unwrap();
        let key = id_pubkey_timestamp_key(serial(1), &id, &pubkey, 1_700_000_000);
        assert_eq!(key.len(), PREFIX_LEN + 5 + 32 + 8 + 8);
        assert!(key.starts_with(&id_pubkey_timestamp_search(serial(1))));

        let (ser, parsed_id, parsed_pubkey, ts) = parse_id_pubkey_timestamp_key(&key).unwrap();
        assert_eq!(ser.get(), 1);
        assert_eq!(parsed_id, id);
        assert_eq!(parsed_pubkey, pubkey);
        assert_eq!(ts, 1_700_000_000);
    }

    #[test]
    fn tag_key_round_trips() {
        let pubkey = PubHash::from_pubkey(&[1u8; 32]).unwrap();
        let key_hash = IdentHash::from_ident(b"type");
        let value_hash = IdentHash::from_ident(b"text");

        let tp = pubkey_tag_timestamp_key(&pubkey, &key_hash, &value_hash, 42, serial(9));
        assert_eq!(tp.len(), PREFIX_LEN + 8 + 8 + 8 + 8 + 5);
        assert!(tp.starts_with(&pubkey_tag_timestamp_search(&pubkey, &key_hash, &value_hash)));
        let parsed = parse_pubkey_tag_timestamp_key(&tp).unwrap();
        assert_eq!(parsed, (pubkey, key_hash, value_hash, 42, serial(9)));

        let tt = tag_timestamp_key(&key_hash, &value_hash, 42, serial(9));
        assert_eq!(tt.len(), PREFIX_LEN + 8 + 8 + 8 + 5);
        assert!(tt.starts_with(&tag_timestamp_search(&key_hash, &value_hash)));
        let parsed = parse_tag_timestamp_key(&tt).unwrap();
        assert_eq!(parsed, (key_hash, value_hash, 42, serial(9)));
    }

    #[test]
    fn fulltext_word_key_round_trip() {
        let word = Word::from_word(b"winning").unwrap();
        let key = fulltext_word_key(&word, Uint24::new(3).unwrap(), serial(12));
        assert!(key.starts_with(&fulltext_word_search(&word)));

        let (parsed_word, position, ser) = parse_fulltext_word_key(&key).unwrap();
        assert_eq!(parsed_word, word);
        assert_eq!(position.get(), 3);
        assert_eq!(ser.get(), 12);
    }

    #[test]
    fn lexicographic_order_is_field_major() {
        let pubkey = PubHash::from_pubkey(&[1u8; 32]).unwrap();
        // Same pubkey: earlier timestamp sorts first, serial breaks ties.
        let a = pubkey_timestamp_key(&pubkey, 100, serial(9));
        let b = pubkey_timestamp_key(&pubkey, 101, serial(1));
        let c = pubkey_timestamp_key(&pubkey, 101, serial(2));
        assert!(a < b && b < c);

        // All keys for one pubkey share the search prefix.
        for key in [&a, &b, &c] {
            assert!(key.starts_with(&pubkey_timestamp_search(&pubkey)));
        }
    }

    #[test]
    fn parsing_the_wrong_family_is_an_error() {
        let key = event_key(serial(5));
        assert!(matches!(
            parse_timestamp_key(&key),
            Err(StoreError::Corruption(_))
        ));
        assert!(matches!(
            parse_id_key(b"zz\x00\x00"),
            Err(StoreError::Corruption(_))
        ));
        // Truncated key: the serial field is missing.
        let id = IdHash::from_id(&[9u8; 32]).unwrap();
        assert!(matches!(
            parse_id_key(&id_search_prefix(&id)),
            Err(StoreError::Corruption(_))
        ));
    }
}
