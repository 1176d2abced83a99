//! The event store: duplicate detection, serial allocation, and the atomic
//! write of an event value plus all of its index keys.

mod query;

use parking_lot::Mutex;
use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch};
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::event::{Event, EventId};
use crate::hashes::{FullId, IdHash, IdentHash, PubHash, HASH_LEN};
use crate::keys;
use crate::numbers::Uint40;

/// The fields of an event's `fi` entry: enough to sort and de-alias query
/// candidates without decoding the event itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSummary {
    pub id: EventId,
    pub pubkey_hash: [u8; HASH_LEN],
    pub timestamp: i64,
}

/// A content-addressed event store over a single ordered key-value
/// namespace. All shared mutable state is the engine plus the serial
/// counter; writers serialize on the counter's lock.
pub struct Database {
    db: DBWithThreadMode<MultiThreaded>,
    /// Next serial to assign. Recovered from the last `ev` key on open.
    next_serial: Mutex<u64>,
    verify_events: bool,
}

impl Database {
    /// Opens (or creates) the store under `config.data_dir`.
    pub fn open(config: &Config) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DBWithThreadMode::<MultiThreaded>::open(&options, &config.data_dir)?;
        let next_serial = recover_next_serial(&db)?;
        debug!(next_serial, "opened event database");

        Ok(Self {
            db,
            next_serial: Mutex::new(next_serial),
            verify_events: config.verify_events,
        })
    }

    /// Inserts a signed event. Returns the serial assigned to it, or
    /// [`StoreError::Duplicate`] if an event with the same id is already
    /// present. The event value and every index key commit atomically.
    ///
    /// Panics when the serial counter would pass 2^40 - 1; the store
    /// cannot continue past that point.
    pub fn store_event(&self, event: &Event) -> Result<u64> {
        if self.verify_events && !event.verify()? {
            return Err(StoreError::Signature("invalid event signature".into()));
        }
        let id = event.id()?;
        let mut value = Vec::new();
        event.write_binary(&mut value)?;

        let mut next_serial = self.next_serial.lock();

        match self.event_by_id(&id) {
            Ok(_) => return Err(StoreError::Duplicate),
            Err(StoreError::NotFound) => {}
            Err(err) => return Err(err),
        }

        let serial = match Uint40::new(*next_serial) {
            Ok(serial) => serial,
            Err(_) => panic!(
                "serial numbers exhausted past 2^40-1: the database must be \
                 re-consolidated before it can accept new events"
            ),
        };

        let mut batch = WriteBatch::default();
        for key in index_keys(event, &id, serial)? {
            batch.put(key, b"");
        }
        batch.put(keys::event_key(serial), &value);
        self.db.write(batch)?;

        *next_serial += 1;
        debug!(serial = serial.get(), "stored event");
        Ok(serial.get())
    }

    /// Resolves an event id to its serial through the `id` index.
    /// [`StoreError::NotFound`] means the id is not present; the insert
    /// path treats that as "proceed". The truncated id-hash can alias, so
    /// callers needing certainty must decode the event behind the serial.
    pub fn find_event_serial_by_id(&self, id: &[u8]) -> Result<u64> {
        let hash = IdHash::from_id(id)?;
        let prefix = keys::id_search_prefix(&hash);
        let mut serial = None;
        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let (_, found) = keys::parse_id_key(&key)?;
            serial = Some(found.get());
        }
        serial.ok_or(StoreError::NotFound)
    }

    /// Loads and decodes the event stored under a serial.
    pub fn event_by_serial(&self, serial: u64) -> Result<Event> {
        let serial = Uint40::new(serial)?;
        match self.db.get(keys::event_key(serial))? {
            Some(value) => Event::read_binary(&value),
            None => Err(StoreError::NotFound),
        }
    }

    /// Loads an event by id, re-validating the full id against the stored
    /// event so an id-hash collision reads as [`StoreError::NotFound`]
    /// rather than returning a stranger's event.
    pub fn event_by_id(&self, id: &[u8]) -> Result<Event> {
        let serial = self.find_event_serial_by_id(id)?;
        let event = self.event_by_serial(serial)?;
        if event.id()?.as_slice() != id {
            return Err(StoreError::NotFound);
        }
        Ok(event)
    }

    /// Reads an event's `fi` entry: its full id, pubkey hash, and
    /// timestamp, without decoding the event value.
    pub fn summary_by_serial(&self, serial: u64) -> Result<EventSummary> {
        let serial = Uint40::new(serial)?;
        let prefix = keys::id_pubkey_timestamp_search(serial);
        let mut summary = None;
        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let (_, id, pubkey_hash, timestamp) = keys::parse_id_pubkey_timestamp_key(&key)?;
            summary = Some(EventSummary {
                id: *id.bytes(),
                pubkey_hash: *pubkey_hash.bytes(),
                timestamp: timestamp as i64,
            });
        }
        summary.ok_or(StoreError::NotFound)
    }
}

/// Scans backwards from the end of the `ev` family to find the highest
/// assigned serial. `ev` sorts directly before `ew`, so a reverse seek
/// from there lands on the last event key.
fn recover_next_serial(db: &DBWithThreadMode<MultiThreaded>) -> Result<u64> {
    let mut iter = db.iterator(IteratorMode::From(b"ew".as_slice(), Direction::Reverse));
    if let Some(item) = iter.next() {
        let (key, _) = item?;
        if key.starts_with(keys::event_scan_prefix().as_slice()) {
            let serial = keys::parse_event_key(&key)?;
            return Ok(serial.get() + 1);
        }
    }
    Ok(0)
}

/// The secondary-index keys for one event: its `id` and `fi` entries, the
/// `pt` and `ts` timestamp indexes, and per tag a `tt` and a `tp` entry.
/// The `ev` key itself is composed by the caller alongside the value.
pub fn index_keys(event: &Event, id: &EventId, serial: Uint40) -> Result<Vec<Vec<u8>>> {
    let id_hash = IdHash::from_id(id)?;
    let full_id = FullId::from_id(id)?;
    let pubkey_hash = PubHash::from_pubkey(&event.pubkey)?;
    let timestamp = event.timestamp as u64;

    let mut out = vec![
        keys::id_key(&id_hash, serial),
        keys::id_pubkey_timestamp_key(serial, &full_id, &pubkey_hash, timestamp),
        keys::pubkey_timestamp_key(&pubkey_hash, timestamp, serial),
        keys::timestamp_key(timestamp, serial),
    ];
    for tag in &event.tags {
        let key_hash = IdentHash::from_ident(tag.key.as_bytes());
        let value_hash = IdentHash::from_ident(tag.value.as_bytes());
        out.push(keys::tag_timestamp_key(
            &key_hash,
            &value_hash,
            timestamp,
            serial,
        ));
        out.push(keys::pubkey_tag_timestamp_key(
            &pubkey_hash,
            &key_hash,
            &value_hash,
            timestamp,
            serial,
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Payload, ID_LEN};
    use crate::signer::{KeypairSigner, Signer};

    fn open_store(dir: &std::path::Path) -> Database {
        let config = Config::new(dir.join("db"));
        Database::open(&config).unwrap()
    }

    fn signed_event(signer: &KeypairSigner, timestamp: i64, content: &str) -> Event {
        let mut event = Event::new(signer.public_key(), timestamp, Payload::text(content))
            .with_tag(Payload::text("type"), Payload::text("text"));
        event.sign(signer).unwrap();
        event
    }

    #[test]
    fn index_keys_cover_every_family_once_per_tag() {
        let signer = KeypairSigner::generate();
        let event = signed_event(&signer, 1_700_000_000, "indexed");
        let id = event.id().unwrap();
        let keys = index_keys(&event, &id, Uint40::new(1).unwrap()).unwrap();

        // id, fi, pt, ts, plus tt and tp for the single tag.
        assert_eq!(keys.len(), 6);
        let prefixes: Vec<&[u8]> = keys.iter().map(|k| &k[..2]).collect();
        for expected in [b"id", b"fi", b"pt", b"ts", b"tt", b"tp"] {
            assert!(prefixes.contains(&&expected[..]));
        }
    }

    #[test]
    fn store_assigns_monotonic_serials() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let signer = KeypairSigner::generate();

        let first = store
            .store_event(&signed_event(&signer, 100, "first"))
            .unwrap();
        let second = store
            .store_event(&signed_event(&signer, 50, "second"))
            .unwrap();
        assert!(second > first);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let signer = KeypairSigner::generate();
        let event = signed_event(&signer, 100, "once");

        store.store_event(&event).unwrap();
        assert!(matches!(
            store.store_event(&event),
            Err(StoreError::Duplicate)
        ));
    }

    #[test]
    fn unsigned_and_tampered_events_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let signer = KeypairSigner::generate();

        let unsigned = Event::new(signer.public_key(), 1, Payload::text("unsigned"));
        assert!(matches!(
            store.store_event(&unsigned),
            Err(StoreError::Signature(_))
        ));

        let mut tampered = signed_event(&signer, 1, "original");
        tampered.content = Payload::text("changed");
        assert!(matches!(
            store.store_event(&tampered),
            Err(StoreError::Signature(_))
        ));
    }

    #[test]
    fn lookup_by_id_and_serial() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let signer = KeypairSigner::generate();
        let event = signed_event(&signer, 123, "addressed");
        let id = event.id().unwrap();

        let serial = store.store_event(&event).unwrap();
        assert_eq!(store.find_event_serial_by_id(&id).unwrap(), serial);
        assert_eq!(store.event_by_serial(serial).unwrap(), event);
        assert_eq!(store.event_by_id(&id).unwrap(), event);

        let summary = store.summary_by_serial(serial).unwrap();
        assert_eq!(summary.id, id);
        assert_eq!(summary.timestamp, 123);
        assert_eq!(
            summary.pubkey_hash,
            *PubHash::from_pubkey(&event.pubkey).unwrap().bytes()
        );
    }

    #[test]
    fn missing_lookups_return_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        assert!(matches!(
            store.find_event_serial_by_id(&[0u8; ID_LEN]),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.event_by_serial(7),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.summary_by_serial(7),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn serial_counter_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let signer = KeypairSigner::generate();
        let config = Config::new(dir.path().join("db"));

        let first = {
            let store = Database::open(&config).unwrap();
            store
                .store_event(&signed_event(&signer, 10, "before restart"))
                .unwrap()
        };

        let store = Database::open(&config).unwrap();
        let second = store
            .store_event(&signed_event(&signer, 20, "after restart"))
            .unwrap();
        assert!(second > first);
    }
}
