//! The query planner: pick one driving index from the shape of a filter,
//! iterate a bounded key prefix, then re-validate and sort.
//!
//! The truncated hashes inside `pt`, `tt`, and `tp` can collide, and a
//! single tag scan only proves one (key, value) pair matched. Candidates
//! are therefore never returned straight off an index: whenever the filter
//! names authors, tags, or negations, every surviving serial is checked
//! against the exact predicate on the decoded event before it reaches the
//! result.

use std::collections::BTreeSet;

use rocksdb::{Direction, IteratorMode};
use tracing::debug;

use crate::error::Result;
use crate::filter::{Filter, SortOrder};
use crate::hashes::{IdentHash, PubHash};
use crate::keys;
use crate::numbers::Uint40;

use super::Database;

impl Database {
    /// Finds the ids of the events matching `filter`, sorted by timestamp
    /// per `filter.sort` (serial breaks ties, so the order is total).
    ///
    /// When `filter.ids` is non-empty the call degenerates to the set
    /// difference `ids \ not_ids`, preserving caller order, without
    /// deduplication and without touching the indexes.
    pub fn query_events(&self, filter: &Filter) -> Result<Vec<Vec<u8>>> {
        if !filter.ids.is_empty() {
            return Ok(filter
                .ids
                .iter()
                .filter(|id| !filter.not_ids.contains(*id))
                .cloned()
                .collect());
        }

        let serials = self.collect_serials(filter)?;
        debug!(candidates = serials.len(), "driving index scan finished");

        let needs_event = !filter.authors.is_empty()
            || !filter.tags.is_empty()
            || !filter.not_authors.is_empty()
            || !filter.not_tags.is_empty();

        let mut resolved: Vec<(i64, u64, Vec<u8>)> = Vec::new();
        for serial in serials {
            let summary = self.summary_by_serial(serial)?;
            if filter
                .not_ids
                .iter()
                .any(|id| id.as_slice() == summary.id.as_slice())
            {
                continue;
            }
            if needs_event {
                let event = self.event_by_serial(serial)?;
                if !filter.matches(&summary.id, &event) {
                    continue;
                }
            }
            resolved.push((summary.timestamp, serial, summary.id.to_vec()));
        }

        resolved.sort_by_key(|&(timestamp, serial, _)| (timestamp, serial));
        if filter.sort == SortOrder::Descending {
            resolved.reverse();
        }
        Ok(resolved.into_iter().map(|(_, _, id)| id).collect())
    }

    /// Runs the driving-index iteration for `filter` and collects candidate
    /// serials. Precedence: authors+tags on `tp`, authors on `pt`, tags on
    /// `tt`, a timestamp bound on `ts`, otherwise the whole `ev` family.
    fn collect_serials(&self, filter: &Filter) -> Result<BTreeSet<u64>> {
        let mut serials = BTreeSet::new();

        if !filter.authors.is_empty() && !filter.tags.is_empty() {
            for author in &filter.authors {
                let pubkey = PubHash::from_pubkey(author)?;
                for (key, values) in &filter.tags {
                    let key_hash = IdentHash::from_ident(key);
                    for value in values {
                        let value_hash = IdentHash::from_ident(value);
                        let prefix =
                            keys::pubkey_tag_timestamp_search(&pubkey, &key_hash, &value_hash);
                        self.scan_serials(&prefix, filter, &mut serials, |key| {
                            let (_, _, _, timestamp, serial) =
                                keys::parse_pubkey_tag_timestamp_key(key)?;
                            Ok((timestamp, serial))
                        })?;
                    }
                }
            }
        } else if !filter.authors.is_empty() {
            for author in &filter.authors {
                let pubkey = PubHash::from_pubkey(author)?;
                let prefix = keys::pubkey_timestamp_search(&pubkey);
                self.scan_serials(&prefix, filter, &mut serials, |key| {
                    let (_, timestamp, serial) = keys::parse_pubkey_timestamp_key(key)?;
                    Ok((timestamp, serial))
                })?;
            }
        } else if !filter.tags.is_empty() {
            for (key, values) in &filter.tags {
                let key_hash = IdentHash::from_ident(key);
                for value in values {
                    let value_hash = IdentHash::from_ident(value);
                    let prefix = keys::tag_timestamp_search(&key_hash, &value_hash);
                    self.scan_serials(&prefix, filter, &mut serials, |key| {
                        let (_, _, timestamp, serial) = keys::parse_tag_timestamp_key(key)?;
                        Ok((timestamp, serial))
                    })?;
                }
            }
        } else if filter.since > 0 || filter.until > 0 {
            let prefix = keys::timestamp_scan_prefix();
            self.scan_serials(&prefix, filter, &mut serials, |key| {
                let (timestamp, serial) = keys::parse_timestamp_key(key)?;
                Ok((timestamp, serial))
            })?;
        } else {
            let prefix = keys::event_scan_prefix();
            for item in self
                .db
                .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward))
            {
                let (key, _) = item?;
                if !key.starts_with(&prefix) {
                    break;
                }
                serials.insert(keys::parse_event_key(&key)?.get());
            }
        }

        Ok(serials)
    }

    /// Iterates one prefix range, applying the inclusive timestamp bounds
    /// to each decoded key and collecting the surviving serials.
    fn scan_serials(
        &self,
        prefix: &[u8],
        filter: &Filter,
        out: &mut BTreeSet<u64>,
        decode: impl Fn(&[u8]) -> Result<(u64, Uint40)>,
    ) -> Result<()> {
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let (timestamp, serial) = decode(&key)?;
            if in_time_range(filter, timestamp as i64) {
                out.insert(serial.get());
            }
        }
        Ok(())
    }
}

fn in_time_range(filter: &Filter, timestamp: i64) -> bool {
    (filter.since <= 0 || timestamp >= filter.since)
        && (filter.until <= 0 || timestamp <= filter.until)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::event::{Event, Payload};
    use crate::signer::{KeypairSigner, Signer};

    fn store_with_events(dir: &std::path::Path, timestamps: &[i64]) -> (Database, Vec<Vec<u8>>) {
        let store = Database::open(&Config::new(dir.join("db"))).unwrap();
        let signer = KeypairSigner::generate();
        let mut ids = Vec::new();
        for &timestamp in timestamps {
            let mut event = Event::new(
                signer.public_key(),
                timestamp,
                Payload::text(format!("at {timestamp}")),
            );
            event.sign(&signer).unwrap();
            ids.push(event.id().unwrap().to_vec());
            store.store_event(&event).unwrap();
        }
        (store, ids)
    }

    #[test]
    fn ids_filter_preserves_caller_order_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ids) = store_with_events(dir.path(), &[10, 20]);

        let filter = Filter {
            ids: vec![ids[1].clone(), ids[0].clone(), ids[1].clone()],
            ..Filter::default()
        };
        let result = store.query_events(&filter).unwrap();
        assert_eq!(result, vec![ids[1].clone(), ids[0].clone(), ids[1].clone()]);

        let filter = Filter {
            ids: vec![ids[1].clone(), ids[0].clone()],
            not_ids: vec![ids[0].clone()],
            ..Filter::default()
        };
        assert_eq!(store.query_events(&filter).unwrap(), vec![ids[1].clone()]);
    }

    #[test]
    fn until_before_since_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_with_events(dir.path(), &[10, 20, 30]);

        let filter = Filter {
            since: 25,
            until: 15,
            ..Filter::default()
        };
        assert!(store.query_events(&filter).unwrap().is_empty());
    }

    #[test]
    fn unknown_tag_key_yields_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_with_events(dir.path(), &[10]);

        let mut tags = crate::filter::TagQuery::new();
        tags.insert(b"nonexistent".to_vec(), vec![b"value".to_vec()]);
        let filter = Filter {
            tags,
            ..Filter::default()
        };
        assert!(store.query_events(&filter).unwrap().is_empty());
    }

    #[test]
    fn timestamp_bounds_are_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ids) = store_with_events(dir.path(), &[10, 20, 30]);

        let filter = Filter {
            since: 20,
            until: 20,
            sort: SortOrder::Ascending,
            ..Filter::default()
        };
        assert_eq!(store.query_events(&filter).unwrap(), vec![ids[1].clone()]);
    }
}
