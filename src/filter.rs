//! Query filters and their textual codec.
//!
//! A filter either names exact event ids, or combines author, tag, and
//! timestamp selectors. The textual form mirrors the event codec: one
//! sentinel per line, repeated lines accumulating into their slice or map.
//! Naming ids is exclusive: an `IDS:` line cannot be mixed with any other
//! sentinel, in either order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::{Result, StoreError};
use crate::event::Event;
use crate::text;

/// Tag selector: key → acceptable values. Within one key any listed value
/// matches; across keys every key must match.
pub type TagQuery = BTreeMap<Vec<u8>, Vec<Vec<u8>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(Self::Ascending),
            "desc" => Ok(Self::Descending),
            other => Err(StoreError::Format(format!("unknown sort order {other:?}"))),
        }
    }
}

const SENTINEL_IDS: &[u8] = b"IDS:";
const SENTINEL_NOT_IDS: &[u8] = b"NOTIDS:";
const SENTINEL_AUTHORS: &[u8] = b"AUTHORS:";
const SENTINEL_NOT_AUTHORS: &[u8] = b"NOTAUTHORS:";
const SENTINEL_TAGS: &[u8] = b"TAGS:";
const SENTINEL_NOT_TAGS: &[u8] = b"NOTTAGS:";
const SENTINEL_SINCE: &[u8] = b"SINCE:";
const SENTINEL_UNTIL: &[u8] = b"UNTIL:";
const SENTINEL_SORT: &[u8] = b"SORT:";

/// A query request. `since` and `until` are inclusive bounds; zero means
/// unset. When `ids` is non-empty every other positive selector is ignored
/// and the query degenerates to `ids \ not_ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub ids: Vec<Vec<u8>>,
    pub not_ids: Vec<Vec<u8>>,
    pub authors: Vec<Vec<u8>>,
    pub not_authors: Vec<Vec<u8>>,
    pub tags: TagQuery,
    pub not_tags: TagQuery,
    pub since: i64,
    pub until: i64,
    pub sort: SortOrder,
}

impl Filter {
    /// Encodes the textual form. With ids present only `IDS:` lines are
    /// written; a `SORT:` line appears only for the non-default ascending
    /// order.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let mut lines: Vec<Vec<u8>> = Vec::new();

        if !self.ids.is_empty() {
            for id in &self.ids {
                lines.push(b64_line(SENTINEL_IDS, id));
            }
            return Ok(lines.join(&b"\n"[..]));
        }

        for id in &self.not_ids {
            lines.push(b64_line(SENTINEL_NOT_IDS, id));
        }
        for author in &self.authors {
            lines.push(b64_line(SENTINEL_AUTHORS, author));
        }
        for author in &self.not_authors {
            lines.push(b64_line(SENTINEL_NOT_AUTHORS, author));
        }
        marshal_tags(&mut lines, SENTINEL_TAGS, &self.tags)?;
        marshal_tags(&mut lines, SENTINEL_NOT_TAGS, &self.not_tags)?;
        if self.since != 0 {
            lines.push(decimal_line(SENTINEL_SINCE, self.since));
        }
        if self.until != 0 {
            lines.push(decimal_line(SENTINEL_UNTIL, self.until));
        }
        if self.sort == SortOrder::Ascending {
            let mut line = SENTINEL_SORT.to_vec();
            line.extend_from_slice(self.sort.as_str().as_bytes());
            lines.push(line);
        }

        Ok(lines.join(&b"\n"[..]))
    }

    /// Parses the textual form, enforcing the `IDS:` exclusivity rule in
    /// both directions.
    pub fn unmarshal(data: &[u8]) -> Result<Filter> {
        let mut filter = Filter::default();
        if data.is_empty() {
            return Ok(filter);
        }

        let mut saw_ids = false;
        let mut saw_other = false;

        for line in data.split(|&b| b == b'\n') {
            if let Some(rest) = line.strip_prefix(SENTINEL_IDS) {
                if saw_other {
                    return Err(StoreError::Format(
                        "IDS found but other fields already present".into(),
                    ));
                }
                saw_ids = true;
                filter.ids.push(URL_SAFE_NO_PAD.decode(rest)?);
                continue;
            }
            if saw_ids {
                return Err(StoreError::Format(
                    "other fields found but IDS already present".into(),
                ));
            }
            saw_other = true;

            if let Some(rest) = line.strip_prefix(SENTINEL_NOT_IDS) {
                filter.not_ids.push(URL_SAFE_NO_PAD.decode(rest)?);
            } else if let Some(rest) = line.strip_prefix(SENTINEL_AUTHORS) {
                filter.authors.push(URL_SAFE_NO_PAD.decode(rest)?);
            } else if let Some(rest) = line.strip_prefix(SENTINEL_NOT_AUTHORS) {
                filter.not_authors.push(URL_SAFE_NO_PAD.decode(rest)?);
            } else if let Some(rest) = line.strip_prefix(SENTINEL_TAGS) {
                let (key, value) = unmarshal_tag(rest)?;
                filter.tags.entry(key).or_default().push(value);
            } else if let Some(rest) = line.strip_prefix(SENTINEL_NOT_TAGS) {
                let (key, value) = unmarshal_tag(rest)?;
                filter.not_tags.entry(key).or_default().push(value);
            } else if let Some(rest) = line.strip_prefix(SENTINEL_SINCE) {
                filter.since = parse_decimal(rest)?;
            } else if let Some(rest) = line.strip_prefix(SENTINEL_UNTIL) {
                filter.until = parse_decimal(rest)?;
            } else if let Some(rest) = line.strip_prefix(SENTINEL_SORT) {
                let raw = std::str::from_utf8(rest)
                    .map_err(|_| StoreError::Format("SORT is not ASCII".into()))?;
                filter.sort = raw.parse()?;
            } else {
                return Err(StoreError::Format(format!(
                    "unknown sentinel on line {:?}",
                    String::from_utf8_lossy(line)
                )));
            }
        }

        Ok(filter)
    }

    /// The exact predicate the indexes approximate: used by the planner to
    /// re-validate candidates after truncated-hash scans, and usable as a
    /// direct-scan oracle. `id` is the precomputed id of `event`.
    pub fn matches(&self, id: &[u8], event: &Event) -> bool {
        if !self.ids.is_empty() {
            return self.ids.iter().any(|candidate| candidate == id)
                && !self.not_ids.iter().any(|candidate| candidate == id);
        }
        if self.not_ids.iter().any(|candidate| candidate == id) {
            return false;
        }
        if !self.authors.is_empty()
            && !self
                .authors
                .iter()
                .any(|author| author.as_slice() == event.pubkey.as_slice())
        {
            return false;
        }
        if self
            .not_authors
            .iter()
            .any(|author| author.as_slice() == event.pubkey.as_slice())
        {
            return false;
        }
        for (key, values) in &self.tags {
            let hit = event.tags.iter().any(|tag| {
                tag.key.as_bytes() == key.as_slice()
                    && values.iter().any(|value| tag.value.as_bytes() == value)
            });
            if !hit {
                return false;
            }
        }
        for (key, values) in &self.not_tags {
            let hit = event.tags.iter().any(|tag| {
                tag.key.as_bytes() == key.as_slice()
                    && values.iter().any(|value| tag.value.as_bytes() == value)
            });
            if hit {
                return false;
            }
        }
        if self.since > 0 && event.timestamp < self.since {
            return false;
        }
        if self.until > 0 && event.timestamp > self.until {
            return false;
        }
        true
    }
}

fn b64_line(sentinel: &[u8], raw: &[u8]) -> Vec<u8> {
    let mut line = sentinel.to_vec();
    line.extend_from_slice(URL_SAFE_NO_PAD.encode(raw).as_bytes());
    line
}

fn decimal_line(sentinel: &[u8], value: i64) -> Vec<u8> {
    let mut line = sentinel.to_vec();
    line.extend_from_slice(value.to_string().as_bytes());
    line
}

fn marshal_tags(lines: &mut Vec<Vec<u8>>, sentinel: &[u8], tags: &TagQuery) -> Result<()> {
    for (key, values) in tags {
        if key.contains(&b':') {
            return Err(StoreError::Format("tag key may not contain a colon".into()));
        }
        for value in values {
            let mut line = sentinel.to_vec();
            text::write_escaped(&mut line, key);
            line.push(b':');
            line.extend_from_slice(URL_SAFE_NO_PAD.encode(value).as_bytes());
            lines.push(line);
        }
    }
    Ok(())
}

fn unmarshal_tag(rest: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let split = rest
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| StoreError::Format("invalid tag selector format".into()))?;
    let key = text::read_escaped(&rest[..split]);
    let value = URL_SAFE_NO_PAD.decode(&rest[split + 1..])?;
    Ok((key, value))
}

fn parse_decimal(raw: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| StoreError::Format("timestamp is not ASCII decimal".into()))?;
    text.parse::<i64>()
        .map_err(|err| StoreError::Format(format!("invalid timestamp: {err}")))
}
