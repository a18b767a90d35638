//! C5 — the versioned record store.
//!
//! Owns the canonical "current" snapshot and the secondary indices that
//! views query, and serializes commits through a [`CommitLog`]. Grounded in
//! the original's `names_viewcreate`/`names_viewcommit` (`views.c`): a
//! single dictionary with several index sets layered over it, rather than
//! one store per view.

use std::collections::BTreeMap;
use std::sync::Arc;

use hickory_proto::rr::Name;
use parking_lot::Mutex;

use super::commitlog::{CommitLog, ViewCursor};
use super::index::{specs, Index, NameKey};
use super::record::Record;
use crate::error::Result;

fn name_key(name: &Name) -> NameKey {
    name.iter().flat_map(|l| l.to_ascii_lowercase()).collect()
}

struct StoreInner {
    /// Highest known revision per name, used by `take`/`place`/`amend` to
    /// find the record a caller should build the next revision from.
    latest: BTreeMap<NameKey, Arc<Record>>,
    nameupcoming: Index,
    namehierarchy: Index,
    nameready: Index,
    validnow: Index,
    validchanges: Index,
    validinserts: Index,
    validdeletes: Index,
    expiry: Index,
    denialname: Index,
}

impl StoreInner {
    fn insert_all(&mut self, record: Arc<Record>) {
        self.latest.insert(name_key(record.name()), record.clone());
        self.nameupcoming.insert(record.clone());
        self.namehierarchy.insert(record.clone());
        self.nameready.insert(record.clone());
        self.validnow.insert(record.clone());
        self.validchanges.insert(record.clone());
        self.validinserts.insert(record.clone());
        self.validdeletes.insert(record.clone());
        self.expiry.insert(record.clone());
        self.denialname.insert(record);
    }
}

/// The store behind every [`super::view::View`]. Cheap to clone (it is
/// always held as `Arc<RecordStore>`).
pub struct RecordStore {
    inner: Mutex<StoreInner>,
    log: CommitLog,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        RecordStore {
            inner: Mutex::new(StoreInner {
                latest: BTreeMap::new(),
                nameupcoming: specs::nameupcoming(),
                namehierarchy: specs::namehierarchy(),
                nameready: specs::nameready(),
                validnow: specs::validnow(),
                validchanges: specs::validchanges(),
                validinserts: specs::validinserts(),
                validdeletes: specs::validdeletes(),
                expiry: specs::expiry(),
                denialname: specs::denialname(),
            }),
            log: CommitLog::new(),
        }
    }

    pub fn cursor(&self) -> ViewCursor {
        self.log.cursor()
    }

    /// The latest known revision of `name`, regardless of validity window.
    pub fn latest(&self, name: &Name) -> Option<Arc<Record>> {
        self.inner.lock().latest.get(&name_key(name)).cloned()
    }

    /// The current (`valid_from` set, `valid_upto` unset) revision of
    /// `name`.
    pub fn current(&self, name: &Name) -> Option<Arc<Record>> {
        self.inner.lock().nameready.lookup_by_name(name).cloned()
    }

    /// Snapshot of every currently valid record, in name order.
    pub fn all_current(&self) -> Vec<Arc<Record>> {
        self.inner.lock().nameready.iter().cloned().collect()
    }

    /// A point-in-time copy of the `latest` map: the newest known revision
    /// per name, regardless of validity. A [`super::view::View`] takes one
    /// of these at construction and on every `reset()` so its `take`/
    /// `latest` reads answer from a snapshot fixed at that point rather
    /// than the live, concurrently-mutating store (`spec.md` §5).
    pub fn snapshot_latest(&self) -> BTreeMap<NameKey, Arc<Record>> {
        self.inner.lock().latest.clone()
    }

    /// Currently valid records that have never completed a signing pass
    /// (`expiry` unset). `expiring_before` alone cannot find these: the
    /// `expiry` index only admits records that already carry one, so a
    /// record fresh out of `Record::new`/`open_validity_window` never
    /// appears there for its first signing pass.
    pub fn never_signed(&self) -> Vec<Arc<Record>> {
        self.inner
            .lock()
            .nameready
            .iter()
            .filter(|r| r.expiry().is_none())
            .cloned()
            .collect()
    }

    /// Snapshot of every record whose `expiry` has already passed `now`
    /// (unix seconds), used by the pipeline to pick up re-signing work.
    pub fn expiring_before(&self, now: i64) -> Vec<Arc<Record>> {
        self.inner
            .lock()
            .expiry
            .iter()
            .take_while(|r| r.expiry().map(|e| e <= now).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Records newly valid as of `since_serial` (exclusive), in
    /// `valid_from` order — the IXFR "added" half.
    pub fn valid_since(&self, since_serial: u32) -> Vec<Arc<Record>> {
        self.inner
            .lock()
            .validinserts
            .iter()
            .filter(|r| r.valid_from().map(|v| v > since_serial).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Records retired as of `since_serial` (exclusive), in `valid_upto`
    /// order — the IXFR "removed" half.
    pub fn retired_since(&self, since_serial: u32) -> Vec<Arc<Record>> {
        self.inner
            .lock()
            .validdeletes
            .iter()
            .filter(|r| r.valid_upto().map(|v| v > since_serial).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// The denial-chain neighbor that would sort immediately after
    /// `record` in denial-name order, wrapping at the apex.
    pub fn denial_successor(&self, record: &Record) -> Option<Arc<Record>> {
        self.inner.lock().denialname.next_wrapping(record).cloned()
    }

    pub fn denial_predecessor(&self, record: &Record) -> Option<Arc<Record>> {
        self.inner.lock().denialname.prev_wrapping(record).cloned()
    }

    /// Evict `record` from every index and the `latest` map (`spec.md`
    /// §4.4 step 4: purge). A no-op if a newer revision has already
    /// replaced it, mirroring [`super::index::Index::remove`]'s own
    /// replace-race guard.
    pub fn purge(&self, record: &Arc<Record>) {
        let mut inner = self.inner.lock();
        let key = name_key(record.name());
        if let Some(existing) = inner.latest.get(&key) {
            if existing.revision() == record.revision() {
                inner.latest.remove(&key);
            }
        }
        inner.nameupcoming.remove(record);
        inner.namehierarchy.remove(record);
        inner.nameready.remove(record);
        inner.validnow.remove(record);
        inner.validchanges.remove(record);
        inner.validinserts.remove(record);
        inner.validdeletes.remove(record);
        inner.expiry.remove(record);
        inner.denialname.remove(record);
    }

    /// Commit a locally staged change-set against `cursor`. On success the
    /// records become visible to every future `current`/`latest`/iterator
    /// call and `cursor` advances; on [`crate::Error::Conflict`] nothing is
    /// applied and the caller should reset and retry (`spec.md` §4.1).
    pub fn commit(&self, cursor: &mut ViewCursor, pending: Vec<Arc<Record>>) -> Result<()> {
        let touched = pending.iter().map(|r| name_key(r.name())).collect();
        self.log.commit(cursor, touched)?;
        let mut inner = self.inner.lock();
        for record in pending {
            inner.insert_all(record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hickory_proto::rr::{RData, RecordType};
    use std::str::FromStr;

    #[test]
    fn commit_makes_record_current() {
        let store = RecordStore::new();
        let mut cursor = store.cursor();
        let name = Name::from_str("www.example.").unwrap();
        let mut r = Record::new(name.clone());
        r.insert_rdata(RecordType::A, 300, RData::A("127.0.0.1".parse().unwrap()));
        r.set_valid_from(1);
        store.commit(&mut cursor, vec![Arc::new(r)]).unwrap();
        assert!(store.current(&name).is_some());
    }

    #[test]
    fn stale_cursor_conflicts_on_overlapping_name() {
        let store = RecordStore::new();
        let name = Name::from_str("www.example.").unwrap();
        let mut a = store.cursor();
        let mut b = store.cursor();
        let mut r1 = Record::new(name.clone());
        r1.set_valid_from(1);
        store.commit(&mut a, vec![Arc::new(r1)]).unwrap();

        let mut r2 = Record::new(name);
        r2.set_valid_from(2);
        let err = store.commit(&mut b, vec![Arc::new(r2)]);
        assert!(err.is_err());
    }
}
