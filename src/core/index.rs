//! C2 — ordered indices over records.
//!
//! Each index is an ordered map whose key-extractor and acceptance
//! predicate determine what subset of records it contains and their
//! traversal order (`spec.md` §3, §4.1). Rather than hand-maintained
//! red-black trees with function-pointer comparators (the original's
//! `index.c`), an index here owns only `Arc<Record>` handles and is driven
//! by a closure-valued key extractor (`spec.md` §9 design note).

use std::collections::BTreeMap;
use std::sync::Arc;

use hickory_proto::rr::Name;

use super::record::Record;
use crate::dnsname::hierarchy_key;

/// Sortable byte form of a `Name`, lower-cased label-by-label.
pub type NameKey = Vec<u8>;

fn name_key(name: &Name) -> NameKey {
    name.iter().flat_map(|l| l.to_ascii_lowercase()).collect()
}

/// The key a record sorts under in one particular index. Variants
/// correspond to the orderings named in `spec.md` §3.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Name(NameKey),
    Hierarchy(Vec<Vec<u8>>),
    Expiry(i64, NameKey, u64),
    DenialName(Vec<u8>),
    ValidFrom(u32, NameKey),
    ValidUpto(u32, NameKey),
}

/// How a colliding key is resolved on insert, per the acceptance table in
/// `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Not possible: the key already encodes enough to make it unique.
    NotPossible,
    /// Keep whichever record has the higher revision.
    KeepHigherRevision,
}

/// The outcome of inserting a candidate record into an index, matching the
/// "ignored / accepted-replace / accepted-drop-existing" vocabulary of
/// `spec.md` §4.1 step 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Ignored,
    AcceptedReplace(Option<Arc<Record>>),
}

/// One named index: a key function, a tie-break policy, and the ordered
/// map itself.
pub struct Index {
    pub name: &'static str,
    key_of: Box<dyn Fn(&Record) -> Option<IndexKey> + Send + Sync>,
    tie_break: TieBreak,
    map: BTreeMap<IndexKey, Arc<Record>>,
}

impl Index {
    pub fn new(
        name: &'static str,
        tie_break: TieBreak,
        key_of: impl Fn(&Record) -> Option<IndexKey> + Send + Sync + 'static,
    ) -> Self {
        Index {
            name,
            key_of: Box::new(key_of),
            tie_break,
            map: BTreeMap::new(),
        }
    }

    pub fn accepts(&self, record: &Record) -> bool {
        (self.key_of)(record).is_some()
    }

    pub fn key_for(&self, record: &Record) -> Option<IndexKey> {
        (self.key_of)(record)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Insert `record`, applying the index's acceptance predicate and
    /// tie-break rule. Returns whether it was ignored or accepted, and if
    /// accepted, the record it replaced (if any) so the caller (the view's
    /// commit logic) can decide whether the replaced record should be
    /// considered disposed.
    pub fn insert(&mut self, record: Arc<Record>) -> InsertOutcome {
        let Some(key) = (self.key_of)(&record) else {
            return InsertOutcome::Ignored;
        };
        match self.tie_break {
            TieBreak::NotPossible => {
                let prev = self.map.insert(key, record);
                InsertOutcome::AcceptedReplace(prev)
            }
            TieBreak::KeepHigherRevision => match self.map.get(&key) {
                Some(existing) if existing.revision() >= record.revision() => {
                    InsertOutcome::Ignored
                }
                Some(_) => {
                    let prev = self.map.insert(key, record);
                    InsertOutcome::AcceptedReplace(prev)
                }
                None => {
                    self.map.insert(key, record);
                    InsertOutcome::AcceptedReplace(None)
                }
            },
        }
    }

    /// Remove `record` from the index, but only if it is still the entry
    /// stored under its key (a newer revision may already have replaced
    /// it, in which case this is a no-op) — needed so rollback of a local
    /// change-set never clobbers a concurrently committed replacement.
    pub fn remove(&mut self, record: &Record) {
        if let Some(key) = (self.key_of)(record) {
            if let Some(existing) = self.map.get(&key) {
                if existing.revision() == record.revision() && existing.name() == record.name() {
                    self.map.remove(&key);
                }
            }
        }
    }

    pub fn get(&self, key: &IndexKey) -> Option<&Arc<Record>> {
        self.map.get(key)
    }

    pub fn lookup_by_name(&self, name: &Name) -> Option<&Arc<Record>> {
        self.map.get(&IndexKey::Name(name_key(name)))
    }

    /// In-order iteration over the index, the traversal order described in
    /// `spec.md` §3/§4.3.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<Record>> {
        self.map.values()
    }

    /// The record immediately following `record`'s key, wrapping to the
    /// first entry at the end — used by the denial chain (`spec.md`
    /// §4.3).
    pub fn next_wrapping(&self, record: &Record) -> Option<&Arc<Record>> {
        let key = (self.key_of)(record)?;
        let mut range = self.map.range((
            std::ops::Bound::Excluded(key),
            std::ops::Bound::Unbounded,
        ));
        range.next().map(|(_, v)| v).or_else(|| self.map.values().next())
    }

    /// The record immediately preceding `record`'s key, wrapping to the
    /// last entry at the start.
    pub fn prev_wrapping(&self, record: &Record) -> Option<&Arc<Record>> {
        let key = (self.key_of)(record)?;
        let mut range = self
            .map
            .range((std::ops::Bound::Unbounded, std::ops::Bound::Excluded(key)));
        range.next_back().map(|(_, v)| v).or_else(|| self.map.values().next_back())
    }
}

/// Constructors for the named orderings in `spec.md` §3 that `RecordStore`
/// actually wires up. `spec.md` also names `namerevision` (primary-key,
/// every revision), `currentset`/`relevantset` (duplicates of `nameready`'s
/// and a plain valid-upto-unset filter respectively) and `outdated`
/// (retention-cutoff filter): none of them are instantiated anywhere —
/// `RecordStore`'s `latest` map and `View`'s own per-view snapshot already
/// address records by name directly, `purge_candidates` (`pipeline/mod.rs`)
/// filters `validdeletes` ad hoc instead of needing a cutoff-parameterized
/// index, and nothing else in this crate addresses a record by raw
/// `(name, revision)`. Keeping unused constructors around as the sole
/// representation of those names in the codebase is worse than not having
/// them; `SPEC_FULL.md`/`DESIGN.md` record the nine below as what's
/// actually implemented.
pub mod specs {
    use super::*;

    pub fn nameupcoming() -> Index {
        Index::new("nameupcoming", TieBreak::KeepHigherRevision, |r| {
            Some(IndexKey::Name(name_key(r.name())))
        })
    }

    pub fn namehierarchy() -> Index {
        Index::new("namehierarchy", TieBreak::KeepHigherRevision, |r| {
            Some(IndexKey::Hierarchy(hierarchy_key(r.name())))
        })
    }

    fn current(r: &Record) -> bool {
        r.valid_from().is_some() && r.valid_upto().is_none()
    }

    pub fn nameready() -> Index {
        Index::new("nameready", TieBreak::KeepHigherRevision, |r| {
            current(r).then(|| IndexKey::Name(name_key(r.name())))
        })
    }

    pub fn validnow() -> Index {
        Index::new("validnow", TieBreak::NotPossible, |r| {
            (current(r) && r.expiry().is_some()).then(|| IndexKey::Name(name_key(r.name())))
        })
    }

    pub fn validchanges() -> Index {
        Index::new("validchanges", TieBreak::NotPossible, |r| {
            (r.valid_from().is_some() && r.expiry().is_some())
                .then(|| IndexKey::ValidFrom(r.valid_from().unwrap(), name_key(r.name())))
        })
    }

    pub fn validinserts() -> Index {
        Index::new("validinserts", TieBreak::NotPossible, |r| {
            (r.valid_from().is_some() && r.expiry().is_some())
                .then(|| IndexKey::ValidFrom(r.valid_from().unwrap(), name_key(r.name())))
        })
    }

    pub fn validdeletes() -> Index {
        Index::new("validdeletes", TieBreak::NotPossible, |r| {
            (r.valid_upto().is_some() && r.expiry().is_some())
                .then(|| IndexKey::ValidUpto(r.valid_upto().unwrap(), name_key(r.name())))
        })
    }

    pub fn expiry() -> Index {
        Index::new("expiry", TieBreak::NotPossible, |r| {
            r.expiry()
                .map(|e| IndexKey::Expiry(e, name_key(r.name()), r.revision()))
        })
    }

    pub fn denialname() -> Index {
        Index::new("denialname", TieBreak::NotPossible, |r| {
            r.denial_name().map(|n| IndexKey::DenialName(n.to_vec()))
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn rec(name: &str) -> Arc<Record> {
        Arc::new(Record::new(Name::from_str(name).unwrap()))
    }

    #[test]
    fn nameupcoming_keeps_higher_revision() {
        let mut idx = specs::nameupcoming();
        let r1 = rec("www.example.");
        idx.insert(r1.clone());
        let r2 = Arc::new(r1.update());
        let outcome = idx.insert(r2.clone());
        assert!(matches!(outcome, InsertOutcome::AcceptedReplace(Some(_))));
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.iter().next().unwrap().revision(), 2);

        // Re-inserting the older revision is ignored.
        assert_eq!(idx.insert(r1), InsertOutcome::Ignored);
    }

    #[test]
    fn nameready_excludes_non_current() {
        let mut idx = specs::nameready();
        let mut r = Record::new(Name::from_str("www.example.").unwrap());
        assert!(!idx.accepts(&r));
        r.set_valid_from(1);
        assert!(idx.accepts(&r));
        r.set_valid_upto(2);
        assert!(!idx.accepts(&r));
    }
}
