//! C3 — a view: a snapshot-isolated handle onto the [`RecordStore`].
//!
//! Grounded in `views.c`'s `names_view_INPUT`/`PREPARE`/`SIGN`/`OUTPUT`
//! views: each is a cursor into the shared store plus a local, uncommitted
//! change-set. `place`/`take`/`amend`/`underwrite`/`overwrite`/`update`
//! stage changes locally; `commit` attempts to publish them atomically and
//! `reset` discards them, both named directly after the original's
//! `names_viewcommit`/`names_viewreset` (`spec.md` §4.1).
//!
//! A view's `take`/`latest` answer from `snapshot`, a copy of the store's
//! `latest` map taken at construction and refreshed only on `reset()`
//! (`spec.md` §5: "a view observes a snapshot fixed at its last reset").
//! Another view's commit becomes visible here only after this view resets,
//! never mid-transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use hickory_proto::rr::Name;

use super::commitlog::ViewCursor;
use super::index::NameKey;
use super::record::Record;
use super::store::RecordStore;
use crate::error::{Error, Result};

fn name_key(name: &Name) -> NameKey {
    name.iter().flat_map(|l| l.to_ascii_lowercase()).collect()
}

/// Which stage of the pipeline a view represents (`spec.md` §4 overview).
/// Purely informational — all views share the same operations — but kept
/// so logging and the pipeline driver can say which stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Input,
    Prepare,
    Sign,
    Output,
}

pub struct View {
    store: Arc<RecordStore>,
    kind: ViewKind,
    cursor: ViewCursor,
    snapshot: BTreeMap<NameKey, Arc<Record>>,
    pending: Vec<Arc<Record>>,
}

impl View {
    pub fn new(store: Arc<RecordStore>, kind: ViewKind) -> Self {
        let cursor = store.cursor();
        let snapshot = store.snapshot_latest();
        View {
            store,
            kind,
            cursor,
            snapshot,
            pending: Vec::new(),
        }
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    /// `names_take`: the current revision of `name` as of this view's
    /// snapshot, if any, without staging a change.
    pub fn take(&self, name: &Name) -> Option<Arc<Record>> {
        self.latest(name)
            .filter(|r| r.valid_from().is_some() && r.valid_upto().is_none())
    }

    /// The latest known revision as of this view's snapshot, regardless of
    /// validity, used when a caller needs to build on top of a
    /// not-yet-current record (e.g. one already staged by an earlier step
    /// in the same transaction).
    pub fn latest(&self, name: &Name) -> Option<Arc<Record>> {
        self.pending
            .iter()
            .rev()
            .find(|r| r.name() == name)
            .cloned()
            .or_else(|| self.snapshot.get(&name_key(name)).cloned())
    }

    /// `names_place`: stage a brand-new record for a name with no prior
    /// revision.
    pub fn place(&mut self, name: Name) -> Arc<Record> {
        let record = Arc::new(Record::new(name));
        self.stage(record.clone());
        record
    }

    /// `names_amend`: take-or-create, then stage the next revision for
    /// modification.
    pub fn amend(&mut self, name: &Name) -> Arc<Record> {
        let next = match self.latest(name) {
            Some(existing) => Arc::new(existing.update()),
            None => Arc::new(Record::new(name.clone())),
        };
        self.stage(next.clone());
        next
    }

    /// `names_underwrite`: stage the next revision of `name`, keeping data
    /// but dropping validity. No-op if `name` has no current revision.
    pub fn underwrite(&mut self, name: &Name) -> Option<Arc<Record>> {
        let next = Arc::new(self.latest(name)?.underwrite());
        self.stage(next.clone());
        Some(next)
    }

    /// `names_overwrite`: stage the next revision of `name`, dropping both
    /// data and validity.
    pub fn overwrite(&mut self, name: &Name) -> Option<Arc<Record>> {
        let next = Arc::new(self.latest(name)?.overwrite());
        self.stage(next.clone());
        Some(next)
    }

    /// `names_update`: stage the next revision of `name`, carrying
    /// everything forward unchanged (used to bump a record's revision
    /// without otherwise touching it, e.g. to anchor a denial update).
    pub fn update(&mut self, name: &Name) -> Option<Arc<Record>> {
        let next = Arc::new(self.latest(name)?.update());
        self.stage(next.clone());
        Some(next)
    }

    /// Stage removal of `name` as of `serial`: the next revision carries
    /// its data forward but closes its validity window.
    pub fn remove(&mut self, name: &Name, serial: u32) -> Option<Arc<Record>> {
        let mut next = self.latest(name)?.update();
        next.set_valid_upto(serial);
        let next = Arc::new(next);
        self.stage(next.clone());
        Some(next)
    }

    fn stage(&mut self, record: Arc<Record>) {
        self.pending.push(record);
    }

    /// Stage an already fully-built record (produced by the signing or
    /// denial engine, which compute a next revision directly rather than
    /// through `underwrite`/`overwrite`/`update`).
    pub fn stage_computed(&mut self, record: Record) -> Arc<Record> {
        let record = Arc::new(record);
        self.stage(record.clone());
        record
    }

    /// Anything staged since the last commit/reset.
    pub fn pending(&self) -> &[Arc<Record>] {
        &self.pending
    }

    /// `names_viewcommit`: attempt to publish the staged change-set. On
    /// `Err(Error::Conflict)` the view's cursor and snapshot are unchanged
    /// and the caller should `reset` and rebuild its change-set against the
    /// now-current state (`spec.md` §4.1). On success the committed records
    /// are folded into this view's own snapshot immediately, so a
    /// subsequent `take`/`latest` in the same transaction sees them without
    /// needing a full `reset`.
    pub fn commit(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        self.store.commit(&mut self.cursor, pending.clone())?;
        for record in pending {
            self.snapshot.insert(name_key(record.name()), record);
        }
        Ok(())
    }

    /// `names_viewreset`: discard the staged change-set without publishing
    /// it, and catch this view's snapshot up to the store's current state
    /// — the point at which a conflicting commit it missed becomes visible
    /// for a retry to build against.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.cursor = self.store.cursor();
        self.snapshot = self.store.snapshot_latest();
    }
}

/// Retry a view transaction until it commits cleanly, resolving
/// `Error::Conflict` locally instead of letting it escape to the caller
/// (`spec.md` §7: "`Conflict` never escapes a view's `commit`"). `build` is
/// called once per attempt against a freshly reset view (on the first
/// attempt, whatever `view` already has pending) and should stage exactly
/// the change-set the caller wants published; any other error from `build`
/// or from `commit` itself is returned immediately.
pub fn commit_with_retry(
    view: &mut View,
    mut build: impl FnMut(&mut View) -> Result<()>,
) -> Result<()> {
    loop {
        build(view)?;
        match view.commit() {
            Ok(()) => return Ok(()),
            Err(Error::Conflict(_)) => view.reset(),
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hickory_proto::rr::{RData, RecordType};
    use std::str::FromStr;

    #[test]
    fn place_then_commit_becomes_current() {
        let store = Arc::new(RecordStore::new());
        let mut view = View::new(store.clone(), ViewKind::Input);
        let name = Name::from_str("www.example.").unwrap();
        let rec = view.place(name.clone());
        assert_eq!(rec.revision(), 1);
        view.commit().unwrap();
        assert!(store.latest(&name).is_some());
    }

    #[test]
    fn reset_discards_pending() {
        let store = Arc::new(RecordStore::new());
        let mut view = View::new(store.clone(), ViewKind::Input);
        let name = Name::from_str("www.example.").unwrap();
        view.place(name.clone());
        view.reset();
        assert!(view.pending().is_empty());
        assert!(store.latest(&name).is_none());
    }

    #[test]
    fn amend_bumps_revision_of_current() {
        let store = Arc::new(RecordStore::new());
        let mut view = View::new(store.clone(), ViewKind::Input);
        let name = Name::from_str("www.example.").unwrap();
        {
            let mut r = Record::new(name.clone());
            r.insert_rdata(RecordType::A, 300, RData::A("127.0.0.1".parse().unwrap()));
            r.set_valid_from(1);
            let mut cursor = store.cursor();
            store.commit(&mut cursor, vec![Arc::new(r)]).unwrap();
        }
        view.reset(); // pick up the commit made directly against the store
        let amended = view.amend(&name);
        assert_eq!(amended.revision(), 2);
        assert!(amended.has_type(RecordType::A));
    }

    #[test]
    fn view_does_not_see_concurrent_commit_until_reset() {
        let store = Arc::new(RecordStore::new());
        let view = View::new(store.clone(), ViewKind::Input);
        let name = Name::from_str("www.example.").unwrap();

        let mut r = Record::new(name.clone());
        r.set_valid_from(1);
        let mut cursor = store.cursor();
        store.commit(&mut cursor, vec![Arc::new(r)]).unwrap();

        assert!(view.latest(&name).is_none(), "snapshot predates the commit");
    }

    #[test]
    fn commit_with_retry_resolves_conflict() {
        let store = Arc::new(RecordStore::new());
        let name = Name::from_str("www.example.").unwrap();

        let mut other = View::new(store.clone(), ViewKind::Prepare);
        other.place(name.clone());
        other.commit().unwrap();

        let mut view = View::new(store.clone(), ViewKind::Input);
        let mut attempts = 0;
        commit_with_retry(&mut view, |v| {
            attempts += 1;
            v.amend(&name);
            Ok(())
        })
        .unwrap();

        assert_eq!(attempts, 2, "first attempt's stale snapshot must conflict, second must succeed");
        assert_eq!(store.latest(&name).unwrap().revision(), 2);
    }
}
