//! C4 — cross-view commit/conflict detection.
//!
//! Grounded in the original's `commitlog.c`: each view commits against a
//! shared log of recently-committed change-sets rather than taking a
//! global write lock for the whole transaction. A commit is accepted only
//! if no entry appended since the view's cursor touched a name the view's
//! own change-set also touched; otherwise the view resets and retries
//! (`spec.md` §4.1, "Commit protocol").
//!
//! `parking_lot::Mutex` stands in for the original's single pthread mutex
//! guarding the log (`spec.md` §9 ambient stack).

use std::collections::{BTreeSet, VecDeque};

use parking_lot::Mutex;

use super::index::NameKey;
use crate::error::{Error, Result};

/// How many past commits a view is allowed to have missed before it must
/// give up on incremental catch-up. The original persists the whole log to
/// disk and replays it; we cap the in-memory backlog instead, which only
/// matters for views left uncommitted for a very long time.
const MAX_BACKLOG: usize = 4096;

struct LogEntry {
    seq: u64,
    touched: BTreeSet<NameKey>,
}

struct Inner {
    next_seq: u64,
    log: VecDeque<LogEntry>,
}

pub struct CommitLog {
    inner: Mutex<Inner>,
}

/// A view's position in the commit log: the sequence number of the last
/// commit it has incorporated (directly, or by starting after it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewCursor {
    seq: u64,
}

impl Default for CommitLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitLog {
    pub fn new() -> Self {
        CommitLog {
            inner: Mutex::new(Inner {
                next_seq: 0,
                log: VecDeque::new(),
            }),
        }
    }

    /// A cursor positioned at the log's current head; a view created with
    /// this cursor has seen every commit so far.
    pub fn cursor(&self) -> ViewCursor {
        ViewCursor {
            seq: self.inner.lock().next_seq,
        }
    }

    /// Attempt to commit a change-set touching `touched` names on behalf of
    /// a view positioned at `cursor`. On success, `cursor` is advanced past
    /// the new entry. On conflict, `cursor` is left unchanged so the caller
    /// can reset its pending change-set and retry from the (now stale)
    /// view state (`spec.md` §4.1).
    pub fn commit(&self, cursor: &mut ViewCursor, touched: BTreeSet<NameKey>) -> Result<()> {
        if touched.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        for entry in inner.log.iter() {
            if entry.seq >= cursor.seq && !entry.touched.is_disjoint(&touched) {
                return Err(Error::Conflict(format!(
                    "{} name(s) touched since cursor {}",
                    entry.touched.intersection(&touched).count(),
                    cursor.seq
                )));
            }
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.log.push_back(LogEntry { seq, touched });
        while inner.log.len() > MAX_BACKLOG {
            inner.log.pop_front();
        }
        cursor.seq = seq + 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn names(strs: &[&str]) -> BTreeSet<NameKey> {
        strs.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn disjoint_commits_both_succeed() {
        let log = CommitLog::new();
        let mut a = log.cursor();
        let mut b = log.cursor();
        assert!(log.commit(&mut a, names(&["www"])).is_ok());
        assert!(log.commit(&mut b, names(&["mail"])).is_ok());
    }

    #[test]
    fn overlapping_commit_conflicts() {
        let log = CommitLog::new();
        let mut a = log.cursor();
        let mut b = log.cursor();
        assert!(log.commit(&mut a, names(&["www"])).is_ok());
        let err = log.commit(&mut b, names(&["www"]));
        assert!(matches!(err, Err(Error::Conflict(_))));
    }

    #[test]
    fn retry_after_conflict_succeeds() {
        let log = CommitLog::new();
        let mut a = log.cursor();
        let mut b = log.cursor();
        log.commit(&mut a, names(&["www"])).unwrap();
        assert!(log.commit(&mut b, names(&["www"])).is_err());
        b = log.cursor();
        assert!(log.commit(&mut b, names(&["www"])).is_ok());
    }
}
