//! C8 — the pipeline driver (`spec.md` §4.4).
//!
//! Cycles records through four views — input, prepare, sign, output —
//! each cycle: assign the next serial and open/close validity windows in
//! prepare, pair/produce signatures and denial RRs in sign, commit output,
//! and periodically purge records past the retention horizon. Grounded in
//! the original's `zonesign.c` (`prepare()`/`sign()`).
//!
//! Each view is locked independently (`parking_lot::Mutex<View>`) rather
//! than the whole pipeline behind one lock, so a control-API commit into
//! `input` and this zone's own prepare/sign/output cycle can genuinely run
//! at the same time — the commit log's conflict detection is what
//! serializes an overlapping name, not a mutex held across the whole
//! operation (`spec.md` §5).

pub mod serial;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hickory_proto::rr::rdata::SOA;
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use parking_lot::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::config::ZoneConfig;
use crate::core::record::Record;
use crate::core::store::RecordStore;
use crate::core::view::{commit_with_retry, View, ViewKind};
use crate::crypto::CryptoModule;
use crate::denial;
use crate::error::Result;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The four-view pipeline for one zone.
pub struct Pipeline {
    store: Arc<RecordStore>,
    apex: Name,
    dns_class: DNSClass,
    config: ZoneConfig,
    input: Mutex<View>,
    prepare: Mutex<View>,
    sign: Mutex<View>,
    output: Mutex<View>,
}

impl Pipeline {
    pub fn new(apex: Name, config: ZoneConfig) -> Self {
        let store = Arc::new(RecordStore::new());
        Pipeline {
            input: Mutex::new(View::new(store.clone(), ViewKind::Input)),
            prepare: Mutex::new(View::new(store.clone(), ViewKind::Prepare)),
            sign: Mutex::new(View::new(store.clone(), ViewKind::Sign)),
            output: Mutex::new(View::new(store.clone(), ViewKind::Output)),
            store,
            apex,
            dns_class: DNSClass::IN,
            config,
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn apex(&self) -> &Name {
        &self.apex
    }

    /// Lock this zone's input view — the only one external callers (the
    /// control API) ever stage changes into. Locked independently of
    /// prepare/sign/output so a control request can commit while this
    /// zone's own signing cycle is mid-flight; a name touched by both is
    /// resolved by the commit log, not by serializing the whole pipeline.
    pub fn input_view(&self) -> MutexGuard<'_, View> {
        self.input.lock()
    }

    fn current_soa_serial(&self) -> u32 {
        self.store
            .current(&self.apex)
            .and_then(|r| r.rrset(RecordType::SOA).cloned())
            .and_then(|rr| rr.rdata.into_iter().next())
            .and_then(|rdata| match rdata {
                RData::SOA(soa) => Some(soa.serial()),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// `spec.md` §4.4 step 1: commit pending input changes, assign the
    /// next serial, and open a new validity window (in `prepare`) for
    /// every name the input view just touched plus the zone apex itself.
    pub fn advance_prepare(&self) -> Result<u32> {
        let now = now_unix();

        // `input` is the one exclusively-locked view every writer (the
        // control API, this call) shares, so its own cursor can never be
        // stale relative to itself: committing its own pending set here
        // cannot conflict.
        let mut input = self.input.lock();
        let touched: Vec<Name> = input.pending().iter().map(|r| r.name().clone()).collect();
        input.commit()?;
        drop(input);

        let previous_serial = self.current_soa_serial();
        let new_serial = serial::next_serial(self.config.serial_policy, previous_serial, now);
        let apex = self.apex.clone();

        // `prepare` only the pipeline itself writes to, but a name it
        // opens a window for here may also have just been touched by a
        // concurrent `input` commit (a second control-API request racing
        // this cycle) — `commit_with_retry` resets and rebuilds against
        // the fresh state rather than letting that `Conflict` escape.
        let mut prepare = self.prepare.lock();
        commit_with_retry(&mut prepare, |view| {
            view.reset();
            for name in touched.iter().filter(|n| **n != apex) {
                Self::open_validity_window(view, &self.store, name, new_serial);
            }
            Self::open_soa(view, &self.store, &apex, &self.config, new_serial);
            Ok(())
        })?;
        info!(serial = new_serial, zone = %self.apex, "prepare advanced");
        Ok(new_serial)
    }

    /// Close the name's current revision as of `new_serial` and open a
    /// fresh one carrying its latest data, also valid as of `new_serial`
    /// (`spec.md` §4.4 step 1: "set `valid_upto` on the previous current
    /// ... and `valid_from` on the new revision").
    fn open_validity_window(view: &mut View, store: &RecordStore, name: &Name, new_serial: u32) {
        if view.take(name).is_some() {
            view.remove(name, new_serial);
        }
        if let Some(latest) = view.latest(name).or_else(|| store.latest(name)) {
            let mut next = latest.update();
            next.set_valid_from(new_serial);
            view.stage_computed(next);
        }
    }

    fn open_soa(view: &mut View, store: &RecordStore, apex: &Name, config: &ZoneConfig, new_serial: u32) {
        Self::open_validity_window(view, store, apex, new_serial);
        let mut record = view
            .latest(apex)
            .map(|r| (*r).clone())
            .unwrap_or_else(|| Record::new(apex.clone()));
        let soa = SOA::new(
            apex.clone(),
            apex.clone(),
            new_serial,
            3600,
            900,
            1_209_600,
            config.resign_interval.as_secs().max(1) as u32,
        );
        record.insert_rdata(RecordType::SOA, 3600, RData::SOA(soa));
        record.set_valid_from(new_serial);
        view.stage_computed(record);
    }

    /// `spec.md` §4.4 step 2: for each record due for (re)signing, pair
    /// signatures and refresh its denial RR. "Due" is the union of records
    /// already signed but becoming stale (`expiring_before`) and records
    /// that have never completed a signing pass at all (`never_signed`) —
    /// the `expiry` index only ever admits the former, so a record fresh
    /// out of `advance_prepare` would otherwise never get its first RRSIG.
    pub fn advance_sign(&self, crypto: &dyn CryptoModule, refresh_before: i64) -> Result<usize> {
        let mut signed = 0;
        let mut sign = self.sign.lock();
        commit_with_retry(&mut sign, |view| {
            view.reset();
            signed = 0;
            let mut due = self.store.expiring_before(refresh_before);
            due.extend(self.store.never_signed());
            for record in &due {
                match self.sign_one(view, crypto, record) {
                    Ok(()) => signed += 1,
                    Err(e) if e.is_retryable() => {
                        warn!(name = %record.name(), error = %e, "sign deferred, will retry next cycle");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })?;
        Ok(signed)
    }

    fn sign_one(&self, view: &mut View, crypto: &dyn CryptoModule, record: &Record) -> Result<()> {
        let classification = denial::classify(&self.store, &self.apex, record.name());
        let refresh_secs = self.config.signing.sig_refresh_interval.as_secs() as u32;
        let now = now_unix();

        let mut next = record.update();
        let mut min_expiry = i64::MAX;
        for rrtype in record.types().collect::<Vec<_>>() {
            let rrset = record.rrset(rrtype).cloned().unwrap_or_default();
            let outcome = crate::signing::sign_rrset(
                crypto,
                &self.config.signing,
                &self.apex,
                record.name(),
                self.dns_class,
                rrtype,
                &rrset,
                classification.is_delegation_glue_or_occluded(),
                now,
                refresh_secs,
            )?;
            if let Some(e) = outcome.min_expiration {
                min_expiry = min_expiry.min(e);
            }
            next.rrset_mut(rrtype).rrsigs = outcome.rrsigs;
        }

        if let Some(successor) = self.store.denial_successor(record) {
            let fresh = denial::compute_denial(
                &next,
                classification,
                &self.config.signing.denial,
                successor.name(),
            );
            if denial::needs_refresh(&next, &fresh) {
                next.set_denial(denial::wrap(fresh));
                next.set_denial_name(denial::denial_name(
                    &self.config.signing.denial,
                    record.name(),
                ));
            }
        }
        if min_expiry < i64::MAX {
            next.set_expiry(min_expiry);
        }

        view.stage_computed(next);
        Ok(())
    }

    /// `spec.md` §4.4 step 3: publish the signed state to the output view.
    /// Nothing is ever staged into `output` directly, so this is a
    /// pass-through commit of an always-empty change-set; kept as its own
    /// step (rather than folded into `advance_sign`) to mirror the
    /// original's separate `output()` phase.
    pub fn advance_output(&self) -> Result<()> {
        let mut output = self.output.lock();
        output.commit()
    }

    /// `spec.md` §4.4 step 4: records old enough to be purged. Actual
    /// removal is the daemon's job (it stages `output.remove` for each and
    /// commits, then triggers a journal rewrite).
    pub fn purge_candidates(&self, current_serial: u32) -> Vec<Arc<Record>> {
        let horizon = self.config.retention_horizon.as_secs() as u32;
        let cutoff = current_serial.saturating_sub(horizon);
        self.store
            .retired_since(0)
            .into_iter()
            .filter(|r| r.valid_upto().map(|v| v < cutoff).unwrap_or(false))
            .collect()
    }
}
