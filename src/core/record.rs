//! C1 — the immutable-per-revision owner-name record.
//!
//! A [`Record`] is addressed by `(name, revision)`. It is never mutated in
//! place once installed in the base index (`spec.md` §3): a change is
//! always materialized as a new `Record` at `revision + 1` via
//! [`Record::underwrite`]/[`Record::overwrite`]/[`Record::update`], and the
//! old and new objects are linked into a change-set by the owning
//! [`crate::core::view::View`].
//!
//! Reference counting (`Arc`) replaces the original's hand-rolled two-phase
//! disposal marker (`spec.md` §9): a record is freed exactly when the last
//! index entry referencing it is dropped.

use std::collections::{BTreeMap, BTreeSet};

use hickory_proto::rr::{DNSClass, Name, RData, RecordType};

/// Revision reserved for ephemeral, never-installed query keys
/// (`spec.md` §3: "revision 0 is reserved for ephemeral query keys").
pub const EPHEMERAL_REVISION: u64 = 0;

/// ZSK or KSK, derived from a key's DNSKEY flags (`spec.md` glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Zsk,
    Ksk,
}

/// The pieces of an RRSIG we need to re-emit it on the wire; kept as plain
/// fields rather than reusing a third-party rdata type so pairing logic
/// (`spec.md` §4.2) can freely inspect and rebuild them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RrsigData {
    pub type_covered: RecordType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer_name: Name,
    pub signature: Vec<u8>,
}

/// A signature over an RRset or denial RR, tagged with the key that
/// produced it (`spec.md` §3: "each signature tagged with `(key_locator,
/// key_flags)`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub rrsig: RrsigData,
    pub key_locator: String,
    pub key_flags: u16,
}

/// All RRs of one type at this owner, plus their signatures
/// (`spec.md` §3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRrset {
    pub ttl: u32,
    pub rdata: Vec<RData>,
    pub rrsigs: Vec<Signature>,
}

impl TypeRrset {
    pub fn is_empty(&self) -> bool {
        self.rdata.is_empty()
    }
}

/// Denial-of-existence payload: either an NSEC next-name plus type bitmap,
/// or an NSEC3 hashed next-owner plus its parameters and type bitmap
/// (`spec.md` §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialData {
    Nsec {
        next_name: Name,
        types: BTreeSet<RecordType>,
    },
    Nsec3 {
        next_hashed_owner: Vec<u8>,
        algorithm: u8,
        opt_out: bool,
        iterations: u16,
        salt: Vec<u8>,
        types: BTreeSet<RecordType>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenialRecord {
    pub data: DenialData,
    pub signatures: Vec<Signature>,
}

/// C1: an immutable-per-revision owner-name record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    name: Name,
    revision: u64,
    dns_class: DNSClass,
    rrsets: BTreeMap<RecordType, TypeRrset>,
    denial: Option<DenialRecord>,
    denial_name: Option<Vec<u8>>,
    valid_from: Option<u32>,
    valid_upto: Option<u32>,
    expiry: Option<i64>,
}

impl Record {
    /// `place(name)` for a name with no prior revision: a fresh record at
    /// revision 1 (`spec.md` §4.1).
    pub fn new(name: Name) -> Self {
        Record {
            name,
            revision: 1,
            dns_class: DNSClass::IN,
            rrsets: BTreeMap::new(),
            denial: None,
            denial_name: None,
            valid_from: None,
            valid_upto: None,
            expiry: None,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn dns_class(&self) -> DNSClass {
        self.dns_class
    }

    pub fn valid_from(&self) -> Option<u32> {
        self.valid_from
    }

    pub fn valid_upto(&self) -> Option<u32> {
        self.valid_upto
    }

    pub fn set_valid_from(&mut self, serial: u32) {
        self.valid_from = Some(serial);
    }

    pub fn set_valid_upto(&mut self, serial: u32) {
        self.valid_upto = Some(serial);
    }

    pub fn is_current(&self) -> bool {
        self.valid_from.is_some() && self.valid_upto.is_none()
    }

    /// True for the "any RR type" revision-0 query probe used only to
    /// search indices by name (`spec.md` §3).
    pub fn is_ephemeral(&self) -> bool {
        self.revision == EPHEMERAL_REVISION
    }

    pub fn expiry(&self) -> Option<i64> {
        self.expiry
    }

    pub fn set_expiry(&mut self, value: i64) {
        self.expiry = Some(value);
    }

    pub fn clear_expiry(&mut self) {
        self.expiry = None;
    }

    pub fn denial_name(&self) -> Option<&[u8]> {
        self.denial_name.as_deref()
    }

    pub fn set_denial_name(&mut self, key: Vec<u8>) {
        self.denial_name = Some(key);
    }

    pub fn denial(&self) -> Option<&DenialRecord> {
        self.denial.as_ref()
    }

    pub fn denial_mut(&mut self) -> &mut Option<DenialRecord> {
        &mut self.denial
    }

    pub fn set_denial(&mut self, denial: DenialRecord) {
        self.denial = Some(denial);
    }

    /// A denial RR is stale whenever it doesn't match the freshly computed
    /// one; this compares the non-signature payload only (`spec.md` §4.3:
    /// "the signing engine treats stale as absent").
    pub fn denial_is_stale(&self, freshly_computed: &DenialData) -> bool {
        match &self.denial {
            None => true,
            Some(d) => &d.data != freshly_computed,
        }
    }

    pub fn has_type(&self, rrtype: RecordType) -> bool {
        self.rrsets.get(&rrtype).map(|r| !r.is_empty()).unwrap_or(false)
    }

    pub fn rrset(&self, rrtype: RecordType) -> Option<&TypeRrset> {
        self.rrsets.get(&rrtype)
    }

    pub fn rrset_mut(&mut self, rrtype: RecordType) -> &mut TypeRrset {
        self.rrsets.entry(rrtype).or_default()
    }

    pub fn remove_type(&mut self, rrtype: RecordType) {
        self.rrsets.remove(&rrtype);
    }

    /// Remove every RRset, used by delegation/name replacement in the
    /// control API (`spec.md` §6).
    pub fn clear_all_types(&mut self) {
        self.rrsets.clear();
    }

    pub fn types(&self) -> impl Iterator<Item = RecordType> + '_ {
        self.rrsets
            .iter()
            .filter(|(_, r)| !r.is_empty())
            .map(|(t, _)| *t)
    }

    pub fn has_any_data(&self) -> bool {
        self.rrsets.values().any(|r| !r.is_empty())
    }

    /// Add one RR's rdata to the type's RRset, clearing stale signatures
    /// (the owning view must call `amend`/`update` first so this is only
    /// observed by views that have not yet seen the record).
    pub fn insert_rdata(&mut self, rrtype: RecordType, ttl: u32, rdata: RData) {
        let set = self.rrsets.entry(rrtype).or_default();
        set.ttl = ttl;
        if !set.rdata.contains(&rdata) {
            set.rdata.push(rdata);
            set.rrsigs.clear();
        }
    }

    /// `underwrite`: new revision with the previous data, validity dropped.
    pub fn underwrite(&self) -> Record {
        Record {
            name: self.name.clone(),
            revision: self.revision + 1,
            dns_class: self.dns_class,
            rrsets: self.rrsets.clone(),
            denial: self.denial.clone(),
            denial_name: self.denial_name.clone(),
            valid_from: None,
            valid_upto: None,
            expiry: self.expiry,
        }
    }

    /// `overwrite`: new revision keeping only identity (name); all
    /// type-bearing data and validity are dropped.
    pub fn overwrite(&self) -> Record {
        Record {
            name: self.name.clone(),
            revision: self.revision + 1,
            dns_class: self.dns_class,
            rrsets: BTreeMap::new(),
            denial: None,
            denial_name: None,
            valid_from: None,
            valid_upto: None,
            expiry: None,
        }
    }

    /// `update`: new revision carrying everything forward unchanged.
    pub fn update(&self) -> Record {
        Record {
            name: self.name.clone(),
            revision: self.revision + 1,
            dns_class: self.dns_class,
            rrsets: self.rrsets.clone(),
            denial: self.denial.clone(),
            denial_name: self.denial_name.clone(),
            valid_from: self.valid_from,
            valid_upto: self.valid_upto,
            expiry: self.expiry,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    #[test]
    fn underwrite_keeps_data_drops_validity() {
        let mut r = Record::new(name("www.example."));
        r.insert_rdata(RecordType::A, 300, RData::A("127.0.0.1".parse().unwrap()));
        r.set_valid_from(5);
        let next = r.underwrite();
        assert_eq!(next.revision(), 2);
        assert!(next.has_type(RecordType::A));
        assert_eq!(next.valid_from(), None);
    }

    #[test]
    fn overwrite_drops_data_and_validity() {
        let mut r = Record::new(name("www.example."));
        r.insert_rdata(RecordType::A, 300, RData::A("127.0.0.1".parse().unwrap()));
        r.set_valid_from(5);
        let next = r.overwrite();
        assert_eq!(next.revision(), 2);
        assert!(!next.has_type(RecordType::A));
        assert_eq!(next.valid_from(), None);
    }

    #[test]
    fn update_carries_everything_forward() {
        let mut r = Record::new(name("www.example."));
        r.insert_rdata(RecordType::A, 300, RData::A("127.0.0.1".parse().unwrap()));
        r.set_valid_from(5);
        r.set_expiry(1000);
        let next = r.update();
        assert_eq!(next.revision(), 2);
        assert!(next.has_type(RecordType::A));
        assert_eq!(next.valid_from(), Some(5));
        assert_eq!(next.expiry(), Some(1000));
    }
}
