//! C7 — the denial-of-existence engine (`spec.md` §4.3).
//!
//! Computes each record's denial name and type bitmap, and keeps the
//! `denialname`-ordered chain closed: inserting, removing, or changing a
//! record's type bitmap touches at most that record and its predecessor in
//! denial order. Grounded in the original's `names_iteratordenialchainupdates`
//! (`views.c`) and the NSEC3 hashing described in `spec.md` §4.3.

use std::collections::BTreeSet;

use hickory_proto::rr::{Name, RecordType};
use sha1::{Digest, Sha1};

use crate::config::DenialMethod;
use crate::core::record::{DenialData, DenialRecord, Record};
use crate::core::store::RecordStore;
use crate::signing::wire::encode_name_canonical;

/// Delegation/occlusion facts about a name, needed to decide which RR
/// types are authoritative at it (`spec.md` §4.3 "Type bitmap"). Grounded
/// in `signeroperation.c`'s `domain_is_delegpt`/`domain_is_occluded`,
/// which walk ancestors looking for NS (delegation) and DNAME
/// (occlusion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    /// An ancestor (strict) of this name delegates away from the zone.
    pub below_delegation: bool,
    /// An ancestor (strict) of this name is DNAME-occluded.
    pub occluded: bool,
    /// This name itself is a delegation point (carries NS but is not the
    /// apex).
    pub is_delegation_point: bool,
}

impl Classification {
    /// "Delegation, glue, or occluded" per `spec.md` §4.2/§4.3: everything
    /// below a delegation or occlusion point, or the delegation point
    /// itself.
    pub fn is_delegation_glue_or_occluded(&self) -> bool {
        self.below_delegation || self.occluded || self.is_delegation_point
    }
}

/// Walk from `name` up to (excluding) `apex`, classifying it per
/// `signeroperation.c`'s ancestor walk.
pub fn classify(store: &RecordStore, apex: &Name, name: &Name) -> Classification {
    if name == apex {
        return Classification::default();
    }
    let is_delegation_point = store
        .current(name)
        .map(|r| r.has_type(RecordType::NS))
        .unwrap_or(false);

    let mut below_delegation = false;
    let mut occluded = false;
    let mut cursor = name.base_name();
    while cursor.num_labels() >= apex.num_labels() && &cursor != apex {
        if let Some(rec) = store.current(&cursor) {
            if rec.has_type(RecordType::NS) {
                below_delegation = true;
            }
            if rec.has_type(RecordType::DNAME) {
                occluded = true;
            }
        }
        if cursor.num_labels() == 0 {
            break;
        }
        cursor = cursor.base_name();
    }
    Classification {
        below_delegation,
        occluded,
        is_delegation_point,
    }
}

/// The owner's denial name: itself for NSEC, the base32 NSEC3 hash for
/// NSEC3 (`spec.md` §4.3 "Per record").
pub fn denial_name(method: &DenialMethod, owner: &Name) -> Vec<u8> {
    match method {
        DenialMethod::Nsec => {
            let mut buf = Vec::new();
            encode_name_canonical(owner, &mut buf);
            buf
        }
        DenialMethod::Nsec3 { salt, iterations, .. } => nsec3_hash(owner, salt, *iterations),
    }
}

/// RFC 5155 §5 iterated hash.
pub fn nsec3_hash(owner: &Name, salt: &[u8], iterations: u16) -> Vec<u8> {
    let mut wire = Vec::new();
    encode_name_canonical(owner, &mut wire);

    let mut digest = {
        let mut hasher = Sha1::new();
        hasher.update(&wire);
        hasher.update(salt);
        hasher.finalize().to_vec()
    };
    for _ in 0..iterations {
        let mut hasher = Sha1::new();
        hasher.update(&digest);
        hasher.update(salt);
        digest = hasher.finalize().to_vec();
    }
    digest
}

/// Base32 (extended-hex alphabet, RFC 5155 §1) text form of an NSEC3 hash,
/// for building the NSEC3 owner name on the wire.
pub fn nsec3_label(hash: &[u8]) -> String {
    data_encoding::BASE32HEX_NOPAD.encode(hash).to_ascii_lowercase()
}

/// The type bitmap for `record`'s denial RR (`spec.md` §4.3 "Type
/// bitmap"): authoritative types (filtered by delegation/occlusion), plus
/// RRSIG, plus the NSEC bit itself for the NSEC method.
pub fn type_bitmap(
    record: &Record,
    classification: Classification,
    method: &DenialMethod,
) -> BTreeSet<RecordType> {
    let mut bits = BTreeSet::new();
    if !classification.occluded {
        for t in record.types() {
            if classification.below_delegation && t != RecordType::NS && t != RecordType::DS {
                continue;
            }
            bits.insert(t);
        }
    }
    bits.insert(RecordType::RRSIG);
    if matches!(method, DenialMethod::Nsec) {
        bits.insert(RecordType::NSEC);
    }
    bits
}

/// Build the fresh [`DenialData`] for `record` given its successor's
/// denial name in chain order.
pub fn compute_denial(
    record: &Record,
    classification: Classification,
    method: &DenialMethod,
    next_denial_name_owner: &Name,
) -> DenialData {
    let types = type_bitmap(record, classification, method);
    match method {
        DenialMethod::Nsec => DenialData::Nsec {
            next_name: next_denial_name_owner.clone(),
            types,
        },
        DenialMethod::Nsec3 {
            algorithm,
            salt,
            iterations,
            opt_out,
        } => DenialData::Nsec3 {
            next_hashed_owner: denial_name(method, next_denial_name_owner),
            algorithm: *algorithm,
            opt_out: *opt_out,
            iterations: *iterations,
            salt: salt.clone(),
            types,
        },
    }
}

/// Whether `record`'s stored denial RR still matches the chain-closure
/// invariant given the caller-supplied fresh computation for it
/// (`spec.md` §4.3 "State": "the signing engine treats stale as absent").
pub fn needs_refresh(record: &Record, fresh: &DenialData) -> bool {
    record.denial_is_stale(fresh)
}

/// Wrap a [`DenialData`] (with no signatures yet) into a [`DenialRecord`];
/// the signing engine fills in `signatures` afterwards.
pub fn wrap(data: DenialData) -> DenialRecord {
    DenialRecord {
        data,
        signatures: Vec::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn nsec_denial_name_is_canonical_owner() {
        let name = Name::from_str("WWW.example.").unwrap();
        let lower = Name::from_str("www.example.").unwrap();
        assert_eq!(denial_name(&DenialMethod::Nsec, &name), denial_name(&DenialMethod::Nsec, &lower));
    }

    #[test]
    fn nsec3_hash_is_deterministic() {
        let name = Name::from_str("www.example.").unwrap();
        let salt = vec![0xAA, 0xBB];
        let h1 = nsec3_hash(&name, &salt, 1);
        let h2 = nsec3_hash(&name, &salt, 1);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 20);
    }

    #[test]
    fn bitmap_excludes_non_ns_ds_below_delegation() {
        let mut rec = Record::new(Name::from_str("child.example.").unwrap());
        rec.insert_rdata(
            RecordType::A,
            300,
            hickory_proto::rr::RData::A("127.0.0.1".parse().unwrap()),
        );
        rec.insert_rdata(RecordType::NS, 300, hickory_proto::rr::RData::NS(Name::from_str("ns1.example.").unwrap()));
        let classification = Classification {
            below_delegation: true,
            occluded: false,
            is_delegation_point: false,
        };
        let bits = type_bitmap(&rec, classification, &DenialMethod::Nsec);
        assert!(bits.contains(&RecordType::NS));
        assert!(!bits.contains(&RecordType::A));
    }
}
