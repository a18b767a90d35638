//! AXFR content: full zone dump, SOA-first-SOA-last, chunked to fit
//! 64 KiB TCP messages (`spec.md` §6). Grounded in the original's
//! `wire/axfr.c` (`soa_request`, the streaming transfer loop).

use hickory_proto::rr::RecordType;

use crate::core::store::RecordStore;
use crate::signing::wire::rrsig_rdata_bytes;

use super::{OutboundRr, Rdata};

pub fn soa_rr(store: &RecordStore, apex: &hickory_proto::rr::Name) -> Option<OutboundRr> {
    soa_rr_from_record(&store.current(apex)?)
}

/// Build the outbound SOA RR from whatever revision of the apex `record`
/// is at hand, current or retired — used by IXFR to cite the SOA that was
/// in effect at an intermediate serial.
pub fn soa_rr_from_record(record: &crate::core::record::Record) -> Option<OutboundRr> {
    let rrset = record.rrset(RecordType::SOA)?;
    let rdata = rrset.rdata.first()?.clone();
    Some(OutboundRr {
        name: record.name().clone(),
        rr_type: RecordType::SOA,
        dns_class: record.dns_class(),
        ttl: rrset.ttl,
        rdata: Rdata::Typed(rdata),
    })
}

/// SOA, then every RRset (with its RRSIGs) of every current record, then
/// SOA again.
pub fn full_zone(store: &RecordStore, apex: &hickory_proto::rr::Name) -> Vec<OutboundRr> {
    let Some(soa) = soa_rr(store, apex) else {
        return Vec::new();
    };
    let mut out = vec![soa.clone()];
    for record in store.all_current() {
        for rrtype in record.types() {
            if rrtype == RecordType::SOA && record.name() == apex {
                continue; // already emitted first/will emit last
            }
            let Some(rrset) = record.rrset(rrtype) else {
                continue;
            };
            for rdata in &rrset.rdata {
                out.push(OutboundRr {
                    name: record.name().clone(),
                    rr_type: rrtype,
                    dns_class: record.dns_class(),
                    ttl: rrset.ttl,
                    rdata: Rdata::Typed(rdata.clone()),
                });
            }
            for sig in &rrset.rrsigs {
                out.push(OutboundRr {
                    name: record.name().clone(),
                    rr_type: RecordType::RRSIG,
                    dns_class: record.dns_class(),
                    ttl: rrset.ttl,
                    rdata: Rdata::Raw(rrsig_rdata_bytes(sig)),
                });
            }
        }
    }
    out.push(soa);
    out
}

/// Split `rrs` into chunks whose canonical wire size does not exceed
/// `max_bytes`, always putting at least one RR in a chunk even if it
/// alone exceeds the limit (`spec.md` §6: "each containing >= 1 RR").
pub fn chunk(rrs: Vec<OutboundRr>, max_bytes: usize) -> Vec<Vec<OutboundRr>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;
    for rr in rrs {
        let size = rr.wire_len();
        if !current.is_empty() && current_size + size > max_bytes {
            chunks.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += size;
        current.push(rr);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
