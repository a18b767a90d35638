//! The DNS wire interface toward the core (`spec.md` §6).
//!
//! The listener hands the core a parsed `(opcode, qname, qtype, qclass,
//! peer, tsig_info)` tuple; this module answers SOA queries, full zone
//! transfers, incremental transfers, and classifies NOTIFY/UPDATE.
//! Grounded in the original's `wire/query.c`/`wire/axfr.c`, split here
//! into `axfr`/`ixfr` content builders and a `listener` that owns the
//! sockets.

pub mod axfr;
pub mod ixfr;
pub mod listener;

use std::net::SocketAddr;

use hickory_proto::op::OpCode;
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};

use crate::core::store::RecordStore;
use crate::signing::wire::encode_name_canonical;

/// TSIG verification outcome for one request, as reported by the listener
/// (`spec.md` §6: "tsig_info").
#[derive(Debug, Clone, Default)]
pub struct TsigInfo {
    pub key_name: Option<String>,
    pub verified: bool,
}

/// One parsed inbound request, already decoded off the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub opcode: OpCode,
    pub qname: Name,
    pub qtype: RecordType,
    pub qclass: DNSClass,
    pub peer: SocketAddr,
    pub tsig: TsigInfo,
    /// IXFR's `serial_known` parameter, when present in the request.
    pub ixfr_serial_known: Option<u32>,
}

/// RDATA as handed to the wire layer: either a typed `hickory_proto` value
/// (emitted through its own `BinEncodable` impl) or already-assembled raw
/// bytes (RRSIG, whose rdata is built by hand in `signing::wire` rather
/// than represented as a `hickory_proto` DNSSEC type, since the core keeps
/// its own [`crate::core::record::Signature`]).
#[derive(Debug, Clone)]
pub enum Rdata {
    Typed(RData),
    Raw(Vec<u8>),
}

/// One RR as handed to the wire layer for encoding; deliberately not
/// `hickory_proto::rr::Record` so the core and the signing/denial engines
/// never depend on the wire encoder.
#[derive(Debug, Clone)]
pub struct OutboundRr {
    pub name: Name,
    pub rr_type: RecordType,
    pub dns_class: DNSClass,
    pub ttl: u32,
    pub rdata: Rdata,
}

impl OutboundRr {
    /// Canonical wire size: owner + type + class + ttl + rdlength + rdata.
    pub fn wire_len(&self) -> usize {
        let mut name_buf = Vec::new();
        encode_name_canonical(&self.name, &mut name_buf);
        let rdata_len = match &self.rdata {
            Rdata::Typed(rdata) => {
                crate::signing::wire::canonical_rr_bytes(
                    &self.name,
                    self.rr_type,
                    self.dns_class,
                    self.ttl,
                    rdata,
                )
                .len()
                    - name_buf.len()
                    - 10
            }
            Rdata::Raw(bytes) => bytes.len(),
        };
        name_buf.len() + 10 + rdata_len
    }

    /// Append this RR's wire form (owner, type, class, ttl, rdlength,
    /// rdata) to `buf` — used by the listener's hand-rolled message
    /// encoder, which never represents an RRSIG as a typed `RData` (see
    /// [`Rdata`]).
    pub fn encode(&self, buf: &mut Vec<u8>) {
        encode_name_canonical(&self.name, buf);
        buf.extend_from_slice(&u16::from(self.rr_type).to_be_bytes());
        buf.extend_from_slice(&u16::from(self.dns_class).to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());
        match &self.rdata {
            Rdata::Typed(rdata) => {
                use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
                let mut rdata_buf = Vec::new();
                let mut encoder = BinEncoder::new(&mut rdata_buf);
                let _ = rdata.emit(&mut encoder);
                buf.extend_from_slice(&(rdata_buf.len() as u16).to_be_bytes());
                buf.extend_from_slice(&rdata_buf);
            }
            Rdata::Raw(bytes) => {
                buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                buf.extend_from_slice(bytes);
            }
        }
    }
}

/// The result of handling one request.
pub enum WireOutcome {
    /// RRs to send, chunked into messages of at most 65,535 octets'
    /// worth of content (`spec.md` §6).
    Rrs(Vec<Vec<OutboundRr>>),
    /// NOTIFY: forwarded to the inbound-transfer subsystem, not answered
    /// here.
    Notify,
    Refused,
    NotImplemented,
    ServFail,
}

/// Dispatch one request against `store` (`spec.md` §6).
pub fn handle(request: &WireRequest, store: &RecordStore, apex: &Name) -> WireOutcome {
    match request.opcode {
        OpCode::Query if request.qtype == RecordType::SOA => {
            match axfr::soa_rr(store, apex) {
                Some(rr) => WireOutcome::Rrs(vec![vec![rr]]),
                None => WireOutcome::ServFail,
            }
        }
        OpCode::Query if request.qtype == RecordType::AXFR => {
            let rrs = axfr::full_zone(store, apex);
            if rrs.is_empty() {
                return WireOutcome::ServFail;
            }
            WireOutcome::Rrs(axfr::chunk(rrs, 65_535))
        }
        OpCode::Query if request.qtype == RecordType::IXFR => {
            match request.ixfr_serial_known {
                Some(since) => match ixfr::changes(store, apex, since) {
                    Some(chunks) => WireOutcome::Rrs(chunks),
                    None => {
                        // Journal does not reach `since`: fall back to AXFR.
                        WireOutcome::Rrs(axfr::chunk(axfr::full_zone(store, apex), 65_535))
                    }
                },
                None => WireOutcome::Refused,
            }
        }
        OpCode::Notify => WireOutcome::Notify,
        OpCode::Update => WireOutcome::NotImplemented,
        _ => WireOutcome::Refused,
    }
}
