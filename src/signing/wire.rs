//! Canonical wire encoding for RRSIG-to-be-signed assembly
//! (RFC 4034 §3.1.8.1, §6.2/§6.3).

use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};

/// RFC 4034 §6.2: owner names are written lower-cased and uncompressed.
pub fn encode_name_canonical(name: &Name, buf: &mut Vec<u8>) {
    for label in name.iter() {
        let lower = label.to_ascii_lowercase();
        buf.push(lower.len() as u8);
        buf.extend_from_slice(&lower);
    }
    buf.push(0);
}

fn encode_rdata(rdata: &RData, buf: &mut Vec<u8>) {
    let mut encoder = BinEncoder::new(buf);
    let _ = rdata.emit(&mut encoder);
}

/// One RR in canonical wire form: owner, type, class, original TTL,
/// rdlength, rdata — the unit that RRSIG-to-be-signed data is built from.
pub fn canonical_rr_bytes(
    name: &Name,
    rr_type: RecordType,
    dns_class: DNSClass,
    original_ttl: u32,
    rdata: &RData,
) -> Vec<u8> {
    let mut name_buf = Vec::new();
    encode_name_canonical(name, &mut name_buf);
    let mut rdata_buf = Vec::new();
    encode_rdata(rdata, &mut rdata_buf);

    let mut out = Vec::with_capacity(name_buf.len() + 10 + rdata_buf.len());
    out.extend_from_slice(&name_buf);
    out.extend_from_slice(&u16::from(rr_type).to_be_bytes());
    out.extend_from_slice(&u16::from(dns_class).to_be_bytes());
    out.extend_from_slice(&original_ttl.to_be_bytes());
    out.extend_from_slice(&(rdata_buf.len() as u16).to_be_bytes());
    out.extend_from_slice(&rdata_buf);
    out
}

/// Assemble the RRSIG-to-be-signed octet stream: RRSIG rdata minus the
/// signature, followed by every RR in the covered set, each individually
/// canonicalized and the whole set sorted into canonical RDATA order
/// (RFC 4034 §6.3).
#[allow(clippy::too_many_arguments)]
pub fn rrsig_signed_data(
    type_covered: RecordType,
    algorithm: u8,
    labels: u8,
    original_ttl: u32,
    expiration: u32,
    inception: u32,
    key_tag: u16,
    signer_name: &Name,
    owner: &Name,
    dns_class: DNSClass,
    rdata_set: &[RData],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&u16::from(type_covered).to_be_bytes());
    out.push(algorithm);
    out.push(labels);
    out.extend_from_slice(&original_ttl.to_be_bytes());
    out.extend_from_slice(&expiration.to_be_bytes());
    out.extend_from_slice(&inception.to_be_bytes());
    out.extend_from_slice(&key_tag.to_be_bytes());
    encode_name_canonical(signer_name, &mut out);

    let mut rrs: Vec<Vec<u8>> = rdata_set
        .iter()
        .map(|rdata| canonical_rr_bytes(owner, type_covered, dns_class, original_ttl, rdata))
        .collect();
    rrs.sort();
    for rr in rrs {
        out.extend_from_slice(&rr);
    }
    out
}

/// Encode a [`crate::core::record::Signature`] as RRSIG rdata bytes
/// (the inverse of the literal-DNSKEY-RRSIG decoder in `signing::mod`),
/// for handing to the wire layer, which has no dependency on
/// `core::record`'s own `RrsigData` shape.
pub fn rrsig_rdata_bytes(sig: &crate::core::record::Signature) -> Vec<u8> {
    let r = &sig.rrsig;
    let mut buf = Vec::with_capacity(18 + r.signature.len());
    buf.extend_from_slice(&u16::from(r.type_covered).to_be_bytes());
    buf.push(r.algorithm);
    buf.push(r.labels);
    buf.extend_from_slice(&r.original_ttl.to_be_bytes());
    buf.extend_from_slice(&r.expiration.to_be_bytes());
    buf.extend_from_slice(&r.inception.to_be_bytes());
    buf.extend_from_slice(&r.key_tag.to_be_bytes());
    encode_name_canonical(&r.signer_name, &mut buf);
    buf.extend_from_slice(&r.signature);
    buf
}

/// Number of non-wildcard labels in `name`, the RRSIG `labels` field
/// (RFC 4034 §3.1.3).
pub fn signed_labels(name: &Name) -> u8 {
    let count = name.num_labels();
    if name.iter().next().map(|l| l == b"*").unwrap_or(false) {
        count.saturating_sub(1)
    } else {
        count
    }
}
