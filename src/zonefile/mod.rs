//! Zone file reader/writer (`spec.md` §4.4, round-trip property in §8).
//!
//! A pragmatic RFC 1035 master-file reader/writer: `$ORIGIN`/`$TTL`
//! directives, one RR per line, owner-name elision (blank owner repeats
//! the previous one). Grounded in the original's `zoneinput.c`
//! (`readzone`), reworked as a straight-line parser rather than a
//! callback-driven one.

use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use hickory_proto::rr::rdata::SOA;
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};

use crate::core::view::View;
use crate::error::{Error, Result};

/// Parse `text` as a zone file relative to `origin`, staging every record
/// into `view` (the caller commits).
pub fn read_zone(view: &mut View, origin: &Name, text: &str) -> Result<usize> {
    let mut current_origin = origin.clone();
    let mut last_name: Option<Name> = None;
    let mut default_ttl: u32 = 3600;
    let mut count = 0;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("$ORIGIN") {
            current_origin = Name::from_str(rest.trim())
                .map_err(|e| Error::Malformed(format!("line {}: bad $ORIGIN: {e}", lineno + 1)))?;
            continue;
        }
        if let Some(rest) = line.strip_prefix("$TTL") {
            default_ttl = rest
                .trim()
                .parse()
                .map_err(|_| Error::Malformed(format!("line {}: bad $TTL", lineno + 1)))?;
            continue;
        }

        let mut fields = line.split_whitespace().peekable();
        let first = fields.peek().copied().unwrap_or("");
        let owner = if raw_line.starts_with(char::is_whitespace) || first.is_empty() {
            last_name
                .clone()
                .ok_or_else(|| Error::Malformed(format!("line {}: no owner to elide", lineno + 1)))?
        } else {
            let tok = fields.next().unwrap();
            parse_name(tok, &current_origin)?
        };
        last_name = Some(owner.clone());

        let mut ttl = default_ttl;
        let mut token = fields
            .next()
            .ok_or_else(|| Error::Malformed(format!("line {}: missing fields", lineno + 1)))?;
        if let Ok(parsed_ttl) = token.parse::<u32>() {
            ttl = parsed_ttl;
            token = fields
                .next()
                .ok_or_else(|| Error::Malformed(format!("line {}: missing type", lineno + 1)))?;
        }
        if token.eq_ignore_ascii_case("IN") {
            token = fields
                .next()
                .ok_or_else(|| Error::Malformed(format!("line {}: missing type", lineno + 1)))?;
        }
        let rr_type = RecordType::from_str(token)
            .map_err(|_| Error::Malformed(format!("line {}: unknown type {token}", lineno + 1)))?;
        let rest: Vec<&str> = fields.collect();
        let rdata = parse_rdata(rr_type, &rest, &current_origin)
            .map_err(|e| Error::Malformed(format!("line {}: {e}", lineno + 1)))?;

        let next = view
            .latest(&owner)
            .map(|r| (*r).clone())
            .unwrap_or_else(|| crate::core::record::Record::new(owner.clone()));
        let mut next = next;
        next.insert_rdata(rr_type, ttl, rdata);
        view.stage_computed(next);
        count += 1;
    }
    Ok(count)
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

pub(crate) fn parse_name(tok: &str, origin: &Name) -> Result<Name> {
    if tok == "@" {
        return Ok(origin.clone());
    }
    if tok.ends_with('.') {
        Name::from_str(tok).map_err(|e| Error::Malformed(format!("bad name {tok}: {e}")))
    } else {
        Name::from_str(&format!("{tok}.{origin}"))
            .map_err(|e| Error::Malformed(format!("bad name {tok}: {e}")))
    }
}

pub(crate) fn parse_rdata(rr_type: RecordType, fields: &[&str], origin: &Name) -> Result<RData> {
    let bad = || Error::Malformed(format!("bad {rr_type} rdata"));
    match rr_type {
        RecordType::A => {
            let addr: Ipv4Addr = fields.first().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            Ok(RData::A(addr.into()))
        }
        RecordType::AAAA => {
            let addr: Ipv6Addr = fields.first().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            Ok(RData::AAAA(addr.into()))
        }
        RecordType::NS => Ok(RData::NS(parse_name(fields.first().ok_or_else(bad)?, origin)?)),
        RecordType::CNAME => Ok(RData::CNAME(parse_name(fields.first().ok_or_else(bad)?, origin)?)),
        RecordType::PTR => Ok(RData::PTR(parse_name(fields.first().ok_or_else(bad)?, origin)?)),
        RecordType::TXT => {
            let joined = fields.join(" ");
            let unquoted = joined.trim_matches('"').to_string();
            Ok(RData::TXT(hickory_proto::rr::rdata::TXT::new(vec![unquoted])))
        }
        RecordType::MX => {
            let preference: u16 = fields.first().ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let exchange = parse_name(fields.get(1).ok_or_else(bad)?, origin)?;
            Ok(RData::MX(hickory_proto::rr::rdata::MX::new(preference, exchange)))
        }
        RecordType::SOA => {
            if fields.len() < 7 {
                return Err(bad());
            }
            let mname = parse_name(fields[0], origin)?;
            let rname = parse_name(fields[1], origin)?;
            let serial: u32 = fields[2].parse().map_err(|_| bad())?;
            let refresh: i32 = fields[3].parse().map_err(|_| bad())?;
            let retry: i32 = fields[4].parse().map_err(|_| bad())?;
            let expire: i32 = fields[5].parse().map_err(|_| bad())?;
            let minimum: u32 = fields[6].parse().map_err(|_| bad())?;
            Ok(RData::SOA(SOA::new(mname, rname, serial, refresh, retry, expire, minimum)))
        }
        other => Err(Error::Malformed(format!("unsupported rr type on read: {other}"))),
    }
}

/// Write every current record in `view`'s zone to master-file text.
pub fn write_zone(records: &[std::sync::Arc<crate::core::record::Record>]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        for rrtype in record.types() {
            let Some(rrset) = record.rrset(rrtype) else {
                continue;
            };
            for rdata in &rrset.rdata {
                writeln!(
                    out,
                    "{} {} {} {} {}",
                    record.name(),
                    rrset.ttl,
                    class_str(DNSClass::IN),
                    rrtype,
                    format_rdata(rdata)
                )
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            }
        }
    }
    Ok(out)
}

fn class_str(class: DNSClass) -> &'static str {
    match class {
        DNSClass::IN => "IN",
        DNSClass::CH => "CH",
        DNSClass::HS => "HS",
        _ => "IN",
    }
}

fn format_rdata(rdata: &RData) -> String {
    match rdata {
        RData::A(addr) => addr.to_string(),
        RData::AAAA(addr) => addr.to_string(),
        RData::NS(name) => name.to_string(),
        RData::CNAME(name) => name.to_string(),
        RData::PTR(name) => name.to_string(),
        RData::MX(mx) => format!("{} {}", mx.preference(), mx.exchange()),
        RData::SOA(soa) => format!(
            "{} {} {} {} {} {} {}",
            soa.mname(),
            soa.rname(),
            soa.serial(),
            soa.refresh(),
            soa.retry(),
            soa.expire(),
            soa.minimum()
        ),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::store::RecordStore;
    use crate::core::view::ViewKind;
    use std::sync::Arc;

    #[test]
    fn reads_simple_zone() {
        let origin = Name::from_str("example.").unwrap();
        let store = Arc::new(RecordStore::new());
        let mut view = View::new(store, ViewKind::Input);
        let text = "\
$ORIGIN example.
$TTL 3600
@ IN SOA ns1.example. hostmaster.example. 1 3600 900 1209600 3600
@ IN NS ns1.example.
www IN A 127.0.0.1
";
        let n = read_zone(&mut view, &origin, text).unwrap();
        assert_eq!(n, 3);
        view.commit().unwrap();
        let www = view.latest(&Name::from_str("www.example.").unwrap()).unwrap();
        assert!(www.has_type(RecordType::A));
    }
}
