//! UDP/TCP sockets (`spec.md` §6). Parses inbound messages with
//! `hickory_proto`'s decoder, dispatches through [`super::handle`], and
//! encodes responses by hand: `OutboundRr::encode` (not
//! `hickory_proto::rr::Record`, since an answer RR may carry a raw RRSIG
//! payload that has no typed `RData` representation here). Grounded in
//! the original's `wire/listener.c` (interface/socket bookkeeping) and a
//! DNS-over-UDP/TCP server's read loop for the length-prefixed TCP
//! framing and per-connection task structure.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::RecordType;
use hickory_proto::serialize::binary::BinDecodable;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::store::RecordStore;
use crate::error::Result;

use super::{OutboundRr, TsigInfo, WireOutcome, WireRequest};

const MAX_UDP_SIZE: usize = 4096;
const MAX_TCP_SIZE: usize = 65_535;
const TCP_READ_TIMEOUT: Duration = Duration::from_secs(10);

// RFC 1035 §4.1.1 RCODE values. Hand-coded rather than routed through
// `hickory_proto::op::ResponseCode` since responses here are assembled
// byte-by-byte rather than through `Message`'s own encoder.
const RCODE_NOERROR: u16 = 0;
const RCODE_FORMERR: u16 = 1;
const RCODE_SERVFAIL: u16 = 2;
const RCODE_NOTIMP: u16 = 4;
const RCODE_REFUSED: u16 = 5;

/// One zone's listener target: the store it answers queries against and
/// the apex it is authoritative for.
pub struct Zone {
    pub store: Arc<RecordStore>,
    pub apex: hickory_proto::rr::Name,
}

/// Bind UDP and TCP sockets on `addr` and serve `zone` until either
/// accept loop errors out.
pub async fn run(zone: Arc<Zone>, addr: SocketAddr) -> Result<()> {
    let udp = UdpSocket::bind(addr).await?;
    let tcp = TcpListener::bind(addr).await?;

    tokio::select! {
        result = run_udp(udp, zone.clone()) => result,
        result = run_tcp(tcp, zone) => result,
    }
}

async fn run_udp(socket: UdpSocket, zone: Arc<Zone>) -> Result<()> {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; MAX_UDP_SIZE];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let bytes = buf[..len].to_vec();
        let socket = socket.clone();
        let zone = zone.clone();
        tokio::spawn(async move {
            if let Some(response) = handle_datagram(&bytes, peer, &zone) {
                let _ = socket.send_to(&response, peer).await;
            }
        });
    }
}

async fn run_tcp(listener: TcpListener, zone: Arc<Zone>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let zone = zone.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_tcp_connection(stream, peer, &zone).await {
                debug!(%peer, error = %e, "tcp connection ended");
            }
        });
    }
}

async fn handle_tcp_connection(mut stream: TcpStream, peer: SocketAddr, zone: &Zone) -> Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        if timeout(TCP_READ_TIMEOUT, stream.read_exact(&mut len_buf))
            .await
            .map(|r| r.is_err())
            .unwrap_or(true)
        {
            return Ok(());
        }
        let msg_len = u16::from_be_bytes(len_buf) as usize;
        if msg_len > MAX_TCP_SIZE {
            warn!(%peer, msg_len, "tcp message too large");
            return Ok(());
        }
        let mut msg_buf = vec![0u8; msg_len];
        if timeout(TCP_READ_TIMEOUT, stream.read_exact(&mut msg_buf))
            .await
            .map(|r| r.is_err())
            .unwrap_or(true)
        {
            return Ok(());
        }

        for message in handle_stream_request(&msg_buf, peer, zone) {
            let len_prefix = (message.len() as u16).to_be_bytes();
            stream.write_all(&len_prefix).await?;
            stream.write_all(&message).await?;
        }
    }
}

/// One UDP datagram in, at most one datagram out (AXFR/IXFR never answer
/// a UDP request with more than the first chunk; overflow means "retry
/// over TCP", signalled here by simply dropping the rest).
fn handle_datagram(bytes: &[u8], peer: SocketAddr, zone: &Zone) -> Option<Vec<u8>> {
    let messages = handle_stream_request(bytes, peer, zone);
    messages.into_iter().next()
}

/// Decode `bytes` as a DNS message, dispatch it, and encode every
/// resulting chunk as its own wire message (one message per TCP response
/// segment for AXFR/IXFR, exactly one for anything else).
fn handle_stream_request(bytes: &[u8], peer: SocketAddr, zone: &Zone) -> Vec<Vec<u8>> {
    let query = match Message::from_vec(bytes) {
        Ok(m) => m,
        Err(e) => {
            debug!(%peer, error = %e, "malformed dns message");
            return vec![encode_header_only(0, RCODE_FORMERR)];
        }
    };
    if query.message_type() != MessageType::Query {
        return Vec::new();
    }
    let Some(question) = query.queries().first() else {
        return vec![encode_header_only(query.id(), RCODE_FORMERR)];
    };

    let ixfr_serial_known = (question.query_type() == RecordType::IXFR)
        .then(|| {
            query.authorities().iter().find_map(|rr| match rr.data() {
                hickory_proto::rr::RData::SOA(soa) => Some(soa.serial()),
                _ => None,
            })
        })
        .flatten();

    // The signer only ever serves class IN zones (`config::ZoneConfig`
    // carries no per-zone class), so the question's class is not read off
    // the wire here.
    let request = WireRequest {
        opcode: query.op_code(),
        qname: question.name().clone(),
        qtype: question.query_type(),
        qclass: hickory_proto::rr::DNSClass::IN,
        peer,
        tsig: TsigInfo::default(),
        ixfr_serial_known,
    };

    match super::handle(&request, &zone.store, &zone.apex) {
        WireOutcome::Rrs(chunks) => chunks
            .into_iter()
            .map(|rrs| {
                encode_answer(
                    query.id(),
                    question.name().clone(),
                    question.query_type(),
                    hickory_proto::rr::DNSClass::IN,
                    &rrs,
                )
            })
            .collect(),
        WireOutcome::Notify => vec![encode_header_only(query.id(), RCODE_NOERROR)],
        WireOutcome::Refused => vec![encode_header_only(query.id(), RCODE_REFUSED)],
        WireOutcome::NotImplemented => vec![encode_header_only(query.id(), RCODE_NOTIMP)],
        WireOutcome::ServFail => vec![encode_header_only(query.id(), RCODE_SERVFAIL)],
    }
}

/// Hand-build a 12-byte DNS header with no question or answer sections,
/// used for the outcomes that carry no RRs.
fn encode_header_only(id: u16, rcode: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.extend_from_slice(&id.to_be_bytes());
    let flags: u16 = 0x8000 | (rcode & 0x000f);
    buf.extend_from_slice(&flags.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes()); // qdcount
    buf.extend_from_slice(&0u16.to_be_bytes()); // ancount
    buf.extend_from_slice(&0u16.to_be_bytes()); // nscount
    buf.extend_from_slice(&0u16.to_be_bytes()); // arcount
    buf
}

/// Hand-build one response message: header, echoed question, then every
/// RR in `rrs` as an answer.
fn encode_answer(
    id: u16,
    qname: hickory_proto::rr::Name,
    qtype: RecordType,
    qclass: hickory_proto::rr::DNSClass,
    rrs: &[OutboundRr],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + 64 + rrs.iter().map(OutboundRr::wire_len).sum::<usize>());
    buf.extend_from_slice(&id.to_be_bytes());
    let flags: u16 = 0x8400; // QR=1, AA=1, RCODE=0
    buf.extend_from_slice(&flags.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    buf.extend_from_slice(&(rrs.len() as u16).to_be_bytes()); // ancount
    buf.extend_from_slice(&0u16.to_be_bytes()); // nscount
    buf.extend_from_slice(&0u16.to_be_bytes()); // arcount

    crate::signing::wire::encode_name_canonical(&qname, &mut buf);
    buf.extend_from_slice(&u16::from(qtype).to_be_bytes());
    buf.extend_from_slice(&u16::from(qclass).to_be_bytes());

    for rr in rrs {
        rr.encode(&mut buf);
    }
    buf
}

#[cfg(test)]
mod test {
    use super::*;
    use hickory_proto::rr::{DNSClass, Name, RData};
    use std::str::FromStr;

    #[test]
    fn header_only_sets_qr_and_rcode_with_zero_counts() {
        let buf = encode_header_only(0x1234, RCODE_REFUSED);
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[0..2], &0x1234u16.to_be_bytes());
        let flags = u16::from_be_bytes([buf[2], buf[3]]);
        assert_eq!(flags & 0x8000, 0x8000, "QR bit must be set");
        assert_eq!(flags & 0x000f, RCODE_REFUSED);
        assert_eq!(&buf[4..12], &[0u8; 8]);
    }

    #[test]
    fn answer_message_echoes_question_and_counts_rrs() {
        let qname = Name::from_str("example.").unwrap();
        let rr = OutboundRr {
            name: qname.clone(),
            rr_type: RecordType::A,
            dns_class: DNSClass::IN,
            ttl: 300,
            rdata: super::super::Rdata::Typed(RData::A("127.0.0.1".parse().unwrap())),
        };
        let buf = encode_answer(7, qname, RecordType::A, DNSClass::IN, &[rr]);
        assert_eq!(&buf[0..2], &7u16.to_be_bytes());
        assert_eq!(u16::from_be_bytes([buf[4], buf[5]]), 1); // qdcount
        assert_eq!(u16::from_be_bytes([buf[6], buf[7]]), 1); // ancount
    }
}
