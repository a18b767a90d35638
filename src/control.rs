//! Control API (`spec.md` §6): JSON over HTTP POST, two operations, each
//! mapping to one atomic commit on a zone's input view. Grounded in the
//! original's hand-rolled `daemon/httpd.c` — a minimal HTTP/1.1 server
//! over `tokio::net::TcpListener` rather than a web framework, since the
//! surface here is exactly two endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use hickory_proto::rr::{Name, RecordType};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::core::record::Record;
use crate::core::view::{commit_with_retry, View};
use crate::dnsname::is_ancestor_or_equal;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;

fn default_ttl() -> u32 {
    3600
}

/// One RR as carried in a control request's `rrs` array: the same
/// name/type/rdata presentation-format fields `zonefile` parses out of a
/// master file, just shaped as JSON instead of a line of text.
#[derive(Debug, Deserialize)]
pub struct JsonRr {
    pub name: String,
    #[serde(rename = "type")]
    pub rrtype: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    pub rdata: String,
}

#[derive(Debug, Deserialize)]
struct ChangeDelegationRequest {
    zone: String,
    point: String,
    rrs: Vec<JsonRr>,
}

#[derive(Debug, Deserialize)]
struct ChangeNameRequest {
    zone: String,
    rrs: Vec<JsonRr>,
}

/// Shared handle to one zone's pipeline, as registered with the control
/// API by the daemon. `Pipeline` locks each of its views independently, so
/// this needs no outer lock of its own.
pub type ZoneHandle = Arc<Pipeline>;

/// The control API's view of the daemon: every zone it may mutate, keyed
/// by apex name text (`config::ZoneConfig::name`).
pub struct ControlApi {
    zones: HashMap<String, ZoneHandle>,
}

impl ControlApi {
    pub fn new(zones: HashMap<String, ZoneHandle>) -> Self {
        ControlApi { zones }
    }

    /// Serve HTTP on `addr` until the accept loop errors out.
    pub async fn run(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        loop {
            let (stream, peer) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.handle_connection(stream).await {
                    debug!(%peer, error = %e, "control connection ended");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let (method, path, body) = read_http_request(&mut stream).await?;
        let (status, body_out) = self.dispatch(&method, &path, &body);
        write_http_response(&mut stream, status, &body_out).await?;
        Ok(())
    }

    /// `spec.md` §6: HTTP 200 with empty body on success, 404 on unknown
    /// zone or endpoint, 500 on any other failure.
    fn dispatch(&self, method: &str, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
        if method != "POST" {
            return (404, Vec::new());
        }
        let result = match path {
            "/change_delegation" => serde_json::from_slice::<ChangeDelegationRequest>(body)
                .map_err(|e| Error::Malformed(format!("bad request body: {e}")))
                .and_then(|req| self.change_delegation(&req)),
            "/change_name" => serde_json::from_slice::<ChangeNameRequest>(body)
                .map_err(|e| Error::Malformed(format!("bad request body: {e}")))
                .and_then(|req| self.change_name(&req)),
            other => Err(Error::NotFound(format!("no such endpoint: {other}"))),
        };
        match result {
            Ok(()) => (200, Vec::new()),
            Err(Error::NotFound(msg)) => {
                debug!(error = %msg, "control request: not found");
                (404, Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "control request failed");
                (500, Vec::new())
            }
        }
    }

    fn zone(&self, name: &str) -> Result<ZoneHandle> {
        self.zones
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("unknown zone: {name}")))
    }

    /// `change_delegation(zone, point, rrs)`: remove everything at and
    /// below `point`, insert `rrs`, as a single atomic input-view commit.
    /// Retried locally on `Conflict` (`spec.md` §7): a concurrent signing
    /// cycle may touch one of the doomed names between one attempt's read
    /// of `all_current` and its commit, so each retry re-reads it fresh
    /// rather than reusing a set computed against a stale snapshot.
    fn change_delegation(&self, req: &ChangeDelegationRequest) -> Result<()> {
        let pipeline = self.zone(&req.zone)?;
        let point = Name::from_str(&req.point)
            .map_err(|e| Error::Malformed(format!("bad point {}: {e}", req.point)))?;
        let apex = pipeline.apex().clone();

        let mut view = pipeline.input_view();
        commit_with_retry(&mut view, |view| {
            view.reset();
            let doomed: Vec<Name> = pipeline
                .store()
                .all_current()
                .into_iter()
                .filter(|r| is_ancestor_or_equal(&point, r.name()))
                .map(|r| r.name().clone())
                .collect();
            for name in &doomed {
                view.overwrite(name);
            }
            stage_rrs(view, &apex, &req.rrs)
        })
    }

    /// `change_name(zone, rrs)`: remove all RRsets whose owner appears in
    /// `rrs`, insert `rrs`, as a single atomic input-view commit. Retried
    /// locally on `Conflict` the same way as `change_delegation`.
    fn change_name(&self, req: &ChangeNameRequest) -> Result<()> {
        let pipeline = self.zone(&req.zone)?;
        let apex = pipeline.apex().clone();

        let mut owners: Vec<Name> = Vec::new();
        for rr in &req.rrs {
            let name = crate::zonefile::parse_name(&rr.name, &apex)?;
            if !owners.contains(&name) {
                owners.push(name);
            }
        }

        let mut view = pipeline.input_view();
        commit_with_retry(&mut view, |view| {
            view.reset();
            for name in &owners {
                view.overwrite(name);
            }
            stage_rrs(view, &apex, &req.rrs)
        })
    }
}

/// Stage every RR in `rrs` into `view`, grouping multiple RRs for the same
/// owner onto one record the way `zonefile::read_zone` does.
fn stage_rrs(view: &mut View, origin: &Name, rrs: &[JsonRr]) -> Result<()> {
    for rr in rrs {
        let owner = crate::zonefile::parse_name(&rr.name, origin)?;
        let rr_type = RecordType::from_str(&rr.rrtype)
            .map_err(|_| Error::Malformed(format!("unknown rr type: {}", rr.rrtype)))?;
        let fields: Vec<&str> = rr.rdata.split_whitespace().collect();
        let rdata = crate::zonefile::parse_rdata(rr_type, &fields, origin)?;

        let mut next = view
            .latest(&owner)
            .map(|r| (*r).clone())
            .unwrap_or_else(|| Record::new(owner.clone()));
        next.insert_rdata(rr_type, rr.ttl, rdata);
        view.stage_computed(next);
    }
    Ok(())
}

const MAX_REQUEST_BYTES: usize = 1 << 20;

/// Read one HTTP/1.1 request off `stream`: request line, headers up to the
/// blank line, then exactly `Content-Length` bytes of body. No chunked
/// transfer encoding, no keep-alive — one request per connection, matching
/// the original's `httpd.c` loop.
async fn read_http_request(stream: &mut TcpStream) -> Result<(String, String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(Error::Malformed("request headers too large".into()));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Malformed("connection closed before headers".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    if content_length > MAX_REQUEST_BYTES {
        return Err(Error::Malformed("request body too large".into()));
    }

    let body_start = header_end + 4;
    let mut body = buf[body_start..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Malformed("connection closed before full body".into()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    Ok((method, path, body))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn write_http_response(stream: &mut TcpStream, status: u16, body: &[u8]) -> Result<()> {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{DenialMethod, SerialPolicy, SigningConfig, ZoneConfig};
    use hickory_proto::rr::RecordType as HRecordType;
    use std::time::Duration;

    fn zone_config(name: &str) -> ZoneConfig {
        ZoneConfig {
            name: name.to_string(),
            serial_policy: SerialPolicy::Counter,
            signing: SigningConfig {
                keys: vec![],
                literal_dnskey_rrsigs: vec![],
                sig_validity_default: Duration::from_secs(1000),
                sig_validity_denial: None,
                sig_validity_keyset: None,
                sig_refresh_interval: Duration::from_secs(100),
                sig_jitter: Duration::from_secs(0),
                sig_inception_offset: Duration::from_secs(0),
                denial: DenialMethod::Nsec,
            },
            resign_interval: Duration::from_secs(3600),
            retention_horizon: Duration::from_secs(86_400),
            zonefile_in: None,
            zonefile_out: None,
            journal_path: "/dev/null".to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
        }
    }

    fn apex_with_www() -> (Name, Pipeline) {
        let apex = Name::from_str("example.").unwrap();
        let pipeline = Pipeline::new(apex.clone(), zone_config("example."));
        {
            let mut view = pipeline.input_view();
            let fields = ["127.0.0.1"];
            let rdata = crate::zonefile::parse_rdata(HRecordType::A, &fields, &apex).unwrap();
            let mut rec = Record::new(Name::from_str("www.example.").unwrap());
            rec.insert_rdata(HRecordType::A, 300, rdata);
            view.stage_computed(rec);
            view.commit().unwrap();
        }
        pipeline.advance_prepare().unwrap();
        (apex, pipeline)
    }

    #[test]
    fn dispatch_404s_on_unknown_zone() {
        let api = ControlApi::new(HashMap::new());
        let body = br#"{"zone":"nope.","rrs":[]}"#;
        let (status, _) = api.dispatch("POST", "/change_name", body);
        assert_eq!(status, 404);
    }

    #[test]
    fn dispatch_404s_on_unknown_path() {
        let api = ControlApi::new(HashMap::new());
        let (status, _) = api.dispatch("POST", "/nope", b"{}");
        assert_eq!(status, 404);
    }

    #[test]
    fn dispatch_500s_on_bad_json() {
        let (_, pipeline) = apex_with_www();
        let mut zones = HashMap::new();
        zones.insert("example.".to_string(), Arc::new(pipeline));
        let api = ControlApi::new(zones);
        let (status, _) = api.dispatch("POST", "/change_name", b"not json");
        assert_eq!(status, 500);
    }

    #[test]
    fn change_name_replaces_owner_rrset() {
        let (_, pipeline) = apex_with_www();
        let mut zones = HashMap::new();
        zones.insert("example.".to_string(), Arc::new(pipeline));
        let api = ControlApi::new(zones);

        let body = br#"{"zone":"example.","rrs":[{"name":"www.example.","type":"A","ttl":300,"rdata":"127.0.0.2"}]}"#;
        let (status, _) = api.dispatch("POST", "/change_name", body);
        assert_eq!(status, 200);

        let pipeline = api.zones.get("example.").unwrap();
        let name = Name::from_str("www.example.").unwrap();
        let latest = pipeline.store().latest(&name).unwrap();
        assert!(latest.has_type(HRecordType::A));
    }

    #[test]
    fn change_delegation_removes_subtree() {
        let (apex, pipeline) = apex_with_www();
        {
            let mut view = pipeline.input_view();
            let fields = ["192.0.2.1"];
            let rdata = crate::zonefile::parse_rdata(HRecordType::A, &fields, &apex).unwrap();
            let mut rec = Record::new(Name::from_str("host.sub.example.").unwrap());
            rec.insert_rdata(HRecordType::A, 300, rdata);
            view.stage_computed(rec);
            view.commit().unwrap();
        }
        pipeline.advance_prepare().unwrap();

        let mut zones = HashMap::new();
        zones.insert("example.".to_string(), Arc::new(pipeline));
        let api = ControlApi::new(zones);

        let body = br#"{"zone":"example.","point":"sub.example.","rrs":[]}"#;
        let (status, _) = api.dispatch("POST", "/change_delegation", body);
        assert_eq!(status, 200);
    }
}
