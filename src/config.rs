//! Zone and signer configuration.
//!
//! Configuration-file parsing in full is a Non-goal (`spec.md` §1); this
//! module gives the in-memory shape that the rest of the crate is built
//! against, loadable from TOML via `serde`.

use std::time::Duration;

use serde::Deserialize;

use crate::core::record::KeyRole;

/// Zone serial assignment policy (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialPolicy {
    /// Increment the previous serial by one.
    Counter,
    /// `YYYYMMDDnn`, incrementing `nn` on same-day re-signs.
    DateCounter,
    /// Current unix time, falling back to `Counter` if it would not advance.
    UnixTime,
    /// Leave the serial as provided by the input view (inbound transfers).
    Keep,
}

impl Default for SerialPolicy {
    fn default() -> Self {
        SerialPolicy::Counter
    }
}

/// One key as it appears in a zone's signing configuration (`spec.md` §4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    /// Opaque locator used to find the key in the crypto module.
    pub locator: String,
    /// DNSKEY flags field; role is derived from it (bit 0 = SEP/KSK).
    pub flags: u16,
    pub algorithm: u8,
}

impl KeyConfig {
    pub fn role(&self) -> KeyRole {
        if self.flags & 0x0001 != 0 {
            KeyRole::Ksk
        } else {
            KeyRole::Zsk
        }
    }
}

/// A pre-baked RRSIG over the DNSKEY RRset, for keys held off-line
/// (`spec.md` §4.2 step 6).
#[derive(Debug, Clone, Deserialize)]
pub struct LiteralRrsig {
    /// Base64-encoded RRSIG rdata.
    pub rdata_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenialMethod {
    Nsec,
    Nsec3 {
        algorithm: u8,
        #[serde(with = "hex_bytes")]
        salt: Vec<u8>,
        iterations: u16,
        opt_out: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    pub keys: Vec<KeyConfig>,
    #[serde(default)]
    pub literal_dnskey_rrsigs: Vec<LiteralRrsig>,
    #[serde(with = "duration_secs")]
    pub sig_validity_default: Duration,
    #[serde(default, with = "opt_duration_secs")]
    pub sig_validity_denial: Option<Duration>,
    #[serde(default, with = "opt_duration_secs")]
    pub sig_validity_keyset: Option<Duration>,
    #[serde(with = "duration_secs")]
    pub sig_refresh_interval: Duration,
    #[serde(with = "duration_secs")]
    pub sig_jitter: Duration,
    #[serde(with = "duration_secs")]
    pub sig_inception_offset: Duration,
    pub denial: DenialMethod,
}

impl SigningConfig {
    /// Validity period to use for the given RR type, per `spec.md` §4.2
    /// step 5 (NSEC/NSEC3 use `sig_validity_denial`, DNSKEY uses
    /// `sig_validity_keyset` falling back to `sig_validity_default`, all
    /// else uses `sig_validity_default`).
    pub fn validity_for(&self, rrtype: hickory_proto::rr::RecordType) -> Duration {
        use hickory_proto::rr::RecordType;
        match rrtype {
            RecordType::NSEC | RecordType::NSEC3 => {
                self.sig_validity_denial.unwrap_or(self.sig_validity_default)
            }
            RecordType::DNSKEY => {
                match self.sig_validity_keyset {
                    Some(d) if !d.is_zero() => d,
                    _ => self.sig_validity_default,
                }
            }
            _ => self.sig_validity_default,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default)]
    pub serial_policy: SerialPolicy,
    pub signing: SigningConfig,
    #[serde(with = "duration_secs")]
    pub resign_interval: Duration,
    #[serde(with = "duration_secs")]
    pub retention_horizon: Duration,
    pub zonefile_in: Option<String>,
    pub zonefile_out: Option<String>,
    pub journal_path: String,
    /// Address the zone's DNS wire listener (queries, AXFR/IXFR) binds to.
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub control_socket: Option<String>,
    #[serde(default)]
    pub control_http_addr: Option<String>,
    /// Path to the shared per-zone serial bookkeeping file (`signer.db`).
    #[serde(default = "default_meta_path")]
    pub meta_path: String,
}

fn default_meta_path() -> String {
    "signer.db".to_string()
}

impl Config {
    pub fn from_toml_str(s: &str) -> crate::Result<Self> {
        toml::from_str(s).map_err(|e| crate::Error::Config(e.to_string()))
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(d: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        data_encoding::HEXLOWER_PERMISSIVE
            .decode(s.to_lowercase().as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validity_falls_back_for_zero_keyset() {
        let sc = SigningConfig {
            keys: vec![],
            literal_dnskey_rrsigs: vec![],
            sig_validity_default: Duration::from_secs(100),
            sig_validity_denial: None,
            sig_validity_keyset: Some(Duration::from_secs(0)),
            sig_refresh_interval: Duration::from_secs(10),
            sig_jitter: Duration::from_secs(0),
            sig_inception_offset: Duration::from_secs(0),
            denial: DenialMethod::Nsec,
        };
        assert_eq!(
            sc.validity_for(hickory_proto::rr::RecordType::DNSKEY),
            Duration::from_secs(100)
        );
    }
}
