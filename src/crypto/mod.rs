//! C: the crypto-module interface (`spec.md` §4.5).
//!
//! The core treats key material as opaque and reachable only through a
//! PKCS#11-style interface: enumerate, look up by locator, sign. A
//! software implementation (`soft`) backs it with `ring`; a real PKCS#11
//! module is a Non-goal (`spec.md` §1) and is stubbed out behind the
//! `pkcs11` feature so the trait boundary is visible without committing to
//! an FFI surface.

pub mod soft;

use crate::error::Result;

/// A key as the crypto module knows it: locator, DNSSEC flags, algorithm
/// number (`spec.md` §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHandle {
    pub locator: String,
    pub flags: u16,
    pub algorithm: u8,
}

/// The PKCS#11-shaped surface the signing engine needs (`spec.md` §4.5):
/// enumerate keys, look one up by locator, compute its key tag, and sign
/// an already-assembled RRSIG-to-be-signed octet stream. Assembling that
/// stream (RFC 4034 §3.1.8.1: RRSIG rdata minus the signature, followed by
/// the canonically ordered and lower-cased RRset) is the signing engine's
/// job, not the module's — the module is opaque beyond raw signing.
pub trait CryptoModule: Send + Sync {
    fn enumerate_keys(&self) -> Result<Vec<KeyHandle>>;

    fn find_key(&self, locator: &str) -> Result<Option<KeyHandle>>;

    /// The RRSIG `key_tag` field for `key` (RFC 4034 Appendix B).
    fn key_tag(&self, key: &KeyHandle) -> Result<u16>;

    /// Sign `signed_data` with `key`, returning the raw RRSIG signature
    /// octets.
    fn sign(&self, key: &KeyHandle, signed_data: &[u8]) -> Result<Vec<u8>>;
}
