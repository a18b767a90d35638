//! A software-backed [`CryptoModule`], standing in for a hardware/PKCS#11
//! token (`spec.md` §4.5, which names real hardware modules as out of
//! scope beyond the trait boundary). Grounded in the original's
//! `softHSM/` directory and `zonesignrecord.c`'s algorithm table, but
//! implemented with `ring` rather than a vendored PKCS#11 shim.

use std::collections::HashMap;

use parking_lot::Mutex;
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, KeyPair, RsaKeyPair};

use crate::error::{Error, Result};

use super::{CryptoModule, KeyHandle};

enum SigningKey {
    RsaSha256(RsaKeyPair),
    RsaSha512(RsaKeyPair),
    EcdsaP256Sha256(EcdsaKeyPair),
    EcdsaP384Sha384(EcdsaKeyPair),
}

struct LoadedKey {
    handle: KeyHandle,
    /// DNSKEY rdata (flags, protocol, algorithm, public key), used only to
    /// compute the RFC 4034 Appendix B key tag.
    dnskey_rdata: Vec<u8>,
    key: SigningKey,
}

/// An in-process software signer. Keys are loaded from PKCS#8 (RSA/ECDSA)
/// at startup; there is no persistence or key generation here (`spec.md`
/// §1 Non-goals: key management).
pub struct SoftCryptoModule {
    keys: Mutex<HashMap<String, LoadedKey>>,
    rng: SystemRandom,
}

impl Default for SoftCryptoModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftCryptoModule {
    pub fn new() -> Self {
        SoftCryptoModule {
            keys: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
        }
    }

    /// Load an RSA key from a PKCS#8 document. `algorithm` selects the
    /// digest (8 = RSASHA256, 10 = RSASHA512); `flags` are the DNSKEY
    /// flags (SEP bit marks a KSK).
    pub fn load_rsa_pkcs8(
        &self,
        locator: &str,
        flags: u16,
        algorithm: u8,
        pkcs8: &[u8],
    ) -> Result<()> {
        let pair = RsaKeyPair::from_pkcs8(pkcs8)
            .map_err(|e| Error::CryptoFailure(format!("loading RSA key {locator}: {e}")))?;
        let public_key = pair.public_key().as_ref().to_vec();
        let key = match algorithm {
            8 => SigningKey::RsaSha256(pair),
            10 => SigningKey::RsaSha512(pair),
            other => {
                return Err(Error::CryptoFailure(format!(
                    "unsupported RSA algorithm number {other}"
                )))
            }
        };
        self.insert(locator, flags, algorithm, &public_key, key)
    }

    /// Load an ECDSA key from a PKCS#8 document. `algorithm` 13 =
    /// ECDSAP256SHA256, 14 = ECDSAP384SHA384.
    pub fn load_ecdsa_pkcs8(
        &self,
        locator: &str,
        flags: u16,
        algorithm: u8,
        pkcs8: &[u8],
    ) -> Result<()> {
        let alg = match algorithm {
            13 => &signature::ECDSA_P256_SHA256_FIXED_SIGNING,
            14 => &signature::ECDSA_P384_SHA384_FIXED_SIGNING,
            other => {
                return Err(Error::CryptoFailure(format!(
                    "unsupported ECDSA algorithm number {other}"
                )))
            }
        };
        let pair = EcdsaKeyPair::from_pkcs8(alg, pkcs8, &self.rng)
            .map_err(|e| Error::CryptoFailure(format!("loading ECDSA key {locator}: {e}")))?;
        let public_key = pair.public_key().as_ref().to_vec();
        let key = match algorithm {
            13 => SigningKey::EcdsaP256Sha256(pair),
            14 => SigningKey::EcdsaP384Sha384(pair),
            _ => unreachable!(),
        };
        self.insert(locator, flags, algorithm, &public_key, key)
    }

    fn insert(
        &self,
        locator: &str,
        flags: u16,
        algorithm: u8,
        public_key: &[u8],
        key: SigningKey,
    ) -> Result<()> {
        let dnskey_rdata = dnskey_rdata(flags, algorithm, public_key);
        self.keys.lock().insert(
            locator.to_string(),
            LoadedKey {
                handle: KeyHandle {
                    locator: locator.to_string(),
                    flags,
                    algorithm,
                },
                dnskey_rdata,
                key,
            },
        );
        Ok(())
    }
}

/// DNSKEY rdata: 2-byte flags, 1-byte protocol (always 3), 1-byte
/// algorithm, public key.
fn dnskey_rdata(flags: u16, algorithm: u8, public_key: &[u8]) -> Vec<u8> {
    let mut rdata = Vec::with_capacity(4 + public_key.len());
    rdata.extend_from_slice(&flags.to_be_bytes());
    rdata.push(3);
    rdata.push(algorithm);
    rdata.extend_from_slice(public_key);
    rdata
}

/// RFC 4034 Appendix B key tag algorithm.
fn compute_key_tag(dnskey_rdata: &[u8]) -> u16 {
    let mut ac: u32 = 0;
    for (i, byte) in dnskey_rdata.iter().enumerate() {
        if i % 2 == 0 {
            ac += (*byte as u32) << 8;
        } else {
            ac += *byte as u32;
        }
    }
    ac += (ac >> 16) & 0xFFFF;
    (ac & 0xFFFF) as u16
}

impl CryptoModule for SoftCryptoModule {
    fn enumerate_keys(&self) -> Result<Vec<KeyHandle>> {
        Ok(self.keys.lock().values().map(|k| k.handle.clone()).collect())
    }

    fn find_key(&self, locator: &str) -> Result<Option<KeyHandle>> {
        Ok(self.keys.lock().get(locator).map(|k| k.handle.clone()))
    }

    fn key_tag(&self, key: &KeyHandle) -> Result<u16> {
        let keys = self.keys.lock();
        let loaded = keys
            .get(&key.locator)
            .ok_or_else(|| Error::NotFound(format!("key {}", key.locator)))?;
        Ok(compute_key_tag(&loaded.dnskey_rdata))
    }

    fn sign(&self, key: &KeyHandle, signed_data: &[u8]) -> Result<Vec<u8>> {
        let keys = self.keys.lock();
        let loaded = keys
            .get(&key.locator)
            .ok_or_else(|| Error::NotFound(format!("key {}", key.locator)))?;
        match &loaded.key {
            SigningKey::RsaSha256(pair) => {
                let mut sig = vec![0u8; pair.public_modulus_len()];
                pair.sign(&signature::RSA_PKCS1_SHA256, &self.rng, signed_data, &mut sig)
                    .map_err(|e| Error::CryptoFailure(format!("RSA-SHA256 sign failed: {e}")))?;
                Ok(sig)
            }
            SigningKey::RsaSha512(pair) => {
                let mut sig = vec![0u8; pair.public_modulus_len()];
                pair.sign(&signature::RSA_PKCS1_SHA512, &self.rng, signed_data, &mut sig)
                    .map_err(|e| Error::CryptoFailure(format!("RSA-SHA512 sign failed: {e}")))?;
                Ok(sig)
            }
            SigningKey::EcdsaP256Sha256(pair) => pair
                .sign(&self.rng, signed_data)
                .map(|s| s.as_ref().to_vec())
                .map_err(|e| Error::CryptoFailure(format!("ECDSA-P256 sign failed: {e}"))),
            SigningKey::EcdsaP384Sha384(pair) => pair
                .sign(&self.rng, signed_data)
                .map(|s| s.as_ref().to_vec())
                .map_err(|e| Error::CryptoFailure(format!("ECDSA-P384 sign failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_locator_is_not_found() {
        let module = SoftCryptoModule::new();
        assert!(module.find_key("nope").unwrap().is_none());
        let key = KeyHandle {
            locator: "nope".into(),
            flags: 256,
            algorithm: 8,
        };
        assert!(module.sign(&key, b"data").is_err());
    }
}
