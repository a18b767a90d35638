//! Online DNSSEC zone signer.
//!
//! The crate is organized around a versioned record store (`core`) read and
//! written through named views, a signing engine (`signing`) and a denial
//! engine (`denial`) that operate on records drawn from those views, and a
//! pipeline driver (`pipeline`) that cycles records through input, prepare,
//! sign and output views. Everything else — the zone file reader/writer,
//! the DNS wire listener, the control API, and the journal — is plumbing
//! around that core.

pub mod config;
pub mod control;
pub mod core;
pub mod crypto;
pub mod daemon;
pub mod denial;
pub mod dnsname;
pub mod error;
pub mod journal;
pub mod pipeline;
pub mod signing;
pub mod wire;
pub mod zonefile;

pub use error::{Error, Result};
