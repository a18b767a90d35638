//! The versioned record store: records (C1), indices (C2), views (C3), the
//! commit log (C4), and the store that ties them together (C5).
//!
//! `spec.md` §3/§4 describe this module's data model and operations.

pub mod commitlog;
pub mod index;
pub mod record;
pub mod store;
pub mod view;

pub use record::{DenialData, DenialRecord, KeyRole, Record, RrsigData, Signature, TypeRrset};
pub use store::RecordStore;
pub use view::{View, ViewKind};
