//! Crate-wide error type.
//!
//! Propagation follows the policy described for the signer: `Conflict` never
//! escapes a view's `commit` (it is resolved locally by reset-and-retry, see
//! [`crate::core::view`]); `NotFound`/`Unauthorized` surface to callers as
//! DNS REFUSED/NOTAUTH or HTTP 404; `CryptoFailure` is logged and the
//! affected record keeps its prior signatures; `Corrupt` on a journal aborts
//! startup while `Corrupt` on a wire message just drops that message;
//! `Malformed` becomes FORMERR/400; `Io`/`Timeout` close outbound XFR
//! connections and reschedule inbound ones.

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("record or zone not found: {0}")]
    NotFound(String),

    #[error("commit conflict on record {0}")]
    Conflict(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("crypto module failure: {0}")]
    CryptoFailure(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors that are safe to retry on the next pipeline tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::CryptoFailure(_) | Error::Timeout | Error::Io(_)
        )
    }
}
