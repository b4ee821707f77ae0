//! Error taxonomy.
//!
//! Four failure classes with different propagation rules:
//! - [`FormatError`]: local; silent skip at discovery sites, hard fail at
//!   explicit single-decode sites.
//! - `NotFound`: carried as an absent value (`None`) through fetch and
//!   discovery, never as an error.
//! - `Network`: surfaced per call/per entry; the radar records it on the
//!   affected program only.
//! - `Invariant`: a protocol upgrade we do not understand, or a true bug.
//!   Raised loudly; a corrupted margin figure is worse than no figure.

use thiserror::Error;

/// A buffer that is not (or not a whole) slab.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("buffer too short: {len} bytes, need at least {need}")]
    TooShort { len: usize, need: usize },

    #[error("bad magic: {found:#018x}")]
    BadMagic { found: u64 },

    #[error("unsupported slab version {found}")]
    BadVersion { found: u32 },

    #[error("slab length {len} matches no known capacity")]
    BadLength { len: usize },
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("rpc failure: {0}")]
    Network(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl WatchError {
    /// True when retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, WatchError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
