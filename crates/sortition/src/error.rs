//! Error taxonomy shared by every component.
//!
//! - [`ValidationError`]: malformed, oversized or wrongly typed client input.
//! - [`Error::Storage`]: the embedded store failed; never retried.
//! - [`EntropyError`]: the secure random source is unavailable. Fatal.
//!
//! Lookups that find nothing are not errors: the store returns `None`.

use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Rejection of caller-supplied input before it reaches the store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The `content-type` header did not match the expected media type.
    #[error("incorrect content type")]
    IncorrectContentType { found: Option<String> },

    /// The declared or streamed body exceeded the byte limit.
    #[error("too much data")]
    TooMuchData { limit: usize },

    /// The body was well-formed transport-wise but is not an acceptable
    /// payload (e.g. not a valid identifier).
    #[error("invalid data")]
    InvalidData,

    /// The body stream failed before it was fully read.
    #[error("unreadable body: {0}")]
    Body(String),
}

/// Failure of the secure random source backing the entropy pool.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EntropyError {
    #[error("secure random source failed: {0}")]
    Source(String),
}

/// Every failure a `sortition` operation can surface.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A storage statement could not be executed or committed.
    #[error("could not {operation}: {source}")]
    Storage {
        operation: Operation,
        #[source]
        source: sqlx::Error,
    },

    /// The entropy source is unavailable. There is no recovery path.
    #[error(transparent)]
    Entropy(#[from] EntropyError),

    /// A draw was requested over an empty range.
    #[error("invalid range [{min}, {max})")]
    InvalidRange { min: u32, max: u32 },
}

impl Error {
    pub(crate) fn storage(operation: Operation) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Storage { operation, source }
    }

    /// Whether the process can keep serving after this error.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Entropy(_))
    }
}

/// Store operation named in [`Error::Storage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Migrate,
    CreateHub,
    AddItem,
    SelectItem,
    DeactivateItem,
    DeactivateHub,
    Lookup,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Migrate => "prepare schema",
            Self::CreateHub => "create hub",
            Self::AddItem => "add item",
            Self::SelectItem => "select item",
            Self::DeactivateItem => "deactivate item",
            Self::DeactivateHub => "deactivate hub",
            Self::Lookup => "look up row",
        };
        f.write_str(name)
    }
}
