//! Centralized error handling.
//!
//! Every failure condition in the library is propagated through the `Result`
//! type; nothing panics on user input. Errors are `Clone` so they can be
//! stored for later inspection or reported from parallel sidecar writes;
//! I/O errors are wrapped in `Arc` to keep cloning cheap.
//!
//! ## Error categories
//!
//! - **I/O** ([`ArchiveError::Io`]): file system operations while saving or
//!   loading archives, sidecars and data sets.
//! - **Representation** ([`ArchiveError::NotRepresentable`]): no registered
//!   handler accepted a value.
//! - **Graph** ([`ArchiveError::Cyclic`]): the inserted values do not form a
//!   DAG.
//! - **Naming** ([`ArchiveError::NameCollision`],
//!   [`ArchiveError::UnboundFreeIdentifier`]): user names clash with the
//!   archive's reserved names, or an expression references a name nothing
//!   defines.
//! - **Data set** ([`ArchiveError::Busy`], [`ArchiveError::ReadOnly`]):
//!   directory lock timeouts and write attempts on read-only handles.
//! - **Loading** ([`ArchiveError::CorruptArchive`],
//!   [`ArchiveError::Restore`]): the stored artifact disagrees with its
//!   sidecar, or contains a construct the evaluator cannot rebuild.
//! - **Internal** ([`ArchiveError::Internal`]): logic errors; these indicate
//!   a bug (typically in a custom representer) and should be reported.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type used throughout the library.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// The master error enum covering all failure domains.
///
/// Recoverability follows the variant: [`ArchiveError::Busy`] may simply be
/// retried, [`ArchiveError::NameCollision`] is recoverable at insert time by
/// picking another name, everything else surfaces a defect in the archived
/// data or its storage.
#[derive(Debug, Clone)]
pub enum ArchiveError {
    /// Low-level I/O failure (disk full, permissions, missing files).
    ///
    /// The underlying `io::Error` is wrapped in an `Arc` to make the error
    /// `Clone`.
    Io(Arc<io::Error>),

    /// No representation handler accepted the value. Carries a description
    /// of the offending value.
    NotRepresentable(String),

    /// The inserted values contain a reference cycle; archives require a
    /// directed acyclic graph.
    Cyclic(String),

    /// A user-supplied name clashes with a previous insert or with a name
    /// reserved by the archive.
    NameCollision(String),

    /// An emitted expression references a name that is neither bound
    /// earlier, imported, nor a builtin. This is a bug in a representer.
    UnboundFreeIdentifier(String),

    /// A data-set directory lock could not be acquired within the timeout.
    /// The operation had no side effects and may be retried.
    Busy(String),

    /// A stored archive and its array sidecar disagree (missing or extra
    /// array keys, malformed sidecar files).
    CorruptArchive(String),

    /// The stored source contains a construct the restore evaluator does not
    /// support (for example a user-defined class).
    Restore(String),

    /// A write operation was attempted on a read-only data set.
    ReadOnly(String),

    /// Logic error in the graph engine. Should not occur in production.
    Internal(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::NotRepresentable(s) => write!(f, "cannot represent {s}"),
            Self::Cyclic(s) => write!(f, "cyclic reference: {s}"),
            Self::NameCollision(s) => write!(f, "name collision: {s}"),
            Self::UnboundFreeIdentifier(s) => write!(f, "unbound identifier: {s}"),
            Self::Busy(s) => write!(f, "busy: {s}"),
            Self::CorruptArchive(s) => write!(f, "corrupt archive: {s}"),
            Self::Restore(s) => write!(f, "restore error: {s}"),
            Self::ReadOnly(s) => write!(f, "read-only: {s}"),
            Self::Internal(s) => write!(f, "internal logic error: {s}"),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl serde::ser::Error for ArchiveError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::NotRepresentable(msg.to_string())
    }
}
