//! # srcarc
//!
//! A serialization library that writes **source code** instead of bytes:
//! an archive of named values renders as a human-readable Python module
//! that, when evaluated, reconstitutes semantically equivalent objects. The
//! artifact is importable on its own, so archives outlive this library.
//!
//! ## Overview
//!
//! Instead of encoding values into an opaque format, the engine analyzes
//! the reference structure of the inserted values and builds a dependency
//! graph: shared sub-objects collapse onto one node, every node carries an
//! expression that rebuilds its value, and the emitted program assigns the
//! nodes in dependency order. Shared references in memory stay shared after
//! a round trip, and cyclic inputs are rejected up front.
//!
//! ### Key pieces
//!
//! *   **Representation registry:** a priority-ordered chain of handlers
//!     mapping each value to `(expression, sub-values, imports)`. Custom
//!     handlers and the [`Representable`] object protocol slot in without
//!     touching the engine.
//! *   **Graph reducer:** topologically orders the graph, names
//!     intermediates, resolves import aliases, and (in the flat form)
//!     inlines single-use nodes so the output stays close to what a person
//!     would write.
//! *   **Two output forms:** a linear *flat* form, and a *scoped* form that
//!     wraps each node in an immediately-invoked function so no renaming is
//!     ever needed.
//! *   **Array sidecar:** numeric arrays past a size threshold move to
//!     `.npy` files (or an HDF5 file) next to the module, and the source
//!     refers to them through an ambient `_arrays` lookup.
//! *   **Data sets:** a directory of single-item archives with a metadata
//!     module and an advisory directory lock for concurrent writers.
//!
//! ## Basic usage
//!
//! ```
//! use srcarc::{Archive, Value};
//!
//! let shared = Value::list(vec![1i64.into(), 2i64.into()]);
//! let outer = Value::list(vec![shared.clone(), shared.clone()]);
//!
//! let mut arch = Archive::new();
//! arch.insert_as("pair", outer)?;
//! let source = arch.render()?;
//!
//! // The rendered source defines `pair`; the shared list appears once.
//! let ns = srcarc::restore(&source)?;
//! assert!(ns.get("pair").is_some());
//! # Ok::<(), srcarc::ArchiveError>(())
//! ```
//!
//! ## Safety and error handling
//!
//! * **No panics:** failure conditions surface as [`ArchiveError`] values
//!   (enforced through clippy lints).
//! * **Encapsulated unsafe:** the single `unsafe` block lives in the npy
//!   backend, where sidecar files are memory-mapped for reading.
//! * **Atomic publication:** modules and sidecar files are written to a
//!   temporary name, flushed, and renamed into place.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod array;
pub mod backend;
pub mod convert;
pub mod dataset;
pub mod error;
pub mod format;
pub mod object;
pub mod represent;
pub mod representers;
pub mod restore;
pub mod sidecar;
pub mod value;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod emit;
#[doc(hidden)]
pub mod graph;
#[doc(hidden)]
pub mod io;
#[doc(hidden)]
pub mod packager;
#[doc(hidden)]
pub mod reduce;
#[doc(hidden)]
pub mod subst;

// --- RE-EXPORTS ---

pub use api::{Archive, ArchiveOptions};
pub use array::{DType, NdArray};
pub use convert::to_value;
pub use dataset::{DataSet, DataSetOptions, Mode};
pub use error::{ArchiveError, Result};
pub use object::{NewArgs, Reduction, Representable, Symbol};
pub use represent::{Import, Rep, Representer, RepresenterRegistry};
pub use restore::{restore, restore_with, Namespace};
pub use value::{Dict, List, Range, Set, Value};

// Re-export the derive macro so it is accessible as `srcarc::Representable`
// next to the trait of the same name.
pub use srcarc_derive::Representable;

/// Constants shared with emitted artifacts.
pub mod constants {
    /// Default name of the ambient array lookup.
    pub const DEFAULT_DATA_NAME: &str = "_arrays";
}
