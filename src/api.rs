//! The public archive façade.
//!
//! An [`Archive`] collects named top-level values, renders them as
//! re-executable Python source, and optionally saves the result as an
//! importable module or package together with its array sidecar.
//!
//! ```
//! use srcarc::{Archive, ArchiveOptions, Value};
//!
//! let mut arch = Archive::with_options(ArchiveOptions::new().scoped(false));
//! arch.insert_as("x", 3i64)?;
//! arch.insert_as("y", Value::list(vec![1i64.into(), 2i64.into()]))?;
//! let source = arch.render()?;
//! assert!(source.contains("x = 3"));
//! assert!(source.contains("y = [1, 2]"));
//! # Ok::<(), srcarc::ArchiveError>(())
//! ```

use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::backend::{BackendRegistry, SidecarBackend};
use crate::emit::{self, EmitOptions};
use crate::error::{ArchiveError, Result};
use crate::graph::GraphBuilder;
use crate::packager;
use crate::reduce::{self, ReduceOptions};
use crate::represent::{ReprContext, Representer, RepresenterRegistry};
use crate::sidecar::ArrayStore;
use crate::subst;
use crate::value::Value;

/// Configuration for an [`Archive`].
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Emit the scoped (wrapped) form instead of the flat form.
    pub scoped: bool,
    /// Element count at or above which arrays move to the sidecar; `None`
    /// keeps every array inline.
    pub array_threshold: Option<usize>,
    /// Name of the ambient array lookup in the emitted source.
    pub data_name: String,
    /// Use the tokenizer-based substitution strategy.
    pub robust_replace: bool,
    /// Collapse single-binding archives to the bound value on import.
    pub single_item_mode: bool,
    /// Attempt representation eagerly on insert to fail fast.
    pub check_on_insert: bool,
    /// Pattern user-chosen names must match.
    pub allowed_name_pattern: Regex,
    /// Sidecar backend name (`"npy"` or `"hdf5"`).
    pub backend: String,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            scoped: true,
            array_threshold: None,
            data_name: "_arrays".to_string(),
            robust_replace: false,
            single_item_mode: false,
            check_on_insert: false,
            allowed_name_pattern: Regex::new("^[A-Za-z][A-Za-z0-9_]*$")
                .expect("default name pattern is valid"),
            backend: "npy".to_string(),
        }
    }
}

impl ArchiveOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects scoped or flat emission.
    pub fn scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }

    /// Sets the sidecar threshold.
    pub fn array_threshold(mut self, threshold: usize) -> Self {
        self.array_threshold = Some(threshold);
        self
    }

    /// Renames the ambient array lookup.
    pub fn data_name(mut self, name: impl Into<String>) -> Self {
        self.data_name = name.into();
        self
    }

    /// Enables the tokenizer-based substitution strategy.
    pub fn robust_replace(mut self, robust: bool) -> Self {
        self.robust_replace = robust;
        self
    }

    /// Enables single-item collapse on import.
    pub fn single_item_mode(mut self, single: bool) -> Self {
        self.single_item_mode = single;
        self
    }

    /// Enables eager representation on insert.
    pub fn check_on_insert(mut self, check: bool) -> Self {
        self.check_on_insert = check;
        self
    }

    /// Selects the sidecar backend by name.
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }
}

/// A named collection of values rendered to one source artifact.
pub struct Archive {
    options: ArchiveOptions,
    registry: RepresenterRegistry,
    backends: BackendRegistry,
    entries: Vec<(String, Value)>,
    store: ArrayStore,
}

impl Archive {
    /// An empty archive with default options.
    pub fn new() -> Self {
        Self::with_options(ArchiveOptions::default())
    }

    /// An empty archive with explicit options.
    pub fn with_options(options: ArchiveOptions) -> Self {
        Self {
            options,
            registry: RepresenterRegistry::new(),
            backends: BackendRegistry::new(),
            entries: Vec::new(),
            store: ArrayStore::new(),
        }
    }

    /// The archive's options.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Registers a representation handler ahead of the built-in ones.
    pub fn register_representer(&mut self, handler: Box<dyn Representer>) {
        self.registry.register_front(handler);
    }

    /// Registers an additional sidecar backend.
    pub fn register_backend(&mut self, backend: Box<dyn SidecarBackend>) {
        self.backends.register(backend);
    }

    /// Names bound so far, in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of top-level bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts one named value.
    ///
    /// Re-inserting the identical value under its existing name is a no-op;
    /// binding an existing name to a different value, a reserved name, or a
    /// name failing the allowed pattern is a [`ArchiveError::NameCollision`].
    pub fn insert_as(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.check_name(name)?;
        if let Some((_, existing)) = self.entries.iter().find(|(n, _)| n == name) {
            if existing.identity_key() == value.identity_key() {
                return Ok(());
            }
            return Err(ArchiveError::NameCollision(format!(
                "name {name:?} already bound to a different value"
            )));
        }
        if self.options.check_on_insert {
            let mut scratch = self.store.clone();
            let mut ctx = ReprContext {
                array_threshold: self.options.array_threshold,
                data_name: &self.options.data_name,
                store: &mut scratch,
            };
            self.registry.represent(&value, &mut ctx)?;
        }
        self.entries.push((name.to_string(), value));
        Ok(())
    }

    /// Inserts several named values in order.
    pub fn insert<'n, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'n str, Value)>,
    {
        for (name, value) in pairs {
            self.insert_as(name, value)?;
        }
        Ok(())
    }

    /// Inserts bypassing the name checks; the data-set controller uses this
    /// for its reserved metadata binding.
    pub(crate) fn insert_reserved(&mut self, name: &str, value: Value) -> Result<()> {
        if self.entries.iter().any(|(n, _)| n == name) {
            return Err(ArchiveError::NameCollision(format!(
                "name {name:?} already bound"
            )));
        }
        self.entries.push((name.to_string(), value));
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.starts_with('_') {
            return Err(ArchiveError::NameCollision(format!(
                "name {name:?} uses the reserved '_' prefix"
            )));
        }
        if name == self.options.data_name {
            return Err(ArchiveError::NameCollision(format!(
                "name {name:?} is the array lookup name"
            )));
        }
        if subst::is_builtin(name) {
            return Err(ArchiveError::NameCollision(format!(
                "name {name:?} would shadow a builtin the emitted source relies on"
            )));
        }
        if !self.options.allowed_name_pattern.is_match(name) {
            return Err(ArchiveError::NameCollision(format!(
                "name {name:?} does not match the allowed pattern {}",
                self.options.allowed_name_pattern.as_str()
            )));
        }
        Ok(())
    }

    /// Renders the archive to source text.
    ///
    /// Two renders of an unchanged archive produce byte-identical output; a
    /// failed render leaves the archive (including its sidecar store) in
    /// its pre-render state.
    pub fn render(&mut self) -> Result<String> {
        self.render_inner(self.options.single_item_mode)
    }

    fn render_inner(&mut self, single_item: bool) -> Result<String> {
        let mut staging = self.store.clone();
        let mut graph = {
            let mut ctx = ReprContext {
                array_threshold: self.options.array_threshold,
                data_name: &self.options.data_name,
                store: &mut staging,
            };
            let mut builder = GraphBuilder::new(&self.registry);
            for (name, value) in &self.entries {
                builder.insert_root(name, value, &mut ctx)?;
            }
            builder.finish()?
        };

        let plan = reduce::reduce(
            &mut graph,
            &ReduceOptions {
                scoped: self.options.scoped,
                robust: self.options.robust_replace,
                data_name: &self.options.data_name,
            },
        )?;
        let text = emit::emit(
            &graph,
            &plan,
            &EmitOptions {
                scoped: self.options.scoped,
                robust: self.options.robust_replace,
                data_name: &self.options.data_name,
                single_item,
            },
        )?;

        debug!(
            bindings = self.entries.len(),
            nodes = graph.len(),
            arrays = staging.len(),
            scoped = self.options.scoped,
            "rendered archive"
        );
        self.store = staging;
        Ok(text)
    }

    /// The sidecar store populated by previous renders.
    pub fn store(&self) -> &ArrayStore {
        &self.store
    }

    /// The configured sidecar backend.
    pub fn backend(&self) -> Result<&dyn SidecarBackend> {
        self.backends.get(&self.options.backend)
    }

    /// Saves the archive under `dir` as module (or package) `name`,
    /// together with its sidecar. See [`crate::packager`] for the layouts.
    pub fn save(&mut self, dir: &Path, name: &str, package: bool, single_item: bool) -> Result<()> {
        let source = self.render_inner(single_item)?;
        packager::save(self, dir, name, package, &source)
    }

    /// Writes only the array sidecar to `dir`, partitioning arrays first if
    /// no render has happened yet.
    pub fn save_data(&mut self, dir: &Path) -> Result<()> {
        self.render_inner(false)?;
        let backend = self.backends.get(&self.options.backend)?;
        self.store.save(dir, backend)
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}
