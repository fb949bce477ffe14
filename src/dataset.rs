//! The data-set controller: a directory of single-item archives plus a
//! metadata module, guarded by an advisory file lock.
//!
//! ## Directory layout (part of the external contract)
//!
//! ```text
//! <dir>/
//!   _this_dir_is_a_DataSet      sentinel marking the directory
//!   __init__.py                 defines `_info_dict` (metadata per key)
//!   <key>.py                    one single-item archive module per key
//!   <key>_arrays/               per-key sidecar for large arrays
//!   _locked                     advisory lock target
//! ```
//!
//! One advisory lock on `_locked` guards the whole directory; metadata
//! updates and per-key operations all go through it, so there is no second
//! lock to order against. Writers hold it exclusively for the whole
//! render → write module → write sidecar → publish sequence; readers take
//! it shared while loading. Acquisition polls until `lock_timeout` and
//! then fails with [`ArchiveError::Busy`], leaving no side effects.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::api::{Archive, ArchiveOptions};
use crate::backend::BackendRegistry;
use crate::error::{ArchiveError, Result};
use crate::io;
use crate::restore;
use crate::sidecar::{self, ArrayMap};
use crate::value::Value;

/// Sentinel file marking a directory as a data set.
pub const SENTINEL: &str = "_this_dir_is_a_DataSet";

/// Name of the advisory lock target.
const LOCK_FILE: &str = "_locked";

/// Metadata binding in `__init__.py`.
const INFO_NAME: &str = "_info_dict";

/// Access mode of a data-set handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Load-only; mutation attempts fail with `ReadOnly`.
    Read,
    /// Read and write; creates the directory if missing.
    Write,
}

/// Configuration for a [`DataSet`].
#[derive(Debug, Clone)]
pub struct DataSetOptions {
    /// Element count at or above which committed arrays go to the per-key
    /// sidecar.
    pub array_threshold: Option<usize>,
    /// Sidecar backend name.
    pub backend: String,
    /// How long lock acquisition may wait before failing with `Busy`.
    pub lock_timeout: Duration,
}

impl Default for DataSetOptions {
    fn default() -> Self {
        Self {
            array_threshold: Some(100),
            backend: "npy".to_string(),
            lock_timeout: Duration::from_secs(60),
        }
    }
}

/// A directory of per-key single-item archives plus metadata.
#[derive(Debug)]
pub struct DataSet {
    dir: PathBuf,
    mode: Mode,
    options: DataSetOptions,
    backends: BackendRegistry,
    info: Vec<(String, Value)>,
}

impl DataSet {
    /// Opens (or, in write mode, creates) the data set at `dir`.
    pub fn open(dir: impl AsRef<Path>, mode: Mode, options: DataSetOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let sentinel = dir.join(SENTINEL);

        if dir.exists() {
            if !sentinel.exists() {
                return Err(ArchiveError::CorruptArchive(format!(
                    "directory {} exists and is not a data set",
                    dir.display()
                )));
            }
        } else if mode == Mode::Write {
            io::ensure_dir(&dir)?;
            fs::write(&sentinel, b"")?;
            debug!(dir = %dir.display(), "created data set");
        } else {
            return Err(ArchiveError::Io(std::sync::Arc::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("data set {} does not exist", dir.display()),
            ))));
        }

        let mut ds = Self {
            dir,
            mode,
            options,
            backends: BackendRegistry::new(),
            info: Vec::new(),
        };
        ds.refresh()?;
        Ok(ds)
    }

    /// The data-set directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys with metadata entries, in stored order.
    pub fn keys(&self) -> Vec<&str> {
        self.info.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// True when `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.info.iter().any(|(k, _)| k == key)
    }

    /// The metadata stored for `key`.
    pub fn info(&self, key: &str) -> Option<&Value> {
        self.info.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Reloads the metadata dict from disk under a shared lock.
    pub fn refresh(&mut self) -> Result<()> {
        let _lock = self.lock(true)?;
        self.load_info_locked()
    }

    /// Stores metadata for `key` and rewrites the metadata module.
    pub fn set_info(&mut self, key: &str, info: Value) -> Result<()> {
        self.check_writable()?;
        check_key(key)?;
        let _lock = self.lock(false)?;
        self.load_info_locked()?;
        match self.info.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = info,
            None => self.info.push((key.to_string(), info)),
        }
        self.write_info_locked()
    }

    /// Renders `value` as the single-item archive for `key` and publishes
    /// it, together with its sidecar, under the exclusive directory lock.
    pub fn commit(&mut self, key: &str, value: Value) -> Result<()> {
        self.check_writable()?;
        check_key(key)?;
        let _lock = self.lock(false)?;

        let mut archive_options = ArchiveOptions::default()
            .backend(self.options.backend.clone())
            .single_item_mode(true);
        if let Some(threshold) = self.options.array_threshold {
            archive_options = archive_options.array_threshold(threshold);
        }
        let mut archive = Archive::with_options(archive_options);
        archive.insert_as(key, value)?;
        archive.save(&self.dir, key, false, true)?;

        self.load_info_locked()?;
        if !self.info.iter().any(|(k, _)| k == key) {
            self.info.push((key.to_string(), Value::None));
            self.write_info_locked()?;
        }
        debug!(key, dir = %self.dir.display(), "committed data-set entry");
        Ok(())
    }

    /// Loads the value stored under `key`. Takes a shared lock; arrays are
    /// read from the per-key sidecar only here, on access.
    pub fn get(&self, key: &str) -> Result<Value> {
        check_key(key)?;
        let _lock = self.lock(true)?;

        let module = self.dir.join(format!("{key}.py"));
        let source = fs::read_to_string(&module)?;
        let body = restore::strip_loader(&source);

        let sidecar_dir = self.dir.join(format!("{key}_arrays"));
        let arrays: ArrayMap = if sidecar_dir.is_dir() {
            let backend = self.backends.get(&self.options.backend)?;
            sidecar::load(&sidecar_dir, backend)?
        } else {
            ArrayMap::new()
        };

        let namespace = restore::restore_with(body, &arrays, "_arrays")?;
        namespace.get(key).cloned().ok_or_else(|| {
            ArchiveError::CorruptArchive(format!(
                "module {} does not bind {key:?}",
                module.display()
            ))
        })
    }

    fn check_writable(&self) -> Result<()> {
        if self.mode == Mode::Read {
            return Err(ArchiveError::ReadOnly(format!(
                "data set {} was opened read-only",
                self.dir.display()
            )));
        }
        Ok(())
    }

    fn lock(&self, shared: bool) -> Result<DirLock> {
        DirLock::acquire(
            &self.dir.join(LOCK_FILE),
            self.options.lock_timeout,
            shared,
        )
    }

    fn load_info_locked(&mut self) -> Result<()> {
        let init = self.dir.join("__init__.py");
        if !init.exists() {
            self.info.clear();
            return Ok(());
        }
        let source = fs::read_to_string(&init)?;
        let namespace = restore::restore(&source)?;
        let Some(Value::Dict(dict)) = namespace.get(INFO_NAME) else {
            return Err(ArchiveError::CorruptArchive(format!(
                "{} does not define {INFO_NAME}",
                init.display()
            )));
        };
        let mut info = Vec::new();
        for (key, value) in dict.snapshot() {
            let Value::Str(key) = key else {
                return Err(ArchiveError::CorruptArchive(
                    "metadata keys must be strings".into(),
                ));
            };
            info.push((key.to_string(), value));
        }
        self.info = info;
        Ok(())
    }

    fn write_info_locked(&self) -> Result<()> {
        let entries: Vec<(Value, Value)> = self
            .info
            .iter()
            .map(|(k, v)| (Value::str(k.clone()), v.clone()))
            .collect();
        // Metadata stays flat so the module is readable at a glance and
        // defines nothing beyond the dict.
        let mut archive = Archive::with_options(ArchiveOptions::default().scoped(false));
        archive.insert_reserved(INFO_NAME, Value::dict(entries))?;
        let source = archive.render()?;
        io::write_text_atomic(&self.dir.join("__init__.py"), &source)
    }
}

fn check_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ArchiveError::NameCollision(format!(
            "{key:?} is not a valid data-set key"
        )))
    }
}

/// An acquired advisory lock on the data-set directory. Dropping the guard
/// releases the lock.
struct DirLock {
    file: File,
}

impl DirLock {
    fn acquire(path: &Path, timeout: Duration, shared: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        let deadline = Instant::now() + timeout;
        loop {
            let attempt = if shared {
                file.try_lock_shared()
            } else {
                file.try_lock()
            };
            match attempt {
                Ok(()) => return Ok(Self { file }),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(ArchiveError::Busy(format!(
                            "could not {} lock {} within {timeout:?}",
                            if shared { "share" } else { "exclusively" },
                            path.display()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(TryLockError::Error(err)) => return Err(err.into()),
            }
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!("failed to release data-set lock: {err}");
        }
    }
}
