//! Writes rendered archives to disk as importable artifacts.
//!
//! Two layouts:
//!
//! - **Single module**: `<dir>/<name>.py` next to a sidecar directory
//!   `<dir>/<name>_arrays/`.
//! - **Package**: `<dir>/<name>/__init__.py` with the sidecar at
//!   `<dir>/<name>/_arrays/`.
//!
//! When the archive carries sidecar arrays, the module text is preceded by
//! the loader boilerplate from [`emit::array_loader`], which resolves the
//! sidecar relative to the module file and binds the ambient array lookup
//! before the archive body runs. The sidecar is written first and the
//! module is renamed into place last, so an importable module never refers
//! to arrays that are not on disk yet.

use std::path::Path;

use tracing::debug;

use crate::api::Archive;
use crate::emit;
use crate::error::{ArchiveError, Result};
use crate::io;

/// Directory-name suffix for a single module's sidecar.
pub const MODULE_SIDECAR_SUFFIX: &str = "_arrays";

/// Sidecar directory name inside a package.
pub const PACKAGE_SIDECAR_DIR: &str = "_arrays";

/// Saves `source` (an already-rendered archive) under `dir`.
pub fn save(archive: &Archive, dir: &Path, name: &str, package: bool, source: &str) -> Result<()> {
    check_module_name(name)?;
    io::ensure_dir(dir)?;

    let (module_path, sidecar_dir, sidecar_rel) = if package {
        let package_dir = dir.join(name);
        io::ensure_dir(&package_dir)?;
        (
            package_dir.join("__init__.py"),
            package_dir.join(PACKAGE_SIDECAR_DIR),
            PACKAGE_SIDECAR_DIR.to_string(),
        )
    } else {
        let sidecar = format!("{name}{MODULE_SIDECAR_SUFFIX}");
        (dir.join(format!("{name}.py")), dir.join(&sidecar), sidecar)
    };

    let mut text = String::new();
    if !archive.store().is_empty() {
        let backend = archive.backend()?;
        archive.store().save(&sidecar_dir, backend)?;
        text.push_str(&emit::array_loader(
            &archive.options().data_name,
            &sidecar_rel,
            backend.name(),
        ));
    }
    text.push_str(source);

    io::write_text_atomic(&module_path, &text)?;
    debug!(module = %module_path.display(), package, "saved archive");
    Ok(())
}

fn check_module_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ArchiveError::NameCollision(format!(
            "{name:?} is not an importable module name"
        )))
    }
}
