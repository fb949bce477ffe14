//! Pluggable sidecar storage backends.
//!
//! A backend materializes the recorded arrays in a directory and reads them
//! back. The NPY backend is always available; the HDF5 backend is compiled
//! in with the `hdf5-backend` cargo feature (it needs the system HDF5
//! library). Backends are looked up by name through [`BackendRegistry`], so
//! additional formats can be registered without touching the engine.

use std::fmt;
use std::fs::File;
use std::path::Path;

use tracing::debug;

use crate::array::NdArray;
use crate::error::{ArchiveError, Result};
use crate::format::{read_npy, write_npy};
use crate::io;

/// Interface for sidecar storage formats.
pub trait SidecarBackend: Send + Sync + fmt::Debug {
    /// The name the archive options select this backend by.
    fn name(&self) -> &'static str;

    /// Writes every `(key, array)` entry under `dir`.
    fn save(&self, dir: &Path, entries: &[(String, NdArray)]) -> Result<()>;

    /// Reads every stored entry from `dir`.
    fn load(&self, dir: &Path) -> Result<Vec<(String, NdArray)>>;
}

// --- NPY (one file per key) ---

/// Stores each array as `<key>.npy` in the standard NumPy v1.0 format.
#[derive(Debug, Clone, Copy)]
pub struct NpyBackend;

impl NpyBackend {
    fn save_entry(dir: &Path, key: &str, array: &NdArray) -> Result<()> {
        io::write_atomic(&dir.join(format!("{key}.npy")), &write_npy(array))
    }
}

impl SidecarBackend for NpyBackend {
    fn name(&self) -> &'static str {
        "npy"
    }

    fn save(&self, dir: &Path, entries: &[(String, NdArray)]) -> Result<()> {
        io::ensure_dir(dir)?;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            entries
                .par_iter()
                .try_for_each(|(key, array)| Self::save_entry(dir, key, array))?;
        }

        #[cfg(not(feature = "parallel"))]
        for (key, array) in entries {
            Self::save_entry(dir, key, array)?;
        }

        debug!(count = entries.len(), dir = %dir.display(), "wrote npy sidecar");
        Ok(())
    }

    fn load(&self, dir: &Path) -> Result<Vec<(String, NdArray)>> {
        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(".npy") {
                names.push(stem.to_string());
            }
        }
        names.sort();

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(format!("{name}.npy"));
            let file = File::open(&path)?;
            // Safety: the mapping is read-only and dropped before this call
            // returns; the sidecar directory is not expected to be mutated
            // concurrently with a load.
            #[allow(unsafe_code)]
            let map = unsafe { memmap2::Mmap::map(&file)? };
            let array = read_npy(&map).map_err(|e| {
                ArchiveError::CorruptArchive(format!("{}: {e}", path.display()))
            })?;
            out.push((name, array));
        }
        Ok(out)
    }
}

// --- HDF5 (single file, one dataset per key) ---

/// Stores every array as a top-level dataset of `arrays.h5`.
#[cfg(feature = "hdf5-backend")]
#[derive(Debug, Clone, Copy)]
pub struct Hdf5Backend;

#[cfg(feature = "hdf5-backend")]
impl SidecarBackend for Hdf5Backend {
    fn name(&self) -> &'static str {
        "hdf5"
    }

    fn save(&self, dir: &Path, entries: &[(String, NdArray)]) -> Result<()> {
        use crate::array::DType;

        io::ensure_dir(dir)?;
        let file = hdf5::File::create(dir.join("arrays.h5"))
            .map_err(|e| ArchiveError::Internal(format!("hdf5 create: {e}")))?;

        fn write_typed<T: hdf5::H5Type>(
            file: &hdf5::File,
            key: &str,
            shape: &[usize],
            items: &[T],
        ) -> Result<()> {
            let ds = file
                .new_dataset::<T>()
                .shape(shape)
                .create(key)
                .map_err(|e| ArchiveError::Internal(format!("hdf5 dataset {key}: {e}")))?;
            ds.write_raw(items)
                .map_err(|e| ArchiveError::Internal(format!("hdf5 write {key}: {e}")))?;
            Ok(())
        }

        fn collect<T: Copy, const N: usize>(
            data: &[u8],
            from_le: impl Fn([u8; N]) -> T,
        ) -> Vec<T> {
            data.chunks_exact(N)
                .map(|chunk| {
                    let mut buf = [0u8; N];
                    buf.copy_from_slice(chunk);
                    from_le(buf)
                })
                .collect()
        }

        for (key, array) in entries {
            let shape = array.shape();
            let data = array.data();
            match array.dtype() {
                DType::Bool | DType::UInt8 => {
                    write_typed::<u8>(&file, key, shape, data)?;
                }
                DType::Int8 => {
                    let items: Vec<i8> = data.iter().map(|&b| b as i8).collect();
                    write_typed(&file, key, shape, &items)?;
                }
                DType::Int16 => {
                    write_typed(&file, key, shape, &collect(data, i16::from_le_bytes))?;
                }
                DType::Int32 => {
                    write_typed(&file, key, shape, &collect(data, i32::from_le_bytes))?;
                }
                DType::Int64 => {
                    write_typed(&file, key, shape, &collect(data, i64::from_le_bytes))?;
                }
                DType::UInt16 => {
                    write_typed(&file, key, shape, &collect(data, u16::from_le_bytes))?;
                }
                DType::UInt32 => {
                    write_typed(&file, key, shape, &collect(data, u32::from_le_bytes))?;
                }
                DType::UInt64 => {
                    write_typed(&file, key, shape, &collect(data, u64::from_le_bytes))?;
                }
                DType::Float32 => {
                    write_typed(&file, key, shape, &collect(data, f32::from_le_bytes))?;
                }
                DType::Float64 | DType::Complex128 => {
                    // Complex payloads store as interleaved float64 pairs
                    // with a trailing axis of 2.
                    let items = collect(data, f64::from_le_bytes);
                    if array.dtype() == DType::Complex128 {
                        let mut shape = shape.to_vec();
                        shape.push(2);
                        write_typed(&file, key, &shape, &items)?;
                    } else {
                        write_typed(&file, key, shape, &items)?;
                    }
                }
            }
        }
        debug!(count = entries.len(), dir = %dir.display(), "wrote hdf5 sidecar");
        Ok(())
    }

    fn load(&self, dir: &Path) -> Result<Vec<(String, NdArray)>> {
        use crate::array::DType;

        let file = hdf5::File::open(dir.join("arrays.h5"))
            .map_err(|e| ArchiveError::CorruptArchive(format!("hdf5 open: {e}")))?;
        let mut out = Vec::new();
        let mut names = file
            .member_names()
            .map_err(|e| ArchiveError::CorruptArchive(format!("hdf5 members: {e}")))?;
        names.sort();
        for name in names {
            let ds = file
                .dataset(&name)
                .map_err(|e| ArchiveError::CorruptArchive(format!("hdf5 {name}: {e}")))?;
            let shape = ds.shape();
            let items: Vec<f64> = ds
                .read_raw()
                .map_err(|e| ArchiveError::CorruptArchive(format!("hdf5 read {name}: {e}")))?;
            let data: Vec<u8> = items.iter().flat_map(|v| v.to_le_bytes()).collect();
            out.push((name, NdArray::from_bytes(shape, DType::Float64, data)?));
        }
        Ok(out)
    }
}

// --- Registry ---

/// Central registry of sidecar backends, queried by name.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Box<dyn SidecarBackend>>,
}

impl BackendRegistry {
    /// Registry with every compiled-in backend.
    pub fn new() -> Self {
        let mut registry = Self {
            backends: Vec::new(),
        };
        registry.register(Box::new(NpyBackend));
        #[cfg(feature = "hdf5-backend")]
        registry.register(Box::new(Hdf5Backend));
        registry
    }

    /// Registers an additional backend.
    pub fn register(&mut self, backend: Box<dyn SidecarBackend>) {
        self.backends.push(backend);
    }

    /// Looks a backend up by name.
    pub fn get(&self, name: &str) -> Result<&dyn SidecarBackend> {
        self.backends
            .iter()
            .map(|b| b.as_ref())
            .find(|b| b.name() == name)
            .ok_or_else(|| {
                ArchiveError::Internal(format!("backend {name:?} is not registered or available"))
            })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
