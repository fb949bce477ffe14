//! Physical layout of `.npy` sidecar files.
//!
//! The NPY backend promises bit-exact compatibility with the standard NumPy
//! v1.0 format, so the layout is spelled out here rather than left to a
//! dependency.
//!
//! ## File structure
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ Magic (6 bytes): \x93NUMPY                 │
//! ├────────────────────────────────────────────┤
//! │ Version (2 bytes): major=1, minor=0        │
//! ├────────────────────────────────────────────┤
//! │ Header length (u16 LE)                     │
//! ├────────────────────────────────────────────┤
//! │ Header: Python dict literal, space-padded  │
//! │   {'descr': '<f8', 'fortran_order': False, │
//! │    'shape': (3, 4), }                      │
//! ├────────────────────────────────────────────┤
//! │ Payload: C-ordered elements                │
//! └────────────────────────────────────────────┘
//! ```
//!
//! The magic + version + length prefix + header is padded with spaces and
//! terminated by `\n` so the payload starts on a 64-byte boundary, exactly
//! as NumPy writes it. Multi-byte payloads are little-endian (the `<` in the
//! descr).

use regex::Regex;

use crate::array::{DType, NdArray};
use crate::error::{ArchiveError, Result};

/// Magic bytes identifying the format.
pub const MAGIC_BYTES: [u8; 6] = *b"\x93NUMPY";

/// Format version written by this library.
pub const VERSION: (u8, u8) = (1, 0);

/// Payload alignment the header is padded to.
const HEADER_ALIGN: usize = 64;

/// The parsed (or to-be-written) header of an `.npy` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    /// Element descr string, e.g. `<f8`.
    pub descr: String,
    /// Column-major payload flag; this library always writes `false`.
    pub fortran_order: bool,
    /// Array shape.
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Header describing `array`.
    pub fn for_array(array: &NdArray) -> Self {
        Self {
            descr: array.dtype().descr().to_string(),
            fortran_order: false,
            shape: array.shape().to_vec(),
        }
    }

    /// Renders the shape as a Python tuple literal, including the trailing
    /// comma NumPy writes for one-dimensional arrays.
    fn shape_literal(&self) -> String {
        match self.shape.len() {
            0 => "()".to_string(),
            1 => format!("({},)", self.shape[0]),
            _ => format!(
                "({})",
                self.shape
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Serializes magic, version, length prefix and the padded header dict.
    pub fn to_bytes(&self) -> Vec<u8> {
        let dict = format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
            self.descr,
            if self.fortran_order { "True" } else { "False" },
            self.shape_literal(),
        );
        let prefix_len = MAGIC_BYTES.len() + 2 + 2;
        let unpadded = prefix_len + dict.len() + 1;
        let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
        let header_len = dict.len() + padding + 1;

        let mut buf = Vec::with_capacity(prefix_len + header_len);
        buf.extend_from_slice(&MAGIC_BYTES);
        buf.push(VERSION.0);
        buf.push(VERSION.1);
        // Headers this library writes always fit the v1.0 u16 length.
        buf.extend_from_slice(&(header_len as u16).to_le_bytes());
        buf.extend_from_slice(dict.as_bytes());
        buf.extend(std::iter::repeat(b' ').take(padding));
        buf.push(b'\n');
        buf
    }

    /// Parses the header and returns it with the payload offset.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        let corrupt = |msg: &str| ArchiveError::CorruptArchive(format!("npy: {msg}"));

        if bytes.len() < MAGIC_BYTES.len() + 4 {
            return Err(corrupt("file too short for header"));
        }
        if bytes[..MAGIC_BYTES.len()] != MAGIC_BYTES {
            return Err(corrupt("bad magic bytes"));
        }
        let major = bytes[6];
        if major != 1 {
            return Err(corrupt(&format!("unsupported version {major}")));
        }
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let header_end = 10 + header_len;
        if bytes.len() < header_end {
            return Err(corrupt("truncated header"));
        }
        let header = std::str::from_utf8(&bytes[10..header_end])
            .map_err(|_| corrupt("header is not ASCII"))?;

        // The header is a restricted dict literal; a pattern match is
        // sufficient and avoids evaluating anything.
        let re = Regex::new(
            r"'descr'\s*:\s*'([^']+)'\s*,\s*'fortran_order'\s*:\s*(True|False)\s*,\s*'shape'\s*:\s*\(([^)]*)\)",
        )
        .map_err(|e| ArchiveError::Internal(e.to_string()))?;
        let caps = re
            .captures(header)
            .ok_or_else(|| corrupt("unrecognized header dict"))?;

        let descr = caps[1].to_string();
        let fortran_order = &caps[2] == "True";
        let mut shape = Vec::new();
        for part in caps[3].split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            shape.push(
                part.parse::<usize>()
                    .map_err(|_| corrupt("bad shape entry"))?,
            );
        }
        Ok((
            Self {
                descr,
                fortran_order,
                shape,
            },
            header_end,
        ))
    }
}

/// Serializes an array to the full `.npy` byte stream.
pub fn write_npy(array: &NdArray) -> Vec<u8> {
    let header = NpyHeader::for_array(array);
    let mut buf = header.to_bytes();
    buf.extend_from_slice(array.data());
    buf
}

/// Parses a full `.npy` byte stream back into an array.
pub fn read_npy(bytes: &[u8]) -> Result<NdArray> {
    let (header, offset) = NpyHeader::from_bytes(bytes)?;
    if header.fortran_order {
        return Err(ArchiveError::CorruptArchive(
            "npy: fortran-order payloads are not supported".into(),
        ));
    }
    let dtype = DType::from_descr(&header.descr)?;
    NdArray::from_bytes(header.shape, dtype, bytes[offset..].to_vec())
}
