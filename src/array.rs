//! Dense numeric arrays.
//!
//! Only the observable surface of an array library is modeled: shape,
//! element type, element count, and a byte payload that round-trips through
//! the sidecar formats. Data is stored C-ordered and little-endian, which is
//! also what the `.npy` sidecar format writes (see [`crate::format`]).

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;

use crate::error::{ArchiveError, Result};
use crate::value::Value;

/// Element type of an [`NdArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// 8-bit boolean.
    Bool,
    /// Signed integers.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Complex with 64-bit components.
    Complex128,
}

impl DType {
    /// Size in bytes of one element.
    pub fn itemsize(self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 => 8,
            DType::Complex128 => 16,
        }
    }

    /// The NumPy descr string (little-endian where byte order matters).
    pub fn descr(self) -> &'static str {
        match self {
            DType::Bool => "|b1",
            DType::Int8 => "|i1",
            DType::Int16 => "<i2",
            DType::Int32 => "<i4",
            DType::Int64 => "<i8",
            DType::UInt8 => "|u1",
            DType::UInt16 => "<u2",
            DType::UInt32 => "<u4",
            DType::UInt64 => "<u8",
            DType::Float32 => "<f4",
            DType::Float64 => "<f8",
            DType::Complex128 => "<c16",
        }
    }

    /// The spelled-out dtype name used in emitted `array(...)` literals.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex128 => "complex128",
        }
    }

    /// Parses a descr string back into a dtype.
    pub fn from_descr(descr: &str) -> Result<Self> {
        let dtype = match descr {
            "|b1" => DType::Bool,
            "|i1" => DType::Int8,
            "<i2" => DType::Int16,
            "<i4" => DType::Int32,
            "<i8" => DType::Int64,
            "|u1" => DType::UInt8,
            "<u2" => DType::UInt16,
            "<u4" => DType::UInt32,
            "<u8" => DType::UInt64,
            "<f4" => DType::Float32,
            "<f8" => DType::Float64,
            "<c16" => DType::Complex128,
            other => {
                return Err(ArchiveError::CorruptArchive(format!(
                    "unsupported array descr {other:?}"
                )))
            }
        };
        Ok(dtype)
    }

    /// Parses the spelled-out name used in emitted literals.
    pub fn from_name(name: &str) -> Result<Self> {
        let dtype = match name {
            "bool" => DType::Bool,
            "int8" => DType::Int8,
            "int16" => DType::Int16,
            "int32" => DType::Int32,
            "int64" => DType::Int64,
            "uint8" => DType::UInt8,
            "uint16" => DType::UInt16,
            "uint32" => DType::UInt32,
            "uint64" => DType::UInt64,
            "float32" => DType::Float32,
            "float64" => DType::Float64,
            "complex128" => DType::Complex128,
            other => {
                return Err(ArchiveError::Restore(format!(
                    "unsupported dtype name {other:?}"
                )))
            }
        };
        Ok(dtype)
    }
}

#[derive(Debug)]
struct ArrayData {
    shape: Vec<usize>,
    dtype: DType,
    /// C-ordered little-endian payload, `element_count * itemsize` bytes.
    data: Vec<u8>,
}

/// A dense numeric array. Cloning shares the underlying buffer, and that
/// sharing is what the archive's identity rule observes.
#[derive(Clone)]
pub struct NdArray(Arc<ArrayData>);

impl NdArray {
    /// Builds an array from raw little-endian bytes.
    pub fn from_bytes(shape: Vec<usize>, dtype: DType, data: Vec<u8>) -> Result<Self> {
        let count: usize = shape.iter().product();
        if data.len() != count * dtype.itemsize() {
            return Err(ArchiveError::CorruptArchive(format!(
                "array payload is {} bytes, expected {} for shape {:?} dtype {}",
                data.len(),
                count * dtype.itemsize(),
                shape,
                dtype.name()
            )));
        }
        Ok(Self(Arc::new(ArrayData { shape, dtype, data })))
    }

    /// Builds a float64 array.
    pub fn from_f64(shape: Vec<usize>, items: &[f64]) -> Result<Self> {
        let data = items.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(shape, DType::Float64, data)
    }

    /// Builds an int64 array.
    pub fn from_i64(shape: Vec<usize>, items: &[i64]) -> Result<Self> {
        let data = items.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(shape, DType::Int64, data)
    }

    /// Builds a boolean array.
    pub fn from_bool(shape: Vec<usize>, items: &[bool]) -> Result<Self> {
        let data = items.iter().map(|&v| u8::from(v)).collect();
        Self::from_bytes(shape, DType::Bool, data)
    }

    /// Builds a complex128 array.
    pub fn from_c128(shape: Vec<usize>, items: &[Complex64]) -> Result<Self> {
        let data = items
            .iter()
            .flat_map(|c| {
                let mut bytes = [0u8; 16];
                bytes[..8].copy_from_slice(&c.re.to_le_bytes());
                bytes[8..].copy_from_slice(&c.im.to_le_bytes());
                bytes
            })
            .collect();
        Self::from_bytes(shape, DType::Complex128, data)
    }

    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.0.dtype
    }

    /// Total number of elements.
    pub fn element_count(&self) -> usize {
        self.0.shape.iter().product()
    }

    /// Raw little-endian payload.
    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    /// Reads element `i` (flat C-order index) as a [`Value`].
    pub fn element(&self, i: usize) -> Value {
        let size = self.0.dtype.itemsize();
        let bytes = &self.0.data[i * size..(i + 1) * size];
        fn le8(bytes: &[u8]) -> [u8; 8] {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            buf
        }
        match self.0.dtype {
            DType::Bool => Value::Bool(bytes[0] != 0),
            DType::Int8 => Value::Int(bytes[0] as i8 as i64),
            DType::Int16 => {
                Value::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64)
            }
            DType::Int32 => Value::Int(i32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]) as i64),
            DType::Int64 => Value::Int(i64::from_le_bytes(le8(bytes))),
            DType::UInt8 => Value::Int(bytes[0] as i64),
            DType::UInt16 => {
                Value::Int(u16::from_le_bytes([bytes[0], bytes[1]]) as i64)
            }
            DType::UInt32 => Value::Int(u32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]) as i64),
            DType::UInt64 => {
                let v = u64::from_le_bytes(le8(bytes));
                match i64::try_from(v) {
                    Ok(i) => Value::Int(i),
                    Err(_) => Value::BigInt(v.into()),
                }
            }
            DType::Float32 => Value::Float(f32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]) as f64),
            DType::Float64 => Value::Float(f64::from_le_bytes(le8(bytes))),
            DType::Complex128 => Value::Complex(Complex64::new(
                f64::from_le_bytes(le8(&bytes[..8])),
                f64::from_le_bytes(le8(&bytes[8..])),
            )),
        }
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for NdArray {
    fn eq(&self, other: &Self) -> bool {
        self.0.shape == other.0.shape
            && self.0.dtype == other.0.dtype
            && self.0.data == other.0.data
    }
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NdArray(shape={:?}, dtype={})",
            self.0.shape,
            self.0.dtype.name()
        )
    }
}
