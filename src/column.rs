//! Column encoding and decoding.
//!
//! [`ColumnCodec`] is the entry point for whole columns: it appends a slice
//! of optional values into the matching appendable vector, freezes it,
//! optimizes it, and keeps an alternate encoding (delta for integers,
//! dictionary for strings) only when that is strictly smaller.
//!
//! Decoding reads the frame and opens the matching vector directly over the
//! caller's bytes; no payload is copied.
//!
//! ```
//! use binvec::{BinaryVector, ColumnCodec};
//!
//! let codec = ColumnCodec::new();
//! let bytes = codec.encode_numeric(&[Some(1i32), None, Some(300), None, Some(-5)]).unwrap();
//!
//! let column = codec.decode_numeric::<i32>(&bytes).unwrap();
//! assert_eq!(column.get(2), Some(300));
//! assert_eq!(column.get(3), None);
//! ```

use tracing::debug;

use crate::bits::{AppendableBoolVector, BoolVector};
use crate::buffer::{ElementType, Region, VectorKind};
use crate::delta::DeltaVector;
use crate::dictionary::DictionaryVector;
use crate::error::VectorError;
use crate::masked::{AppendableMaskedVector, MaskedVector};
use crate::optimizer::optimize;
use crate::primitive::{BinaryVector, Packing, Primitive, PrimitiveVector};
use crate::utf8::{AppendableUtf8Vector, Utf8Vector};
use crate::Result;

/// Which alternate encoding the codec may try.
///
/// The plain (primitive, masked or UTF-8) form is always built; a hinted
/// alternate replaces it only when strictly smaller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingHint {
    /// Try every alternate that applies to the element type.
    #[default]
    Auto,
    /// Never use an alternate.
    Primitive,
    /// Try delta encoding for integer columns.
    Delta,
    /// Try dictionary encoding for string columns.
    Dictionary,
}

impl EncodingHint {
    fn allows_delta(self) -> bool {
        matches!(self, EncodingHint::Auto | EncodingHint::Delta)
    }

    fn allows_dictionary(self) -> bool {
        matches!(self, EncodingHint::Auto | EncodingHint::Dictionary)
    }
}

/// Encoder and decoder for whole columns.
#[derive(Clone, Debug)]
pub struct ColumnCodec {
    hint: EncodingHint,
    optimize: bool,
}

impl Default for ColumnCodec {
    fn default() -> Self {
        ColumnCodec::new()
    }
}

impl ColumnCodec {
    /// A codec that optimizes widths and tries every alternate encoding.
    pub fn new() -> Self {
        ColumnCodec {
            hint: EncodingHint::Auto,
            optimize: true,
        }
    }

    /// Restrict which alternate encodings are tried.
    pub fn with_hint(mut self, hint: EncodingHint) -> Self {
        self.hint = hint;
        self
    }

    /// Turn the bit-width optimizer on or off. When off, numeric columns
    /// keep their natural width and their NA bitmap.
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// The configured hint.
    pub fn hint(&self) -> EncodingHint {
        self.hint
    }

    /// Encode a numeric column.
    ///
    /// # Example
    /// ```
    /// use binvec::{ColumnCodec, EncodingHint, VectorKind};
    ///
    /// let codec = ColumnCodec::new().with_hint(EncodingHint::Primitive);
    /// let bytes = codec.encode_numeric(&[Some(1_000_000i64), Some(1_000_001)]).unwrap();
    /// assert_eq!(codec.metadata(&bytes).unwrap().kind, VectorKind::Primitive);
    /// ```
    pub fn encode_numeric<T: Primitive>(&self, values: &[Option<T>]) -> Result<Vec<u8>> {
        let mut vector = AppendableMaskedVector::<T>::new(values.len());
        for &value in values {
            vector.add_option(value)?;
        }
        let plain = if self.optimize {
            optimize(vector)?.into_bytes()
        } else {
            vector.freeze().into_bytes()
        };

        if !T::NATURAL.is_integer() || !self.hint.allows_delta() {
            return Ok(plain);
        }
        match DeltaVector::encode(values) {
            Ok(delta) => {
                debug!(
                    element = ?T::ELEMENT,
                    plain = plain.len(),
                    delta = delta.encoded_len(),
                    "numeric encoding candidates"
                );
                if delta.encoded_len() < plain.len() {
                    return Ok(delta.into_bytes());
                }
            }
            Err(VectorError::Overflow(reason)) => {
                debug!(%reason, "delta encoding skipped");
            }
            Err(e) => return Err(e),
        }
        Ok(plain)
    }

    /// Encode a boolean column.
    pub fn encode_bools(&self, values: &[Option<bool>]) -> Result<Vec<u8>> {
        let mut vector = AppendableBoolVector::new(values.len());
        for &value in values {
            vector.add_option(value)?;
        }
        Ok(vector.freeze().into_bytes())
    }

    /// Encode a string column.
    ///
    /// # Example
    /// ```
    /// use binvec::{ColumnCodec, VectorKind};
    ///
    /// let codec = ColumnCodec::new();
    /// let values = vec![Some("GET"); 100];
    /// let bytes = codec.encode_strings(&values).unwrap();
    /// assert_eq!(codec.metadata(&bytes).unwrap().kind, VectorKind::Dictionary);
    /// ```
    pub fn encode_strings<S: AsRef<str>>(&self, values: &[Option<S>]) -> Result<Vec<u8>> {
        let data_bytes = values.iter().flatten().map(|s| s.as_ref().len()).sum();
        let mut vector = AppendableUtf8Vector::new(values.len(), data_bytes);
        for value in values {
            vector.add_option(value.as_ref().map(|s| s.as_ref()))?;
        }
        let plain = vector.freeze().into_bytes();

        if !self.hint.allows_dictionary() {
            return Ok(plain);
        }
        let dictionary = DictionaryVector::encode(values)?;
        debug!(
            plain = plain.len(),
            dictionary = dictionary.encoded_len(),
            distinct = dictionary.dictionary().len(),
            "string encoding candidates"
        );
        if dictionary.encoded_len() < plain.len() {
            return Ok(dictionary.into_bytes());
        }
        Ok(plain)
    }

    /// Open any encoded column, dispatching on its frame.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Column<'a>> {
        let frame = Region::new(bytes).frame()?;
        Ok(match frame.element {
            ElementType::Int32 => Column::Int32(self.decode_numeric(bytes)?),
            ElementType::Int64 => Column::Int64(self.decode_numeric(bytes)?),
            ElementType::Float32 => Column::Float32(self.decode_numeric(bytes)?),
            ElementType::Float64 => Column::Float64(self.decode_numeric(bytes)?),
            ElementType::Bool => Column::Bool(self.decode_bools(bytes)?),
            ElementType::Utf8 => Column::Utf8(self.decode_strings(bytes)?),
        })
    }

    /// Open a numeric column of element type `T`.
    pub fn decode_numeric<'a, T: Primitive>(&self, bytes: &'a [u8]) -> Result<NumericColumn<'a, T>> {
        let frame = Region::new(bytes).frame()?;
        if frame.element != T::ELEMENT {
            return Err(VectorError::ElementMismatch {
                expected: T::ELEMENT,
                found: frame.element,
            });
        }
        let region = Region::new(bytes);
        match frame.kind {
            VectorKind::Primitive => Ok(NumericColumn::Primitive(PrimitiveVector::from_region(region)?)),
            VectorKind::Masked => Ok(NumericColumn::Masked(MaskedVector::from_region(region)?)),
            VectorKind::Delta => Ok(NumericColumn::Delta(DeltaVector::from_region(region)?)),
            kind => Err(VectorError::InvalidData(format!(
                "{:?} is not a numeric layout",
                kind
            ))),
        }
    }

    /// Open a boolean column.
    pub fn decode_bools<'a>(&self, bytes: &'a [u8]) -> Result<BoolVector<&'a [u8]>> {
        BoolVector::from_region(Region::new(bytes))
    }

    /// Open a string column.
    pub fn decode_strings<'a>(&self, bytes: &'a [u8]) -> Result<StringColumn<'a>> {
        let frame = Region::new(bytes).frame()?;
        if frame.element != ElementType::Utf8 {
            return Err(VectorError::ElementMismatch {
                expected: ElementType::Utf8,
                found: frame.element,
            });
        }
        let region = Region::new(bytes);
        match frame.kind {
            VectorKind::Utf8 => Ok(StringColumn::Plain(Utf8Vector::from_region(region)?)),
            VectorKind::Dictionary => Ok(StringColumn::Dictionary(DictionaryVector::from_region(region)?)),
            kind => Err(VectorError::InvalidData(format!(
                "{:?} is not a string layout",
                kind
            ))),
        }
    }

    /// Describe an encoded column without materializing its elements.
    pub fn metadata(&self, bytes: &[u8]) -> Result<VectorMetadata> {
        let frame = Region::new(bytes).frame()?;
        let (len, packing, masked) = match self.decode(bytes)? {
            Column::Int32(c) => c.describe(),
            Column::Int64(c) => c.describe(),
            Column::Float32(c) => c.describe(),
            Column::Float64(c) => c.describe(),
            Column::Bool(c) => (c.len(), None, !c.mask().is_all_present()),
            Column::Utf8(StringColumn::Plain(c)) => (c.len(), None, !c.mask().is_all_present()),
            Column::Utf8(StringColumn::Dictionary(c)) => {
                (c.len(), Some(c.code_packing()), !c.mask().is_all_present())
            }
        };
        Ok(VectorMetadata {
            kind: frame.kind,
            element: frame.element,
            len,
            packing,
            masked,
            total_bytes: bytes.len(),
        })
    }
}

/// A decoded numeric column in whichever layout it was stored.
#[derive(Clone, Debug)]
pub enum NumericColumn<'a, T> {
    /// Packed values, nothing missing.
    Primitive(PrimitiveVector<T, &'a [u8]>),
    /// Packed values behind an NA bitmap.
    Masked(MaskedVector<T, &'a [u8]>),
    /// Base plus unsigned deltas.
    Delta(DeltaVector<T, &'a [u8]>),
}

impl<'a, T: Primitive> NumericColumn<'a, T> {
    /// The layout of the stored column.
    pub fn kind(&self) -> VectorKind {
        match self {
            NumericColumn::Primitive(_) => VectorKind::Primitive,
            NumericColumn::Masked(_) => VectorKind::Masked,
            NumericColumn::Delta(_) => VectorKind::Delta,
        }
    }

    /// Packing of the stored values (of the deltas, for delta columns).
    pub fn packing(&self) -> Packing {
        match self {
            NumericColumn::Primitive(v) => v.packing(),
            NumericColumn::Masked(v) => v.packing(),
            NumericColumn::Delta(v) => v.delta_packing(),
        }
    }

    fn describe(&self) -> (usize, Option<Packing>, bool) {
        let masked = match self {
            NumericColumn::Primitive(_) => false,
            NumericColumn::Masked(_) => true,
            NumericColumn::Delta(v) => !v.mask().is_all_present(),
        };
        (self.len(), Some(self.packing()), masked)
    }
}

impl<'a, T: Primitive> BinaryVector<T> for NumericColumn<'a, T> {
    fn len(&self) -> usize {
        match self {
            NumericColumn::Primitive(v) => v.len(),
            NumericColumn::Masked(v) => v.len(),
            NumericColumn::Delta(v) => v.len(),
        }
    }

    fn apply(&self, index: usize) -> T {
        match self {
            NumericColumn::Primitive(v) => v.apply(index),
            NumericColumn::Masked(v) => v.apply(index),
            NumericColumn::Delta(v) => v.apply(index),
        }
    }

    fn is_available(&self, index: usize) -> bool {
        match self {
            NumericColumn::Primitive(v) => v.is_available(index),
            NumericColumn::Masked(v) => v.is_available(index),
            NumericColumn::Delta(v) => v.is_available(index),
        }
    }
}

/// A decoded string column, plain or dictionary encoded.
#[derive(Clone, Debug)]
pub enum StringColumn<'a> {
    /// Offsets and UTF-8 data.
    Plain(Utf8Vector<&'a [u8]>),
    /// Codes into a dictionary of distinct strings.
    Dictionary(DictionaryVector<&'a [u8]>),
}

impl<'a> StringColumn<'a> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            StringColumn::Plain(v) => v.len(),
            StringColumn::Dictionary(v) => v.len(),
        }
    }

    /// Whether the column has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the element at `index` is present.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    pub fn is_available(&self, index: usize) -> bool {
        match self {
            StringColumn::Plain(v) => v.is_available(index),
            StringColumn::Dictionary(v) => v.is_available(index),
        }
    }

    /// The string at `index`; empty if the element is missing.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    pub fn apply(&self, index: usize) -> &str {
        match self {
            StringColumn::Plain(v) => v.apply(index),
            StringColumn::Dictionary(v) => v.apply(index),
        }
    }

    /// The string at `index`, or `None` if it is missing.
    pub fn get(&self, index: usize) -> Option<&str> {
        match self {
            StringColumn::Plain(v) => v.get(index),
            StringColumn::Dictionary(v) => v.get(index),
        }
    }

    /// Iterate over all elements as options.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Any decoded column.
#[derive(Clone, Debug)]
pub enum Column<'a> {
    /// 32-bit integers.
    Int32(NumericColumn<'a, i32>),
    /// 64-bit integers.
    Int64(NumericColumn<'a, i64>),
    /// 32-bit floats.
    Float32(NumericColumn<'a, f32>),
    /// 64-bit floats.
    Float64(NumericColumn<'a, f64>),
    /// Booleans.
    Bool(BoolVector<&'a [u8]>),
    /// Strings.
    Utf8(StringColumn<'a>),
}

impl<'a> Column<'a> {
    /// Logical element type.
    pub fn element(&self) -> ElementType {
        match self {
            Column::Int32(_) => ElementType::Int32,
            Column::Int64(_) => ElementType::Int64,
            Column::Float32(_) => ElementType::Float32,
            Column::Float64(_) => ElementType::Float64,
            Column::Bool(_) => ElementType::Bool,
            Column::Utf8(_) => ElementType::Utf8,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Column::Int32(c) => c.len(),
            Column::Int64(c) => c.len(),
            Column::Float32(c) => c.len(),
            Column::Float64(c) => c.len(),
            Column::Bool(c) => c.len(),
            Column::Utf8(c) => c.len(),
        }
    }

    /// Whether the column has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What an encoded column holds, read from its headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMetadata {
    /// Layout of the body.
    pub kind: VectorKind,
    /// Logical element type.
    pub element: ElementType,
    /// Number of elements.
    pub len: usize,
    /// Packing of values, deltas or dictionary codes; `None` for bitmaps and
    /// plain strings.
    pub packing: Option<Packing>,
    /// Whether an NA bitmap is stored.
    pub masked: bool,
    /// Total size of the encoded column in bytes.
    pub total_bytes: usize,
}

impl VectorMetadata {
    /// Average encoded bytes per element, frame and headers included.
    pub fn bytes_per_element(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.total_bytes as f64 / self.len as f64
        }
    }
}
