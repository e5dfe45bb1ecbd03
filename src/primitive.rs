//! Primitive binary vectors.
//!
//! A primitive vector is a run of fixed-width little-endian scalars behind a
//! 3-byte header:
//!
//! ```text
//! [2B bitWidth][1B variant][payload ...]
//! ```
//!
//! The logical length is never stored; it is `payload bytes * 8 / bitWidth`,
//! which is exact because the width is always 8, 16, 32 or 64 bits.
//!
//! Reading and writing are separate types. [`AppendablePrimitiveVector`]
//! owns a region pre-sized for a declared capacity and advances a write
//! cursor; [`freeze`](AppendablePrimitiveVector::freeze) consumes it and
//! hands the same allocation to an immutable [`PrimitiveVector`].

use std::fmt;
use std::marker::PhantomData;

use tracing::trace;

use crate::buffer::{read_raw, read_u16, write_raw, ElementType, Frame, Region, VectorKind, FRAME_LEN};
use crate::error::VectorError;
use crate::Result;

/// Size of the primitive header in bytes.
pub const PRIMITIVE_HEADER_LEN: usize = 3;

/// Number of bits used per packed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BitWidth {
    /// One byte per element.
    W8,
    /// Two bytes per element.
    W16,
    /// Four bytes per element.
    W32,
    /// Eight bytes per element.
    W64,
}

impl BitWidth {
    /// Width in bits.
    #[inline]
    pub fn bits(self) -> u16 {
        match self {
            BitWidth::W8 => 8,
            BitWidth::W16 => 16,
            BitWidth::W32 => 32,
            BitWidth::W64 => 64,
        }
    }

    /// Width in bytes.
    #[inline]
    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Parse a header width field.
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(BitWidth::W8),
            16 => Ok(BitWidth::W16),
            32 => Ok(BitWidth::W32),
            64 => Ok(BitWidth::W64),
            other => Err(VectorError::UnsupportedWidth(other)),
        }
    }

    #[inline]
    fn mask(self) -> u64 {
        match self {
            BitWidth::W64 => u64::MAX,
            w => (1u64 << w.bits()) - 1,
        }
    }
}

/// How the packed bits of an element are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Variant {
    /// Zero-extended integer.
    Unsigned = 0,
    /// Sign-extended two's complement integer.
    Signed = 1,
    /// IEEE 754 float of the full width.
    Float = 2,
}

impl Variant {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Variant::Unsigned),
            1 => Some(Variant::Signed),
            2 => Some(Variant::Float),
            _ => None,
        }
    }
}

/// Bit width plus variant: everything needed to read one packed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packing {
    /// Bits per element.
    pub width: BitWidth,
    /// Interpretation of those bits.
    pub variant: Variant,
}

impl Packing {
    /// 8-bit unsigned.
    pub const U8: Packing = Packing::new(BitWidth::W8, Variant::Unsigned);
    /// 8-bit signed.
    pub const I8: Packing = Packing::new(BitWidth::W8, Variant::Signed);
    /// 16-bit unsigned.
    pub const U16: Packing = Packing::new(BitWidth::W16, Variant::Unsigned);
    /// 16-bit signed.
    pub const I16: Packing = Packing::new(BitWidth::W16, Variant::Signed);
    /// 32-bit unsigned.
    pub const U32: Packing = Packing::new(BitWidth::W32, Variant::Unsigned);
    /// 32-bit signed.
    pub const I32: Packing = Packing::new(BitWidth::W32, Variant::Signed);
    /// 64-bit signed.
    pub const I64: Packing = Packing::new(BitWidth::W64, Variant::Signed);
    /// 32-bit float.
    pub const F32: Packing = Packing::new(BitWidth::W32, Variant::Float);
    /// 64-bit float.
    pub const F64: Packing = Packing::new(BitWidth::W64, Variant::Float);

    /// Create a packing from its parts.
    pub const fn new(width: BitWidth, variant: Variant) -> Self {
        Packing { width, variant }
    }

    /// Whether this packing holds integers.
    #[inline]
    pub fn is_integer(self) -> bool {
        self.variant != Variant::Float
    }

    /// Inclusive integer range representable by this packing.
    pub fn range(self) -> Option<(i64, i64)> {
        let bits = self.width.bits() as u32;
        match self.variant {
            Variant::Float => None,
            Variant::Unsigned if bits == 64 => Some((0, i64::MAX)),
            Variant::Unsigned => Some((0, (1i64 << bits) - 1)),
            Variant::Signed if bits == 64 => Some((i64::MIN, i64::MAX)),
            Variant::Signed => Some((-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)),
        }
    }

    /// Whether `value` is representable by this packing.
    #[inline]
    pub fn fits(self, value: i64) -> bool {
        match self.range() {
            Some((min, max)) => min <= value && value <= max,
            None => false,
        }
    }

    /// Smallest integer packing that holds every value in `range`.
    ///
    /// Narrower widths win, then unsigned over signed. `None` (no values)
    /// selects the narrowest packing. The result never exceeds `natural`:
    /// once a candidate is as wide as the element type itself, the element's
    /// own packing is used.
    pub fn narrowest(range: Option<(i64, i64)>, natural: Packing) -> Packing {
        const LADDER: [Packing; 6] = [
            Packing::U8,
            Packing::I8,
            Packing::U16,
            Packing::I16,
            Packing::U32,
            Packing::I32,
        ];
        let (min, max) = match range {
            Some(r) => r,
            None => return Packing::U8,
        };
        for candidate in LADDER {
            if candidate.width >= natural.width {
                break;
            }
            if candidate.fits(min) && candidate.fits(max) {
                return candidate;
            }
        }
        natural
    }
}

impl fmt::Display for Packing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self.variant {
            Variant::Unsigned => "unsigned",
            Variant::Signed => "signed",
            Variant::Float => "float",
        };
        write!(f, "{}-bit {}", self.width.bits(), variant)
    }
}

#[inline]
fn sign_extend(raw: u64, width: BitWidth) -> i64 {
    let shift = 64 - width.bits() as u32;
    ((raw << shift) as i64) >> shift
}

/// A scalar type that can be stored in a primitive vector.
pub trait Primitive: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Element type recorded in the frame.
    const ELEMENT: ElementType;

    /// Packing used when no narrower one is chosen.
    const NATURAL: Packing;

    /// Whether values of this type can be stored with `packing`.
    fn supports(packing: Packing) -> bool;

    /// Pack into the low bits of a `u64`, failing if the value does not fit.
    fn pack(self, packing: Packing) -> Result<u64>;

    /// Unpack from zero-extended raw bits.
    fn unpack(raw: u64, packing: Packing) -> Self;

    /// The value as an integer, or `None` for floats.
    fn as_i64(self) -> Option<i64>;

    /// Convert back from an integer computed by a codec.
    fn from_i64(value: i64) -> Self;
}

macro_rules! impl_integer {
    ($t:ty, $element:expr, $natural:expr) => {
        impl Primitive for $t {
            const ELEMENT: ElementType = $element;
            const NATURAL: Packing = $natural;

            #[inline]
            fn supports(packing: Packing) -> bool {
                packing.is_integer() && (packing.width < Self::NATURAL.width || packing == Self::NATURAL)
            }

            #[inline]
            fn pack(self, packing: Packing) -> Result<u64> {
                let value = self as i64;
                if !packing.fits(value) {
                    return Err(VectorError::Overflow(format!(
                        "{} does not fit {}",
                        value, packing
                    )));
                }
                Ok((value as u64) & packing.width.mask())
            }

            #[inline]
            fn unpack(raw: u64, packing: Packing) -> Self {
                match packing.variant {
                    Variant::Signed => sign_extend(raw, packing.width) as $t,
                    _ => raw as $t,
                }
            }

            #[inline]
            fn as_i64(self) -> Option<i64> {
                Some(self as i64)
            }

            #[inline]
            fn from_i64(value: i64) -> Self {
                value as $t
            }
        }
    };
}

impl_integer!(i32, ElementType::Int32, Packing::I32);
impl_integer!(i64, ElementType::Int64, Packing::I64);

macro_rules! impl_float {
    ($t:ty, $bits:ty, $element:expr, $natural:expr) => {
        impl Primitive for $t {
            const ELEMENT: ElementType = $element;
            const NATURAL: Packing = $natural;

            #[inline]
            fn supports(packing: Packing) -> bool {
                packing == Self::NATURAL
            }

            #[inline]
            fn pack(self, packing: Packing) -> Result<u64> {
                if packing != Self::NATURAL {
                    return Err(VectorError::Overflow(format!(
                        "{} cannot be packed as {}",
                        stringify!($t),
                        packing
                    )));
                }
                Ok(self.to_bits() as u64)
            }

            #[inline]
            fn unpack(raw: u64, _packing: Packing) -> Self {
                <$t>::from_bits(raw as $bits)
            }

            #[inline]
            fn as_i64(self) -> Option<i64> {
                None
            }

            #[inline]
            fn from_i64(value: i64) -> Self {
                value as $t
            }
        }
    };
}

impl_float!(f32, u32, ElementType::Float32, Packing::F32);
impl_float!(f64, u64, ElementType::Float64, Packing::F64);

/// Read access shared by every scalar vector, whatever its encoding.
pub trait BinaryVector<T> {
    /// Number of logical elements.
    fn len(&self) -> usize;

    /// Whether the vector has no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`. A missing element reads as the encoding's
    /// placeholder (zero), so check [`is_available`](Self::is_available)
    /// or use [`get`](Self::get).
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    fn apply(&self, index: usize) -> T;

    /// Whether the element at `index` is present.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    fn is_available(&self, index: usize) -> bool {
        assert!(
            index < self.len(),
            "index {} out of bounds for vector of length {}",
            index,
            self.len()
        );
        true
    }

    /// The element at `index`, or `None` if it is missing.
    fn get(&self, index: usize) -> Option<T> {
        if self.is_available(index) {
            Some(self.apply(index))
        } else {
            None
        }
    }

    /// Iterate over all elements as options.
    fn options(&self) -> Options<'_, Self, T> {
        Options {
            vector: self,
            index: 0,
            _marker: PhantomData,
        }
    }
}

/// Iterator returned by [`BinaryVector::options`].
pub struct Options<'a, V: ?Sized, T> {
    vector: &'a V,
    index: usize,
    _marker: PhantomData<T>,
}

impl<'a, V: BinaryVector<T> + ?Sized, T> Iterator for Options<'a, V, T> {
    type Item = Option<T>;

    fn next(&mut self) -> Option<Option<T>> {
        if self.index >= self.vector.len() {
            return None;
        }
        let item = self.vector.get(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

/// Position and shape of a primitive body inside a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PrimitiveLayout {
    pub payload: usize,
    pub len: usize,
    pub packing: Packing,
}

impl PrimitiveLayout {
    /// Parse the primitive body spanning `start..end`.
    pub fn parse(bytes: &[u8], start: usize, end: usize) -> Result<Self> {
        if end > bytes.len() || start + PRIMITIVE_HEADER_LEN > end {
            return Err(VectorError::InvalidData(format!(
                "primitive vector at {}..{} does not fit its header",
                start, end
            )));
        }
        let width = BitWidth::from_bits(read_u16(bytes, start)?)?;
        let variant = Variant::from_byte(bytes[start + 2])
            .ok_or_else(|| VectorError::InvalidData(format!("unknown variant {}", bytes[start + 2])))?;
        if variant == Variant::Float && width < BitWidth::W32 {
            return Err(VectorError::InvalidData(format!(
                "{}-bit floats are not supported",
                width.bits()
            )));
        }
        let payload = start + PRIMITIVE_HEADER_LEN;
        let payload_bytes = end - payload;
        if payload_bytes % width.bytes() != 0 {
            return Err(VectorError::InvalidData(format!(
                "{} payload bytes is not a whole number of {}-bit elements",
                payload_bytes,
                width.bits()
            )));
        }
        Ok(PrimitiveLayout {
            payload,
            len: payload_bytes * 8 / width.bits() as usize,
            packing: Packing::new(width, variant),
        })
    }

    pub fn write_header(bytes: &mut [u8], start: usize, packing: Packing) {
        write_raw(bytes, start, 2, packing.width.bits() as u64);
        bytes[start + 2] = packing.variant as u8;
    }

    #[inline]
    pub fn raw(&self, bytes: &[u8], index: usize) -> u64 {
        let width = self.packing.width.bytes();
        read_raw(bytes, self.payload + index * width, width)
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.payload - PRIMITIVE_HEADER_LEN
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.payload + self.len * self.packing.width.bytes()
    }
}

/// Write cursor over a primitive body pre-sized for `capacity` elements.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PrimitiveWriter {
    pub start: usize,
    pub packing: Packing,
    pub capacity: usize,
    pub len: usize,
}

impl PrimitiveWriter {
    pub fn body_bytes(packing: Packing, capacity: usize) -> usize {
        PRIMITIVE_HEADER_LEN + capacity * packing.width.bytes()
    }

    pub fn init(bytes: &mut [u8], start: usize, packing: Packing, capacity: usize) -> Self {
        PrimitiveLayout::write_header(bytes, start, packing);
        PrimitiveWriter {
            start,
            packing,
            capacity,
            len: 0,
        }
    }

    #[inline]
    pub fn payload(&self) -> usize {
        self.start + PRIMITIVE_HEADER_LEN
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.payload() + self.len * self.packing.width.bytes()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.len
    }

    #[inline]
    pub fn ensure(&self, requested: usize) -> Result<()> {
        if requested > self.remaining() {
            return Err(VectorError::CapacityExceeded {
                requested,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn push(&mut self, bytes: &mut [u8], raw: u64) -> Result<()> {
        self.ensure(1)?;
        write_raw(bytes, self.end(), self.packing.width.bytes(), raw);
        self.len += 1;
        Ok(())
    }

    /// Append `count` elements already packed with this writer's packing.
    pub fn push_packed(&mut self, bytes: &mut [u8], packed: &[u8], count: usize) -> Result<()> {
        self.ensure(count)?;
        let end = self.end();
        bytes[end..end + packed.len()].copy_from_slice(packed);
        self.len += count;
        Ok(())
    }

    #[inline]
    pub fn layout(&self) -> PrimitiveLayout {
        PrimitiveLayout {
            payload: self.payload(),
            len: self.len,
            packing: self.packing,
        }
    }
}

/// An immutable vector of packed scalars.
///
/// `B` is the storage: `Vec<u8>` for a vector produced by `freeze`, `&[u8]`
/// for a zero-copy view over someone else's bytes.
#[derive(Clone, Debug)]
pub struct PrimitiveVector<T, B = Vec<u8>> {
    region: Region<B>,
    layout: PrimitiveLayout,
    _marker: PhantomData<T>,
}

impl<T: Primitive, B: AsRef<[u8]>> PrimitiveVector<T, B> {
    /// Open a framed primitive vector, validating its headers.
    pub fn from_region(region: Region<B>) -> Result<Self> {
        region.frame()?.expect(VectorKind::Primitive, T::ELEMENT)?;
        let layout = PrimitiveLayout::parse(region.as_slice(), FRAME_LEN, region.len())?;
        if !T::supports(layout.packing) {
            return Err(VectorError::InvalidData(format!(
                "{:?} vector cannot be stored as {}",
                T::ELEMENT,
                layout.packing
            )));
        }
        Ok(PrimitiveVector::from_parts(region, layout))
    }

    pub(crate) fn from_parts(region: Region<B>, layout: PrimitiveLayout) -> Self {
        PrimitiveVector {
            region,
            layout,
            _marker: PhantomData,
        }
    }

    /// Width and variant of the packed elements.
    pub fn packing(&self) -> Packing {
        self.layout.packing
    }

    /// The encoded bytes, frame included.
    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Size of the encoded vector in bytes.
    pub fn encoded_len(&self) -> usize {
        self.region.len()
    }

    /// The packed payload, without headers.
    pub(crate) fn payload(&self) -> &[u8] {
        &self.region.as_slice()[self.layout.payload..self.layout.end()]
    }

    /// Iterate over the elements.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.layout.len).map(move |i| self.apply(i))
    }
}

impl<T> PrimitiveVector<T, Vec<u8>> {
    /// Consume the vector and return its encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.region.into_vec()
    }
}

impl<T: Primitive, B: AsRef<[u8]>> BinaryVector<T> for PrimitiveVector<T, B> {
    #[inline]
    fn len(&self) -> usize {
        self.layout.len
    }

    #[inline]
    fn apply(&self, index: usize) -> T {
        assert!(
            index < self.layout.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.layout.len
        );
        T::unpack(self.layout.raw(self.region.as_slice(), index), self.layout.packing)
    }
}

/// A primitive vector under construction.
///
/// The region is sized for `max_elements` up front and never grows;
/// appending past that is [`VectorError::CapacityExceeded`].
#[derive(Debug)]
pub struct AppendablePrimitiveVector<T> {
    region: Region<Vec<u8>>,
    writer: PrimitiveWriter,
    _marker: PhantomData<T>,
}

impl<T: Primitive> AppendablePrimitiveVector<T> {
    /// Create a vector for up to `max_elements` values at the type's natural width.
    pub fn new(max_elements: usize) -> Self {
        Self::allocate(max_elements, T::NATURAL)
    }

    /// Create a vector for up to `max_elements` values stored with `packing`.
    pub fn with_packing(max_elements: usize, packing: Packing) -> Result<Self> {
        if !T::supports(packing) {
            return Err(VectorError::Overflow(format!(
                "{:?} values cannot be packed as {}",
                T::ELEMENT,
                packing
            )));
        }
        Ok(Self::allocate(max_elements, packing))
    }

    fn allocate(max_elements: usize, packing: Packing) -> Self {
        let mut region = Region::allocate(
            PrimitiveWriter::body_bytes(packing, max_elements),
            Frame::new(VectorKind::Primitive, T::ELEMENT),
        );
        let writer = PrimitiveWriter::init(region.as_mut_slice(), FRAME_LEN, packing, max_elements);
        AppendablePrimitiveVector {
            region,
            writer,
            _marker: PhantomData,
        }
    }

    /// Append one value.
    pub fn add_value(&mut self, value: T) -> Result<()> {
        self.writer.ensure(1)?;
        let raw = value.pack(self.writer.packing)?;
        self.writer.push(self.region.as_mut_slice(), raw)
    }

    /// Append every element of `other`.
    ///
    /// Capacity is checked before anything is written. When `other` has the
    /// same packing its payload is copied in one block; otherwise every
    /// element is repacked, and all of them are validated first.
    pub fn add_vector<B: AsRef<[u8]>>(&mut self, other: &PrimitiveVector<T, B>) -> Result<()> {
        let count = other.len();
        self.writer.ensure(count)?;
        if other.packing() == self.writer.packing {
            return self
                .writer
                .push_packed(self.region.as_mut_slice(), other.payload(), count);
        }
        let packing = self.writer.packing;
        let raws = other
            .iter()
            .map(|v| v.pack(packing))
            .collect::<Result<Vec<u64>>>()?;
        for raw in raws {
            self.writer.push(self.region.as_mut_slice(), raw)?;
        }
        Ok(())
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.writer.capacity
    }

    /// Elements that can still be appended.
    pub fn remaining(&self) -> usize {
        self.writer.remaining()
    }

    /// Width and variant elements are packed with.
    pub fn packing(&self) -> Packing {
        self.writer.packing
    }

    /// The backing bytes, including unused capacity.
    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Finish appending: drop unused capacity and return the immutable
    /// vector over the same allocation.
    pub fn freeze(mut self) -> PrimitiveVector<T> {
        let end = self.writer.end();
        trace!(len = self.writer.len, capacity = self.writer.capacity, bytes = end, "freeze primitive vector");
        self.region.truncate(end);
        PrimitiveVector::from_parts(self.region, self.writer.layout())
    }
}

impl<T: Primitive> BinaryVector<T> for AppendablePrimitiveVector<T> {
    #[inline]
    fn len(&self) -> usize {
        self.writer.len
    }

    fn apply(&self, index: usize) -> T {
        assert!(
            index < self.writer.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.writer.len
        );
        T::unpack(
            self.writer.layout().raw(self.region.as_slice(), index),
            self.writer.packing,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen(values: &[i32], packing: Packing) -> PrimitiveVector<i32> {
        let mut v = AppendablePrimitiveVector::<i32>::with_packing(values.len(), packing).unwrap();
        for &x in values {
            v.add_value(x).unwrap();
        }
        v.freeze()
    }

    #[test]
    fn test_append_and_read() {
        let mut v = AppendablePrimitiveVector::<i32>::new(4);
        v.add_value(7).unwrap();
        v.add_value(-3).unwrap();
        v.add_value(i32::MAX).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v.apply(1), -3);

        let frozen = v.freeze();
        assert_eq!(frozen.len(), 3);
        assert_eq!(frozen.iter().collect::<Vec<_>>(), vec![7, -3, i32::MAX]);
        assert_eq!(frozen.encoded_len(), FRAME_LEN + PRIMITIVE_HEADER_LEN + 12);
    }

    #[test]
    fn test_header_layout() {
        let v = frozen(&[1, 2], Packing::I16);
        let bytes = v.as_bytes();
        assert_eq!(&bytes[FRAME_LEN..FRAME_LEN + 3], &[16, 0, 1]);
        assert_eq!(&bytes[FRAME_LEN + 3..], &[1, 0, 2, 0]);
    }

    #[test]
    fn test_signed_vs_unsigned_extension() {
        let signed = frozen(&[-1, 127, -128], Packing::I8);
        assert_eq!(signed.iter().collect::<Vec<_>>(), vec![-1, 127, -128]);

        let unsigned = frozen(&[255, 0, 128], Packing::U8);
        assert_eq!(unsigned.iter().collect::<Vec<_>>(), vec![255, 0, 128]);

        // same payload bytes, different flag
        assert_eq!(signed.payload()[0], unsigned.payload()[0]);
    }

    #[test]
    fn test_sixteen_bit_signed() {
        let v = frozen(&[-32768, 32767, 300, -5], Packing::I16);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![-32768, 32767, 300, -5]);
    }

    #[test]
    fn test_capacity_enforcement() {
        let mut v = AppendablePrimitiveVector::<i64>::new(2);
        v.add_value(1).unwrap();
        v.add_value(2).unwrap();
        let before = v.as_bytes().to_vec();
        assert_eq!(
            v.add_value(3),
            Err(VectorError::CapacityExceeded { requested: 1, available: 0 })
        );
        assert_eq!(v.len(), 2);
        assert_eq!(v.as_bytes(), &before[..]);
    }

    #[test]
    fn test_overflow_rejected_before_write() {
        let mut v = AppendablePrimitiveVector::<i32>::with_packing(4, Packing::U8).unwrap();
        v.add_value(200).unwrap();
        assert!(matches!(v.add_value(256), Err(VectorError::Overflow(_))));
        assert!(matches!(v.add_value(-1), Err(VectorError::Overflow(_))));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn test_unsupported_packing() {
        assert!(AppendablePrimitiveVector::<i32>::with_packing(4, Packing::I64).is_err());
        assert!(AppendablePrimitiveVector::<f64>::with_packing(4, Packing::F32).is_err());
        assert!(AppendablePrimitiveVector::<i32>::with_packing(4, Packing::U32).is_err());
        assert!(AppendablePrimitiveVector::<i64>::with_packing(4, Packing::U32).is_ok());
    }

    #[test]
    fn test_freeze_keeps_allocation() {
        let mut v = AppendablePrimitiveVector::<i32>::new(100);
        v.add_value(1).unwrap();
        let ptr = v.as_bytes().as_ptr();
        let frozen = v.freeze();
        assert_eq!(frozen.as_bytes().as_ptr(), ptr);
        assert_eq!(frozen.encoded_len(), FRAME_LEN + PRIMITIVE_HEADER_LEN + 4);
    }

    #[test]
    fn test_add_vector_same_packing() {
        let src = frozen(&[1, 2, 3], Packing::I32);
        let mut v = AppendablePrimitiveVector::<i32>::new(5);
        v.add_value(0).unwrap();
        v.add_vector(&src).unwrap();
        assert_eq!(v.freeze().iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_add_vector_repacks() {
        let src = frozen(&[1, -2, 3], Packing::I8);
        let mut v = AppendablePrimitiveVector::<i32>::new(3);
        v.add_vector(&src).unwrap();
        let out = v.freeze();
        assert_eq!(out.packing(), Packing::I32);
        assert_eq!(out.iter().collect::<Vec<_>>(), vec![1, -2, 3]);
    }

    #[test]
    fn test_add_vector_checks_capacity_up_front() {
        let src = frozen(&[1, 2, 3], Packing::I32);
        let mut v = AppendablePrimitiveVector::<i32>::new(2);
        assert_eq!(
            v.add_vector(&src),
            Err(VectorError::CapacityExceeded { requested: 3, available: 2 })
        );
        assert_eq!(v.len(), 0);
    }

    #[test]
    fn test_add_vector_validates_before_write() {
        let src = frozen(&[1, 300, 3], Packing::I16);
        let mut v = AppendablePrimitiveVector::<i32>::with_packing(3, Packing::U8).unwrap();
        assert!(matches!(v.add_vector(&src), Err(VectorError::Overflow(_))));
        assert_eq!(v.len(), 0);
    }

    #[test]
    fn test_floats() {
        let mut v = AppendablePrimitiveVector::<f64>::new(3);
        v.add_value(1.5).unwrap();
        v.add_value(-0.25).unwrap();
        v.add_value(f64::INFINITY).unwrap();
        let out = v.freeze();
        assert_eq!(out.iter().collect::<Vec<_>>(), vec![1.5, -0.25, f64::INFINITY]);

        let mut v = AppendablePrimitiveVector::<f32>::new(1);
        v.add_value(3.25).unwrap();
        assert_eq!(v.freeze().apply(0), 3.25);
    }

    #[test]
    fn test_from_region_roundtrip() {
        let bytes = frozen(&[10, 20, 30], Packing::U8).into_bytes();
        let view = PrimitiveVector::<i32, &[u8]>::from_region(Region::new(&bytes[..])).unwrap();
        assert_eq!(view.packing(), Packing::U8);
        assert_eq!(view.options().collect::<Vec<_>>(), vec![Some(10), Some(20), Some(30)]);

        assert!(matches!(
            PrimitiveVector::<i64, &[u8]>::from_region(Region::new(&bytes[..])),
            Err(VectorError::ElementMismatch { .. })
        ));
    }

    #[test]
    fn test_from_region_rejects_fractional_payload() {
        let mut bytes = frozen(&[1, 2], Packing::I16).into_bytes();
        bytes.pop();
        assert!(matches!(
            PrimitiveVector::<i32, &[u8]>::from_region(Region::new(&bytes[..])),
            Err(VectorError::InvalidData(_))
        ));
    }

    #[test]
    fn test_from_region_rejects_bad_width() {
        let mut bytes = frozen(&[1, 2], Packing::I16).into_bytes();
        bytes[FRAME_LEN] = 12;
        assert_eq!(
            PrimitiveVector::<i32, &[u8]>::from_region(Region::new(&bytes[..])).err(),
            Some(VectorError::UnsupportedWidth(12))
        );
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_apply_out_of_bounds() {
        let v = frozen(&[1], Packing::I32);
        v.apply(1);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_is_available_out_of_bounds() {
        let v = frozen(&[1], Packing::I32);
        v.is_available(usize::MAX);
    }

    #[test]
    fn test_is_available_in_bounds() {
        let v = frozen(&[1, 2], Packing::I32);
        assert!(v.is_available(1));
    }

    #[test]
    fn test_narrowest() {
        assert_eq!(Packing::narrowest(Some((0, 255)), Packing::I32), Packing::U8);
        assert_eq!(Packing::narrowest(Some((-128, 127)), Packing::I32), Packing::I8);
        assert_eq!(Packing::narrowest(Some((-1, 200)), Packing::I32), Packing::I16);
        assert_eq!(Packing::narrowest(Some((0, 65535)), Packing::I32), Packing::U16);
        assert_eq!(Packing::narrowest(Some((-5, 300)), Packing::I32), Packing::I16);
        assert_eq!(Packing::narrowest(Some((0, 70000)), Packing::I32), Packing::I32);
        assert_eq!(Packing::narrowest(Some((0, 70000)), Packing::I64), Packing::U32);
        assert_eq!(Packing::narrowest(Some((-70000, 0)), Packing::I64), Packing::I32);
        assert_eq!(Packing::narrowest(Some((0, 1 << 40)), Packing::I64), Packing::I64);
        assert_eq!(Packing::narrowest(None, Packing::I64), Packing::U8);
    }

    #[test]
    fn test_packing_display() {
        assert_eq!(Packing::I16.to_string(), "16-bit signed");
        assert_eq!(Packing::F64.to_string(), "64-bit float");
    }
}
