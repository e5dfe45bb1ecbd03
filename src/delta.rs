//! Delta-encoded integer vectors.
//!
//! Every present value is stored as an unsigned offset from a single base,
//! the minimum present value, packed at the narrowest width that covers the
//! largest offset:
//!
//! ```text
//! [4B length][4B naBytes][NA bitmap][8B base][2B bitWidth][1B variant][deltas]
//! ```
//!
//! Deltas are limited to 32 bits. A column whose spread does not fit is
//! rejected at construction with [`VectorError::Overflow`]; it never wraps.

use std::marker::PhantomData;

use tracing::trace;

use crate::bitmap::{num_bytes_required, BitmapMask, MaskSpan};
use crate::buffer::{read_u32, read_u64, write_raw, write_u32_field, Frame, Region, VectorKind, FRAME_LEN};
use crate::error::VectorError;
use crate::primitive::{BinaryVector, Packing, Primitive, PrimitiveLayout, PrimitiveWriter, Variant};
use crate::Result;

const LEN_FIELD: usize = 4;
const DESCRIPTOR_FIELD: usize = 4;
const BASE_FIELD: usize = 8;

/// An immutable base-plus-delta integer vector.
#[derive(Clone, Debug)]
pub struct DeltaVector<T, B = Vec<u8>> {
    region: Region<B>,
    na: MaskSpan,
    base: i64,
    deltas: PrimitiveLayout,
    _marker: PhantomData<T>,
}

impl<T: Primitive> DeltaVector<T> {
    /// Delta-encode `values`.
    ///
    /// The base is the minimum present value (zero if none is present).
    /// Fails with [`VectorError::Overflow`] for non-integer element types or
    /// when `max - min` does not fit in 32 bits.
    pub fn encode(values: &[Option<T>]) -> Result<Self> {
        if !T::NATURAL.is_integer() {
            return Err(VectorError::Overflow(format!(
                "{:?} values cannot be delta encoded",
                T::ELEMENT
            )));
        }
        let ints: Vec<Option<i64>> = values.iter().map(|v| v.and_then(|x| x.as_i64())).collect();
        let (base, spread) = match ints.iter().flatten().fold(None, |acc: Option<(i64, i64)>, &v| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v))),
        }) {
            Some((min, max)) => (min, max as i128 - min as i128),
            None => (0, 0),
        };
        if spread > u32::MAX as i128 {
            return Err(VectorError::Overflow(format!(
                "delta range {} does not fit in 32 bits",
                spread
            )));
        }
        let packing = Packing::narrowest(Some((0, spread as i64)), Packing::U32);

        let len = values.len();
        let has_na = ints.iter().any(Option::is_none);
        let mask_len = if has_na { num_bytes_required(len) } else { 0 };
        let mut region = Region::allocate(
            LEN_FIELD + DESCRIPTOR_FIELD + mask_len + BASE_FIELD + PrimitiveWriter::body_bytes(packing, len),
            Frame::new(VectorKind::Delta, T::ELEMENT),
        );

        let bytes = region.as_mut_slice();
        write_u32_field(bytes, FRAME_LEN, len, "element count")?;
        let na = MaskSpan::new(FRAME_LEN + LEN_FIELD + DESCRIPTOR_FIELD, mask_len);
        na.write_descriptor(bytes);
        write_raw(bytes, na.end(), BASE_FIELD, base as u64);
        let mut writer = PrimitiveWriter::init(bytes, na.end() + BASE_FIELD, packing, len);
        for (i, v) in ints.iter().enumerate() {
            match v {
                Some(x) => {
                    writer.push(bytes, x.wrapping_sub(base) as u64)?;
                    if has_na {
                        na.view_mut(bytes).set_bit(i);
                    }
                }
                None => writer.push(bytes, 0)?,
            }
        }
        trace!(len, base, %packing, "delta encoded vector");

        Ok(DeltaVector {
            region,
            na,
            base,
            deltas: writer.layout(),
            _marker: PhantomData,
        })
    }
}

impl<T: Primitive, B: AsRef<[u8]>> DeltaVector<T, B> {
    /// Open a framed delta vector, validating its headers.
    pub fn from_region(region: Region<B>) -> Result<Self> {
        region.frame()?.expect(VectorKind::Delta, T::ELEMENT)?;
        let (min, max) = match T::NATURAL.range() {
            Some(range) => range,
            None => {
                return Err(VectorError::InvalidData(format!(
                    "{:?} values cannot be delta encoded",
                    T::ELEMENT
                )))
            }
        };
        let bytes = region.as_slice();
        let end = bytes.len();
        let len = read_u32(bytes, FRAME_LEN)? as usize;
        let na = MaskSpan::read_descriptor(bytes, FRAME_LEN + LEN_FIELD, end, len)?;
        let base = read_u64(bytes, na.end())? as i64;
        let deltas = PrimitiveLayout::parse(bytes, na.end() + BASE_FIELD, end)?;
        if deltas.len != len {
            return Err(VectorError::InvalidData(format!(
                "delta payload holds {} elements, header says {}",
                deltas.len, len
            )));
        }
        if deltas.packing.variant != Variant::Unsigned || deltas.packing.width.bits() > 32 {
            return Err(VectorError::InvalidData(format!(
                "deltas cannot be stored as {}",
                deltas.packing
            )));
        }
        // NA slots read as a placeholder, so only present deltas are bounded.
        let mask = na.view(bytes);
        let top = (0..len)
            .filter(|&i| mask.is_set(i))
            .map(|i| deltas.raw(bytes, i))
            .max()
            .unwrap_or(0);
        let highest = base as i128 + top as i128;
        if (base as i128) < min as i128 || highest > max as i128 {
            return Err(VectorError::InvalidData(format!(
                "delta base {} with offsets up to {} leaves the {:?} range",
                base,
                top,
                T::ELEMENT
            )));
        }
        Ok(DeltaVector {
            region,
            na,
            base,
            deltas,
            _marker: PhantomData,
        })
    }

    /// The reference value deltas are relative to.
    pub fn base(&self) -> i64 {
        self.base
    }

    /// Packing of the stored deltas.
    pub fn delta_packing(&self) -> Packing {
        self.deltas.packing
    }

    /// The NA bitmap; empty when nothing is missing.
    pub fn mask(&self) -> BitmapMask<&[u8]> {
        self.na.view(self.region.as_slice())
    }

    /// The encoded bytes, frame included.
    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Size of the encoded vector in bytes.
    pub fn encoded_len(&self) -> usize {
        self.region.len()
    }
}

impl<T> DeltaVector<T, Vec<u8>> {
    /// Consume the vector and return its encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.region.into_vec()
    }
}

impl<T: Primitive, B: AsRef<[u8]>> BinaryVector<T> for DeltaVector<T, B> {
    #[inline]
    fn len(&self) -> usize {
        self.deltas.len
    }

    #[inline]
    fn apply(&self, index: usize) -> T {
        assert!(
            index < self.deltas.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.deltas.len
        );
        let delta = self.deltas.raw(self.region.as_slice(), index);
        T::from_i64(self.base.wrapping_add(delta as i64))
    }

    fn is_available(&self, index: usize) -> bool {
        assert!(
            index < self.deltas.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.deltas.len
        );
        self.mask().is_set(index)
    }
}
