//! Masked vectors: an NA bitmap in front of a primitive vector.
//!
//! ```text
//! [4B offsetToInner][bitmap: whole words][inner primitive body at offsetToInner]
//! ```
//!
//! The forward offset lets a reader skip the bitmap without parsing it, and
//! lets `freeze` slide the inner vector left when the bitmap was sized for
//! more elements than were appended. A zero-length bitmap (offset 4) reads
//! as all present.

use std::marker::PhantomData;

use tracing::trace;

use crate::bitmap::{num_bytes_required, BitmapMask, MaskSpan};
use crate::buffer::{read_u32, write_raw, Frame, Region, VectorKind, FRAME_LEN, MAX_FIELD};
use crate::error::VectorError;
use crate::primitive::{BinaryVector, Packing, Primitive, PrimitiveLayout, PrimitiveWriter};
use crate::Result;

const OFFSET_LEN: usize = 4;

/// Position of the bitmap and inner vector of a masked body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MaskedLayout {
    pub mask: MaskSpan,
    pub inner: PrimitiveLayout,
}

impl MaskedLayout {
    /// Parse the masked body spanning `start..end`.
    pub fn parse(bytes: &[u8], start: usize, end: usize) -> Result<Self> {
        let offset = read_u32(bytes, start)? as usize;
        if offset < OFFSET_LEN || start + offset > end {
            return Err(VectorError::InvalidData(format!(
                "inner vector offset {} outside masked vector of {} bytes",
                offset,
                end - start
            )));
        }
        let mask = MaskSpan::new(start + OFFSET_LEN, offset - OFFSET_LEN);
        let inner = PrimitiveLayout::parse(bytes, start + offset, end)?;
        mask.check_covers(inner.len)?;
        Ok(MaskedLayout { mask, inner })
    }

    /// Bytes needed for a masked body of `capacity` elements.
    pub fn body_bytes(packing: Packing, capacity: usize) -> usize {
        OFFSET_LEN + num_bytes_required(capacity) + PrimitiveWriter::body_bytes(packing, capacity)
    }

    /// Write a masked header with a bitmap of `mask_len` bytes at `start`.
    pub fn write_header(bytes: &mut [u8], start: usize, mask_len: usize) -> MaskSpan {
        write_raw(bytes, start, OFFSET_LEN, (OFFSET_LEN + mask_len) as u64);
        MaskSpan::new(start + OFFSET_LEN, mask_len)
    }

    #[inline]
    pub fn is_available(&self, bytes: &[u8], index: usize) -> bool {
        self.mask.view(bytes).is_set(index)
    }
}

/// An immutable primitive vector with missing-value support.
#[derive(Clone, Debug)]
pub struct MaskedVector<T, B = Vec<u8>> {
    region: Region<B>,
    layout: MaskedLayout,
    _marker: PhantomData<T>,
}

impl<T: Primitive, B: AsRef<[u8]>> MaskedVector<T, B> {
    /// Open a framed masked vector, validating its headers.
    pub fn from_region(region: Region<B>) -> Result<Self> {
        region.frame()?.expect(VectorKind::Masked, T::ELEMENT)?;
        let layout = MaskedLayout::parse(region.as_slice(), FRAME_LEN, region.len())?;
        if !T::supports(layout.inner.packing) {
            return Err(VectorError::InvalidData(format!(
                "{:?} vector cannot be stored as {}",
                T::ELEMENT,
                layout.inner.packing
            )));
        }
        Ok(MaskedVector::from_parts(region, layout))
    }

    pub(crate) fn from_parts(region: Region<B>, layout: MaskedLayout) -> Self {
        MaskedVector {
            region,
            layout,
            _marker: PhantomData,
        }
    }

    /// Width and variant of the inner vector.
    pub fn packing(&self) -> Packing {
        self.layout.inner.packing
    }

    /// The NA bitmap.
    pub fn mask(&self) -> BitmapMask<&[u8]> {
        self.layout.mask.view(self.region.as_slice())
    }

    /// Number of missing elements.
    pub fn na_count(&self) -> usize {
        self.len() - self.mask().count_set(self.len())
    }

    /// Forward offset of the inner vector from the start of the body.
    pub fn inner_offset(&self) -> usize {
        self.layout.inner.start() - FRAME_LEN
    }

    /// The encoded bytes, frame included.
    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Size of the encoded vector in bytes.
    pub fn encoded_len(&self) -> usize {
        self.region.len()
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.region.as_slice()[self.layout.inner.payload..self.layout.inner.end()]
    }
}

impl<T> MaskedVector<T, Vec<u8>> {
    /// Consume the vector and return its encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.region.into_vec()
    }
}

impl<T: Primitive, B: AsRef<[u8]>> BinaryVector<T> for MaskedVector<T, B> {
    #[inline]
    fn len(&self) -> usize {
        self.layout.inner.len
    }

    #[inline]
    fn apply(&self, index: usize) -> T {
        assert!(
            index < self.layout.inner.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.layout.inner.len
        );
        T::unpack(
            self.layout.inner.raw(self.region.as_slice(), index),
            self.layout.inner.packing,
        )
    }

    #[inline]
    fn is_available(&self, index: usize) -> bool {
        assert!(
            index < self.layout.inner.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.layout.inner.len
        );
        self.layout.is_available(self.region.as_slice(), index)
    }
}

/// A masked vector under construction.
#[derive(Debug)]
pub struct AppendableMaskedVector<T> {
    region: Region<Vec<u8>>,
    mask: MaskSpan,
    writer: PrimitiveWriter,
    _marker: PhantomData<T>,
}

impl<T: Primitive> AppendableMaskedVector<T> {
    /// Create a vector for up to `max_elements` values at the type's natural width.
    ///
    /// Capacity is capped at `u32::MAX` elements, the most a header records.
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
        let max_elements = max_elements.min(MAX_FIELD);
        let mut region = Region::allocate(
            MaskedLayout::body_bytes(packing, max_elements),
            Frame::new(VectorKind::Masked, T::ELEMENT),
        );
        let bytes = region.as_mut_slice();
        let mask = MaskedLayout::write_header(bytes, FRAME_LEN, num_bytes_required(max_elements));
        let writer = PrimitiveWriter::init(bytes, mask.end(), packing, max_elements);
        AppendableMaskedVector {
            region,
            mask,
            writer,
            _marker: PhantomData,
        }
    }

    /// Append a present value.
    pub fn add_value(&mut self, value: T) -> Result<()> {
        self.writer.ensure(1)?;
        let raw = value.pack(self.writer.packing)?;
        let index = self.writer.len;
        let bytes = self.region.as_mut_slice();
        self.writer.push(bytes, raw)?;
        self.mask.view_mut(bytes).set_bit(index);
        Ok(())
    }

    /// Append a missing value.
    pub fn add_na(&mut self) -> Result<()> {
        let index = self.writer.len;
        let bytes = self.region.as_mut_slice();
        self.writer.push(bytes, 0)?;
        self.mask.view_mut(bytes).clear_bit(index);
        Ok(())
    }

    /// Append a value or a missing marker.
    pub fn add_option(&mut self, value: Option<T>) -> Result<()> {
        match value {
            Some(v) => self.add_value(v),
            None => self.add_na(),
        }
    }

    /// Append every element of `other`, missing markers included.
    ///
    /// When nothing has been appended yet the bitmap is copied in bulk, and
    /// when the packings match the payload is copied in one block.
    pub fn add_vector<B: AsRef<[u8]>>(&mut self, other: &MaskedVector<T, B>) -> Result<()> {
        let count = other.len();
        self.writer.ensure(count)?;
        let packing = self.writer.packing;
        let src_mask = other.mask();
        // NA slots carry no value and are written as zero.
        let repacked = if other.packing() == packing {
            None
        } else {
            Some(
                (0..count)
                    .map(|i| if src_mask.is_set(i) { other.apply(i).pack(packing) } else { Ok(0) })
                    .collect::<Result<Vec<u64>>>()?,
            )
        };

        let base = self.writer.len;
        let bytes = self.region.as_mut_slice();
        let mut mask = self.mask.view_mut(bytes);
        if base == 0 {
            mask.copy_mask_from(&src_mask, count)?;
        } else {
            for i in 0..count {
                if src_mask.is_set(i) {
                    mask.set_bit(base + i);
                } else {
                    mask.clear_bit(base + i);
                }
            }
        }

        match repacked {
            None => self.writer.push_packed(bytes, other.payload(), count),
            Some(raws) => {
                for raw in raws {
                    self.writer.push(bytes, raw)?;
                }
                Ok(())
            }
        }
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.writer.capacity
    }

    /// Width and variant elements are packed with.
    pub fn packing(&self) -> Packing {
        self.writer.packing
    }

    /// The NA bitmap as allocated, sized for the full capacity.
    pub fn mask(&self) -> BitmapMask<&[u8]> {
        self.mask.view(self.region.as_slice())
    }

    /// Number of missing elements so far.
    pub fn na_count(&self) -> usize {
        self.writer.len - self.mask().count_set(self.writer.len)
    }

    /// The backing bytes, including unused capacity.
    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    pub(crate) fn into_parts(self) -> (Region<Vec<u8>>, MaskSpan, PrimitiveWriter) {
        (self.region, self.mask, self.writer)
    }

    /// Finish appending.
    ///
    /// If the bitmap is already exactly the size the final length needs,
    /// the region is reused as is. Otherwise the inner vector is moved left
    /// to sit right after the used part of the bitmap and the forward offset
    /// is rewritten. Neither path reallocates.
    pub fn freeze(self) -> MaskedVector<T> {
        let (mut region, mask, writer) = self.into_parts();
        let len = writer.len;
        let used = num_bytes_required(len);
        if used == mask.len {
            trace!(len, bitmap_bytes = used, "freeze masked vector in place");
            region.truncate(writer.end());
            return MaskedVector::from_parts(
                region,
                MaskedLayout {
                    mask,
                    inner: writer.layout(),
                },
            );
        }

        let inner_bytes = writer.end() - writer.start;
        let bytes = region.as_mut_slice();
        let mask = MaskedLayout::write_header(bytes, FRAME_LEN, used);
        bytes.copy_within(writer.start..writer.end(), mask.end());
        region.truncate(mask.end() + inner_bytes);
        trace!(
            len,
            bitmap_bytes = used,
            moved = inner_bytes,
            "freeze masked vector with compaction"
        );
        let inner = PrimitiveWriter { start: mask.end(), ..writer }.layout();
        MaskedVector::from_parts(region, MaskedLayout { mask, inner })
    }
}

impl<T: Primitive> BinaryVector<T> for AppendableMaskedVector<T> {
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

    fn is_available(&self, index: usize) -> bool {
        assert!(
            index < self.writer.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.writer.len
        );
        self.mask().is_set(index)
    }
}
