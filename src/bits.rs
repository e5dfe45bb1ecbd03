//! Boolean vectors.
//!
//! ```text
//! [4B length][4B naBytes][NA bitmap][value bitmap]
//! ```
//!
//! Values use the same word-sized bitmap layout as NA masks. `naBytes == 0`
//! means nothing is missing.

use tracing::trace;

use crate::bitmap::{num_bytes_required, BitmapMask, MaskSpan};
use crate::buffer::{read_u32, write_raw, ElementType, Frame, Region, VectorKind, FRAME_LEN, MAX_FIELD};
use crate::error::VectorError;
use crate::primitive::BinaryVector;
use crate::Result;

const LEN_FIELD: usize = 4;
const DESCRIPTOR_FIELD: usize = 4;

/// An immutable vector of booleans.
#[derive(Clone, Debug)]
pub struct BoolVector<B = Vec<u8>> {
    region: Region<B>,
    len: usize,
    na: MaskSpan,
    values: MaskSpan,
}

impl<B: AsRef<[u8]>> BoolVector<B> {
    /// Open a framed boolean vector, validating its headers.
    pub fn from_region(region: Region<B>) -> Result<Self> {
        region.frame()?.expect(VectorKind::Bits, ElementType::Bool)?;
        let bytes = region.as_slice();
        let end = bytes.len();
        let len = read_u32(bytes, FRAME_LEN)? as usize;
        let na = MaskSpan::read_descriptor(bytes, FRAME_LEN + LEN_FIELD, end, len)?;
        let values = MaskSpan::new(na.end(), end - na.end());
        if values.len != num_bytes_required(len) {
            return Err(VectorError::InvalidData(format!(
                "value bitmap of {} bytes does not match {} elements",
                values.len, len
            )));
        }
        Ok(BoolVector {
            region,
            len,
            na,
            values,
        })
    }

    /// The value bitmap.
    pub fn values(&self) -> BitmapMask<&[u8]> {
        self.values.view(self.region.as_slice())
    }

    /// The NA bitmap; empty when nothing is missing.
    pub fn mask(&self) -> BitmapMask<&[u8]> {
        self.na.view(self.region.as_slice())
    }

    /// Number of present `true` values.
    pub fn count_true(&self) -> usize {
        (0..self.len)
            .filter(|&i| self.is_available(i) && self.apply(i))
            .count()
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

impl BoolVector<Vec<u8>> {
    /// Consume the vector and return its encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.region.into_vec()
    }
}

impl<B: AsRef<[u8]>> BinaryVector<bool> for BoolVector<B> {
    fn len(&self) -> usize {
        self.len
    }

    fn apply(&self, index: usize) -> bool {
        assert!(
            index < self.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.len
        );
        self.values().is_set(index)
    }

    fn is_available(&self, index: usize) -> bool {
        assert!(
            index < self.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.len
        );
        self.mask().is_set(index)
    }
}

/// A boolean vector under construction.
#[derive(Debug)]
pub struct AppendableBoolVector {
    region: Region<Vec<u8>>,
    na: MaskSpan,
    values: MaskSpan,
    len: usize,
    capacity: usize,
}

impl AppendableBoolVector {
    /// Create a vector for up to `max_elements` booleans, capped at
    /// `u32::MAX`.
    pub fn new(max_elements: usize) -> Self {
        let max_elements = max_elements.min(MAX_FIELD);
        let bitmap = num_bytes_required(max_elements);
        let region = Region::allocate(
            LEN_FIELD + DESCRIPTOR_FIELD + 2 * bitmap,
            Frame::new(VectorKind::Bits, ElementType::Bool),
        );
        let na = MaskSpan::new(FRAME_LEN + LEN_FIELD + DESCRIPTOR_FIELD, bitmap);
        let values = MaskSpan::new(na.end(), bitmap);
        AppendableBoolVector {
            region,
            na,
            values,
            len: 0,
            capacity: max_elements,
        }
    }

    fn ensure(&self) -> Result<()> {
        if self.len >= self.capacity {
            return Err(VectorError::CapacityExceeded {
                requested: 1,
                available: 0,
            });
        }
        Ok(())
    }

    /// Append a present value.
    pub fn add_value(&mut self, value: bool) -> Result<()> {
        self.ensure()?;
        let bytes = self.region.as_mut_slice();
        self.na.view_mut(bytes).set_bit(self.len);
        if value {
            self.values.view_mut(bytes).set_bit(self.len);
        }
        self.len += 1;
        Ok(())
    }

    /// Append a missing value.
    pub fn add_na(&mut self) -> Result<()> {
        self.ensure()?;
        let bytes = self.region.as_mut_slice();
        self.na.view_mut(bytes).clear_bit(self.len);
        self.values.view_mut(bytes).clear_bit(self.len);
        self.len += 1;
        Ok(())
    }

    /// Append a value or a missing marker.
    pub fn add_option(&mut self, value: Option<bool>) -> Result<()> {
        match value {
            Some(v) => self.add_value(v),
            None => self.add_na(),
        }
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Finish appending, shrinking both bitmaps to the final length and
    /// dropping the NA bitmap if nothing is missing.
    pub fn freeze(mut self) -> BoolVector {
        let len = self.len;
        let present = self.na.view(self.region.as_slice()).count_set(len);
        let value_bytes = num_bytes_required(len);
        let na_bytes = if present == len { 0 } else { value_bytes };

        let bytes = self.region.as_mut_slice();
        write_raw(bytes, FRAME_LEN, LEN_FIELD, len as u64);
        let na = MaskSpan::new(self.na.start, na_bytes);
        na.write_descriptor(bytes);
        let values = MaskSpan::new(na.end(), value_bytes);
        bytes.copy_within(self.values.start..self.values.start + value_bytes, values.start);
        self.region.truncate(values.end());
        trace!(len, missing = len - present, "freeze bool vector");

        BoolVector {
            region: self.region,
            len,
            na,
            values,
        }
    }
}

impl BinaryVector<bool> for AppendableBoolVector {
    fn len(&self) -> usize {
        self.len
    }

    fn apply(&self, index: usize) -> bool {
        assert!(
            index < self.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.len
        );
        self.values.view(self.region.as_slice()).is_set(index)
    }

    fn is_available(&self, index: usize) -> bool {
        assert!(
            index < self.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.len
        );
        self.na.view(self.region.as_slice()).is_set(index)
    }
}
