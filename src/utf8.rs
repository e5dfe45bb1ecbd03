//! Plain UTF-8 string vectors.
//!
//! ```text
//! [4B length][4B naBytes][NA bitmap][length x 4B end offsets][utf8 data]
//! ```
//!
//! Element `i` spans `data[end[i-1]..end[i]]` (with `end[-1] = 0`). A
//! missing element has an empty span. UTF-8 validity of every span is
//! checked once, when the vector is opened.

use tracing::trace;

use crate::bitmap::{num_bytes_required, BitmapMask, MaskSpan};
use crate::buffer::{read_raw, read_u32, write_raw, ElementType, Frame, Region, VectorKind, FRAME_LEN, MAX_FIELD};
use crate::error::VectorError;
use crate::Result;

const LEN_FIELD: usize = 4;
const DESCRIPTOR_FIELD: usize = 4;
const OFFSET_WIDTH: usize = 4;

/// Position of the parts of a UTF-8 body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Utf8Layout {
    pub len: usize,
    pub na: MaskSpan,
    pub offsets: usize,
    pub data: usize,
}

impl Utf8Layout {
    /// Parse and validate the UTF-8 body spanning `start..end`.
    pub fn parse(bytes: &[u8], start: usize, end: usize) -> Result<Self> {
        let len = read_u32(bytes, start)? as usize;
        let na = MaskSpan::read_descriptor(bytes, start + LEN_FIELD, end, len)?;
        let offsets = na.end();
        let data = len
            .checked_mul(OFFSET_WIDTH)
            .and_then(|n| n.checked_add(offsets))
            .filter(|&d| d <= end)
            .ok_or_else(|| {
                VectorError::InvalidData(format!("{} string offsets overrun vector end {}", len, end))
            })?;
        let data_len = end - data;

        let mut prev = 0usize;
        for i in 0..len {
            let stop = read_u32(bytes, offsets + i * OFFSET_WIDTH)? as usize;
            if stop < prev || stop > data_len {
                return Err(VectorError::InvalidData(format!(
                    "string {} ends at {}, outside {}..{}",
                    i, stop, prev, data_len
                )));
            }
            std::str::from_utf8(&bytes[data + prev..data + stop])
                .map_err(|e| VectorError::InvalidData(format!("string {} is not UTF-8: {}", i, e)))?;
            prev = stop;
        }
        Ok(Utf8Layout {
            len,
            na,
            offsets,
            data,
        })
    }

    #[inline]
    fn end_of(&self, bytes: &[u8], index: usize) -> usize {
        read_raw(bytes, self.offsets + index * OFFSET_WIDTH, OFFSET_WIDTH) as usize
    }

    /// The string at `index`. Spans were validated by `parse`.
    #[inline]
    pub fn str_at<'a>(&self, bytes: &'a [u8], index: usize) -> &'a str {
        let start = if index == 0 { 0 } else { self.end_of(bytes, index - 1) };
        let stop = self.end_of(bytes, index);
        std::str::from_utf8(&bytes[self.data + start..self.data + stop]).unwrap_or_default()
    }
}

/// An immutable vector of strings.
#[derive(Clone, Debug)]
pub struct Utf8Vector<B = Vec<u8>> {
    region: Region<B>,
    layout: Utf8Layout,
}

impl<B: AsRef<[u8]>> Utf8Vector<B> {
    /// Open a framed string vector, validating headers and UTF-8.
    pub fn from_region(region: Region<B>) -> Result<Self> {
        region.frame()?.expect(VectorKind::Utf8, ElementType::Utf8)?;
        let layout = Utf8Layout::parse(region.as_slice(), FRAME_LEN, region.len())?;
        Ok(Utf8Vector { region, layout })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.layout.len
    }

    /// Whether the vector has no elements.
    pub fn is_empty(&self) -> bool {
        self.layout.len == 0
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.layout.len,
            "index {} out of bounds for vector of length {}",
            index,
            self.layout.len
        );
    }

    /// The string at `index`; empty if the element is missing.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    pub fn apply(&self, index: usize) -> &str {
        self.check_index(index);
        self.layout.str_at(self.region.as_slice(), index)
    }

    /// Whether the element at `index` is present.
    pub fn is_available(&self, index: usize) -> bool {
        self.check_index(index);
        self.layout.na.view(self.region.as_slice()).is_set(index)
    }

    /// The string at `index`, or `None` if it is missing.
    pub fn get(&self, index: usize) -> Option<&str> {
        if self.is_available(index) {
            Some(self.apply(index))
        } else {
            None
        }
    }

    /// Iterate over all elements as options.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        (0..self.layout.len).map(move |i| self.get(i))
    }

    /// The NA bitmap; empty when nothing is missing.
    pub fn mask(&self) -> BitmapMask<&[u8]> {
        self.layout.na.view(self.region.as_slice())
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

impl Utf8Vector<Vec<u8>> {
    /// Consume the vector and return its encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.region.into_vec()
    }
}

/// A string vector under construction, pre-sized for both element count
/// and total string bytes.
#[derive(Debug)]
pub struct AppendableUtf8Vector {
    region: Region<Vec<u8>>,
    na: MaskSpan,
    offsets: usize,
    data: usize,
    len: usize,
    capacity: usize,
    data_len: usize,
    data_capacity: usize,
}

impl AppendableUtf8Vector {
    /// Create a vector for up to `max_elements` strings totalling at most
    /// `max_data_bytes` bytes. Both limits are capped at `u32::MAX` so every
    /// count and offset fits its 4-byte field.
    pub fn new(max_elements: usize, max_data_bytes: usize) -> Self {
        let max_elements = max_elements.min(MAX_FIELD);
        let max_data_bytes = max_data_bytes.min(MAX_FIELD);
        let bitmap = num_bytes_required(max_elements);
        let region = Region::allocate(
            LEN_FIELD + DESCRIPTOR_FIELD + bitmap + max_elements * OFFSET_WIDTH + max_data_bytes,
            Frame::new(VectorKind::Utf8, ElementType::Utf8),
        );
        let na = MaskSpan::new(FRAME_LEN + LEN_FIELD + DESCRIPTOR_FIELD, bitmap);
        let offsets = na.end();
        AppendableUtf8Vector {
            region,
            na,
            offsets,
            data: offsets + max_elements * OFFSET_WIDTH,
            len: 0,
            capacity: max_elements,
            data_len: 0,
            data_capacity: max_data_bytes,
        }
    }

    fn ensure(&self, data_bytes: usize) -> Result<()> {
        if self.len >= self.capacity {
            return Err(VectorError::CapacityExceeded {
                requested: 1,
                available: 0,
            });
        }
        let available = self.data_capacity - self.data_len;
        if data_bytes > available {
            return Err(VectorError::CapacityExceeded {
                requested: data_bytes,
                available,
            });
        }
        Ok(())
    }

    fn push_end(&mut self) {
        let bytes = self.region.as_mut_slice();
        write_raw(
            bytes,
            self.offsets + self.len * OFFSET_WIDTH,
            OFFSET_WIDTH,
            self.data_len as u64,
        );
        self.len += 1;
    }

    /// Append a present string.
    pub fn add_value(&mut self, value: &str) -> Result<()> {
        self.ensure(value.len())?;
        let at = self.data + self.data_len;
        let bytes = self.region.as_mut_slice();
        bytes[at..at + value.len()].copy_from_slice(value.as_bytes());
        self.na.view_mut(bytes).set_bit(self.len);
        self.data_len += value.len();
        self.push_end();
        Ok(())
    }

    /// Append a missing string.
    pub fn add_na(&mut self) -> Result<()> {
        self.ensure(0)?;
        self.na.view_mut(self.region.as_mut_slice()).clear_bit(self.len);
        self.push_end();
        Ok(())
    }

    /// Append a string or a missing marker.
    pub fn add_option(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.add_value(v),
            None => self.add_na(),
        }
    }

    /// Number of strings appended.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finish appending: shrink the bitmap (dropping it if nothing is
    /// missing), then slide the offsets and the string data left so the
    /// body is contiguous.
    pub fn freeze(mut self) -> Utf8Vector {
        let len = self.len;
        let present = self.na.view(self.region.as_slice()).count_set(len);
        let na_bytes = if present == len { 0 } else { num_bytes_required(len) };

        let bytes = self.region.as_mut_slice();
        write_raw(bytes, FRAME_LEN, LEN_FIELD, len as u64);
        let na = MaskSpan::new(self.na.start, na_bytes);
        na.write_descriptor(bytes);
        let offsets = na.end();
        bytes.copy_within(self.offsets..self.offsets + len * OFFSET_WIDTH, offsets);
        let data = offsets + len * OFFSET_WIDTH;
        bytes.copy_within(self.data..self.data + self.data_len, data);
        self.region.truncate(data + self.data_len);
        trace!(len, data_bytes = self.data_len, "freeze utf8 vector");

        Utf8Vector {
            region: self.region,
            layout: Utf8Layout {
                len,
                na,
                offsets,
                data,
            },
        }
    }
}
