//! NA bitmap masks.
//!
//! One bit per logical element, 1 = present, 0 = missing, stored as a whole
//! number of 8-byte words. A mask never knows the logical length; the vector
//! that owns it does, and bits past that length are padding that is never
//! interpreted.
//!
//! An empty mask (zero bytes) is the reserved "all present" form: every
//! index reads as set without touching memory.

use crate::buffer::{read_u32, write_raw};
use crate::error::VectorError;
use crate::Result;

/// Bitmaps are sized in whole words of this many bytes.
pub const WORD_BYTES: usize = 8;

const WORD_BITS: usize = WORD_BYTES * 8;

/// Number of bitmap bytes needed for `max_elements` bits, rounded up to the
/// enclosing word.
#[inline]
pub fn num_bytes_required(max_elements: usize) -> usize {
    max_elements.div_ceil(WORD_BITS) * WORD_BYTES
}

/// A presence mask over a span of bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitmapMask<B> {
    bits: B,
}

impl<B> BitmapMask<B> {
    /// Wrap the exact bitmap bytes.
    #[inline]
    pub fn new(bits: B) -> Self {
        BitmapMask { bits }
    }
}

impl<B: AsRef<[u8]>> BitmapMask<B> {
    /// Whether this is the all-present form.
    #[inline]
    pub fn is_all_present(&self) -> bool {
        self.bits.as_ref().is_empty()
    }

    /// Number of bits the mask can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bits.as_ref().len() * 8
    }

    /// The raw bitmap bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_ref()
    }

    /// Whether element `index` is present.
    ///
    /// # Panics
    /// Panics if `index` is past the mask's capacity.
    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        let bits = self.bits.as_ref();
        if bits.is_empty() {
            return true;
        }
        (bits[index / 8] >> (index % 8)) & 1 == 1
    }

    /// Count the present elements among the first `len`.
    pub fn count_set(&self, len: usize) -> usize {
        let bits = self.bits.as_ref();
        if bits.is_empty() {
            return len;
        }
        let full = len / 8;
        let mut count: usize = bits[..full].iter().map(|b| b.count_ones() as usize).sum();
        let rem = len % 8;
        if rem > 0 {
            count += (bits[full] & ((1u8 << rem) - 1)).count_ones() as usize;
        }
        count
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitmapMask<B> {
    /// Mark element `index` present.
    #[inline]
    pub fn set_bit(&mut self, index: usize) {
        self.bits.as_mut()[index / 8] |= 1 << (index % 8);
    }

    /// Mark element `index` missing.
    #[inline]
    pub fn clear_bit(&mut self, index: usize) {
        self.bits.as_mut()[index / 8] &= !(1 << (index % 8));
    }

    /// Copy the first `len` bits of `other` into this mask.
    ///
    /// Only valid when both vectors share identical logical indices, i.e.
    /// this mask has no live bits yet. Copies whole bytes; bits past `len`
    /// in the last byte are padding.
    pub fn copy_mask_from<C: AsRef<[u8]>>(&mut self, other: &BitmapMask<C>, len: usize) -> Result<()> {
        let nbytes = len.div_ceil(8);
        if nbytes > self.bits.as_ref().len() {
            return Err(VectorError::CapacityExceeded {
                requested: len,
                available: self.capacity(),
            });
        }
        let dst = &mut self.bits.as_mut()[..nbytes];
        if other.is_all_present() {
            dst.fill(0xFF);
        } else {
            dst.copy_from_slice(&other.as_bytes()[..nbytes]);
        }
        Ok(())
    }
}

/// Location of a bitmap inside a vector region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MaskSpan {
    pub start: usize,
    pub len: usize,
}

impl MaskSpan {
    #[inline]
    pub fn new(start: usize, len: usize) -> Self {
        MaskSpan { start, len }
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    #[inline]
    pub fn view<'a>(&self, bytes: &'a [u8]) -> BitmapMask<&'a [u8]> {
        BitmapMask::new(&bytes[self.start..self.end()])
    }

    #[inline]
    pub fn view_mut<'a>(&self, bytes: &'a mut [u8]) -> BitmapMask<&'a mut [u8]> {
        BitmapMask::new(&mut bytes[self.start..self.end()])
    }

    /// Parse an NA descriptor, `[4B bitmapBytes][bitmap]`, at `at`.
    pub fn read_descriptor(bytes: &[u8], at: usize, end: usize, len: usize) -> Result<Self> {
        let nbytes = read_u32(bytes, at)? as usize;
        let span = MaskSpan::new(at + 4, nbytes);
        if span.end() > end {
            return Err(VectorError::InvalidData(format!(
                "bitmap of {} bytes overruns vector end {}",
                nbytes, end
            )));
        }
        span.check_covers(len)?;
        Ok(span)
    }

    /// Write an NA descriptor header for this span.
    #[inline]
    pub fn write_descriptor(&self, bytes: &mut [u8]) {
        write_raw(bytes, self.start - 4, 4, self.len as u64);
    }

    pub fn check_covers(&self, len: usize) -> Result<()> {
        if self.len != 0 && (self.len % WORD_BYTES != 0 || self.len * 8 < len) {
            return Err(VectorError::InvalidData(format!(
                "bitmap of {} bytes cannot cover {} elements",
                self.len, len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_bytes_required() {
        assert_eq!(num_bytes_required(0), 0);
        assert_eq!(num_bytes_required(1), 8);
        assert_eq!(num_bytes_required(64), 8);
        assert_eq!(num_bytes_required(65), 16);
        assert_eq!(num_bytes_required(1000), 128);
    }

    #[test]
    fn test_set_clear_is_set() {
        let mut bytes = vec![0u8; 8];
        let mut mask = BitmapMask::new(bytes.as_mut_slice());
        mask.set_bit(0);
        mask.set_bit(9);
        mask.set_bit(63);
        assert!(mask.is_set(0));
        assert!(!mask.is_set(1));
        assert!(mask.is_set(9));
        assert!(mask.is_set(63));

        mask.clear_bit(9);
        assert!(!mask.is_set(9));
        assert_eq!(mask.count_set(64), 2);
        assert_eq!(bytes[0], 0b0000_0001);
        assert_eq!(bytes[7], 0b1000_0000);
    }

    #[test]
    fn test_all_present_fast_path() {
        let mask = BitmapMask::new(&[][..]);
        assert!(mask.is_all_present());
        assert!(mask.is_set(12345));
        assert_eq!(mask.count_set(17), 17);
    }

    #[test]
    fn test_count_set_ignores_padding() {
        let bytes = [0xFFu8, 0xFF, 0, 0, 0, 0, 0, 0];
        let mask = BitmapMask::new(&bytes[..]);
        assert_eq!(mask.count_set(3), 3);
        assert_eq!(mask.count_set(12), 12);
        assert_eq!(mask.count_set(20), 16);
    }

    #[test]
    fn test_copy_mask_from() {
        let src_bytes = [0b1010_1010u8, 0b0000_0011, 0, 0, 0, 0, 0, 0];
        let src = BitmapMask::new(&src_bytes[..]);

        let mut dst_bytes = vec![0u8; 16];
        let mut dst = BitmapMask::new(dst_bytes.as_mut_slice());
        dst.copy_mask_from(&src, 10).unwrap();
        for i in 0..10 {
            assert_eq!(dst.is_set(i), src.is_set(i), "bit {}", i);
        }

        let all = BitmapMask::new(&[][..]);
        dst.copy_mask_from(&all, 10).unwrap();
        assert_eq!(dst.count_set(10), 10);
    }

    #[test]
    fn test_copy_mask_from_too_small() {
        let src_bytes = [0xFFu8; 16];
        let src = BitmapMask::new(&src_bytes[..]);
        let mut dst_bytes = vec![0u8; 8];
        let mut dst = BitmapMask::new(dst_bytes.as_mut_slice());
        assert!(matches!(
            dst.copy_mask_from(&src, 100),
            Err(VectorError::CapacityExceeded { requested: 100, available: 64 })
        ));
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let mut bytes = vec![0u8; 4 + 8 + 4];
        let span = MaskSpan::new(4, 8);
        span.write_descriptor(&mut bytes);
        let parsed = MaskSpan::read_descriptor(&bytes, 0, bytes.len(), 40).unwrap();
        assert_eq!(parsed, span);

        assert!(MaskSpan::read_descriptor(&bytes, 0, bytes.len(), 65).is_err());
        assert!(MaskSpan::read_descriptor(&bytes, 0, 8, 10).is_err());
    }
}
