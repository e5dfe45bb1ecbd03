//! Raw buffer access.
//!
//! A [`Region`] is a length-tagged byte span that every vector in this crate
//! is laid out over. It is generic over its storage the same way the vectors
//! are: `Region<Vec<u8>>` owns its bytes (appendable and frozen vectors),
//! `Region<&[u8]>` borrows them (zero-copy views opened with `decode`).
//!
//! All multi-byte integers are little-endian. Every access is bounds checked
//! against the region length; a violation is reported as
//! [`VectorError::OutOfBounds`] and never truncated.
//!
//! Top-level buffers start with a 4-byte [`Frame`]:
//!
//! ```text
//! [2B magic 0xB17C][1B vector kind][1B element type][body ...]
//! ```

use crate::error::VectorError;
use crate::Result;

/// Largest count, length or offset a 4-byte header field can record.
/// Appendable vectors cap their capacity here so their headers never
/// truncate.
pub(crate) const MAX_FIELD: usize = u32::MAX as usize;

/// Magic marker written at the start of every allocated region.
pub const MAGIC: u16 = 0xB17C;

/// Size of the frame preamble in bytes.
pub const FRAME_LEN: usize = 4;

/// Physical layout of a vector body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VectorKind {
    /// Packed scalars without missing values.
    Primitive = 1,
    /// NA bitmap followed by an inner primitive vector.
    Masked = 2,
    /// Base value plus packed unsigned deltas.
    Delta = 3,
    /// Bit-packed booleans.
    Bits = 4,
    /// Variable-length UTF-8 strings.
    Utf8 = 5,
    /// Distinct strings plus per-element codes.
    Dictionary = 6,
}

impl VectorKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(VectorKind::Primitive),
            2 => Some(VectorKind::Masked),
            3 => Some(VectorKind::Delta),
            4 => Some(VectorKind::Bits),
            5 => Some(VectorKind::Utf8),
            6 => Some(VectorKind::Dictionary),
            _ => None,
        }
    }
}

/// Logical element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    /// 32-bit signed integers.
    Int32 = 1,
    /// 64-bit signed integers.
    Int64 = 2,
    /// 32-bit floats.
    Float32 = 3,
    /// 64-bit floats.
    Float64 = 4,
    /// Booleans.
    Bool = 5,
    /// UTF-8 strings.
    Utf8 = 6,
}

impl ElementType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(ElementType::Int32),
            2 => Some(ElementType::Int64),
            3 => Some(ElementType::Float32),
            4 => Some(ElementType::Float64),
            5 => Some(ElementType::Bool),
            6 => Some(ElementType::Utf8),
            _ => None,
        }
    }
}

/// The preamble identifying what a region holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Layout of the body.
    pub kind: VectorKind,
    /// Logical element type.
    pub element: ElementType,
}

impl Frame {
    /// Create a frame descriptor.
    pub fn new(kind: VectorKind, element: ElementType) -> Self {
        Frame { kind, element }
    }

    /// Check that this frame describes `kind` vectors of `element` values.
    pub fn expect(self, kind: VectorKind, element: ElementType) -> Result<Self> {
        if self.element != element {
            return Err(VectorError::ElementMismatch {
                expected: element,
                found: self.element,
            });
        }
        if self.kind != kind {
            return Err(VectorError::InvalidData(format!(
                "expected {:?} vector, found {:?}",
                kind, self.kind
            )));
        }
        Ok(self)
    }
}

#[inline]
fn check(offset: usize, width: usize, len: usize) -> Result<()> {
    match offset.checked_add(width) {
        Some(end) if end <= len => Ok(()),
        _ => Err(VectorError::OutOfBounds { offset, width, len }),
    }
}

/// Read a little-endian `u16` at `offset`.
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    check(offset, 2, bytes.len())?;
    Ok(u16::from_le_bytes([bytes[offset], bytes[offset + 1]]))
}

/// Read a little-endian `u32` at `offset`.
#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    check(offset, 4, bytes.len())?;
    let mut le = [0u8; 4];
    le.copy_from_slice(&bytes[offset..offset + 4]);
    Ok(u32::from_le_bytes(le))
}

/// Read a little-endian `u64` at `offset`.
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> Result<u64> {
    check(offset, 8, bytes.len())?;
    let mut le = [0u8; 8];
    le.copy_from_slice(&bytes[offset..offset + 8]);
    Ok(u64::from_le_bytes(le))
}

/// Read the low `width` bytes of a little-endian integer at `offset`,
/// zero-extended to 64 bits.
///
/// This is the element read path: callers validate the layout once at
/// construction, so it indexes directly and panics on a slice overrun.
#[inline]
pub(crate) fn read_raw(bytes: &[u8], offset: usize, width: usize) -> u64 {
    let mut le = [0u8; 8];
    le[..width].copy_from_slice(&bytes[offset..offset + width]);
    u64::from_le_bytes(le)
}

/// Write the low `width` bytes of `value` at `offset`, little-endian.
#[inline]
pub(crate) fn write_raw(bytes: &mut [u8], offset: usize, width: usize, value: u64) {
    bytes[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
}

/// Write `value` into a 4-byte header field at `offset`, failing with
/// [`VectorError::Overflow`] instead of truncating.
pub(crate) fn write_u32_field(bytes: &mut [u8], offset: usize, value: usize, what: &str) -> Result<()> {
    let field = u32::try_from(value)
        .map_err(|_| VectorError::Overflow(format!("{} {} does not fit a 4-byte field", what, value)))?;
    write_raw(bytes, offset, 4, field as u64);
    Ok(())
}

/// A byte region that vectors are laid out over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region<B> {
    buff: B,
}

impl<B> Region<B> {
    /// Wrap existing storage as a region.
    #[inline]
    pub fn new(buff: B) -> Self {
        Region { buff }
    }
}

impl<B: AsRef<[u8]>> Region<B> {
    /// The region's bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.buff.as_ref()
    }

    /// Length of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buff.as_ref().len()
    }

    /// Whether the region holds no bytes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a byte at `offset`.
    #[inline]
    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        check(offset, 1, self.len())?;
        Ok(self.as_slice()[offset])
    }

    /// Read a little-endian `u16` at `offset`.
    #[inline]
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        read_u16(self.as_slice(), offset)
    }

    /// Read a little-endian `u32` at `offset`.
    #[inline]
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        read_u32(self.as_slice(), offset)
    }

    /// Read a little-endian `u64` at `offset`.
    #[inline]
    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        read_u64(self.as_slice(), offset)
    }

    /// Validate the magic marker and return the frame.
    pub fn frame(&self) -> Result<Frame> {
        if self.len() < FRAME_LEN {
            return Err(VectorError::InvalidData(format!(
                "buffer of {} bytes is shorter than the frame",
                self.len()
            )));
        }
        let magic = self.read_u16(0)?;
        if magic != MAGIC {
            return Err(VectorError::BadMagic { found: magic });
        }
        let kind_byte = self.read_u8(2)?;
        let kind = VectorKind::from_byte(kind_byte)
            .ok_or_else(|| VectorError::InvalidData(format!("unknown vector kind {}", kind_byte)))?;
        let element_byte = self.read_u8(3)?;
        let element = ElementType::from_byte(element_byte).ok_or_else(|| {
            VectorError::InvalidData(format!("unknown element type {}", element_byte))
        })?;
        Ok(Frame { kind, element })
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Region<B> {
    /// The region's bytes, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buff.as_mut()
    }

    /// Write a byte at `offset`.
    #[inline]
    pub fn write_u8(&mut self, offset: usize, value: u8) -> Result<()> {
        check(offset, 1, self.len())?;
        self.as_mut_slice()[offset] = value;
        Ok(())
    }

    /// Write a little-endian `u16` at `offset`.
    #[inline]
    pub fn write_u16(&mut self, offset: usize, value: u16) -> Result<()> {
        check(offset, 2, self.len())?;
        write_raw(self.as_mut_slice(), offset, 2, value as u64);
        Ok(())
    }

    /// Write a little-endian `u32` at `offset`.
    #[inline]
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        check(offset, 4, self.len())?;
        write_raw(self.as_mut_slice(), offset, 4, value as u64);
        Ok(())
    }

    /// Write a little-endian `u64` at `offset`.
    #[inline]
    pub fn write_u64(&mut self, offset: usize, value: u64) -> Result<()> {
        check(offset, 8, self.len())?;
        write_raw(self.as_mut_slice(), offset, 8, value);
        Ok(())
    }

    /// Copy `len` bytes from `src` to `dest` inside the region.
    pub fn copy_within(&mut self, src: usize, len: usize, dest: usize) -> Result<()> {
        check(src, len, self.len())?;
        check(dest, len, self.len())?;
        self.as_mut_slice().copy_within(src..src + len, dest);
        Ok(())
    }

    /// Rewrite the frame's vector kind.
    pub fn set_kind(&mut self, kind: VectorKind) -> Result<()> {
        self.write_u8(2, kind as u8)
    }
}

impl Region<Vec<u8>> {
    /// Allocate a zero-initialized region with room for `body_bytes` after
    /// the frame, and stamp the frame at its start.
    pub fn allocate(body_bytes: usize, frame: Frame) -> Self {
        let mut buff = vec![0u8; FRAME_LEN + body_bytes];
        buff[..2].copy_from_slice(&MAGIC.to_le_bytes());
        buff[2] = frame.kind as u8;
        buff[3] = frame.element as u8;
        Region { buff }
    }

    /// Drop everything past `len` bytes. Keeps the allocation.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.buff.truncate(len);
    }

    /// Borrow the region as a read-only view.
    #[inline]
    pub fn view(&self) -> Region<&[u8]> {
        Region::new(self.buff.as_slice())
    }

    /// Consume the region and return its bytes.
    #[inline]
    pub fn into_vec(self) -> Vec<u8> {
        self.buff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroed_and_framed() {
        let region = Region::allocate(16, Frame::new(VectorKind::Primitive, ElementType::Int32));
        assert_eq!(region.len(), FRAME_LEN + 16);
        assert!(region.as_slice()[FRAME_LEN..].iter().all(|&b| b == 0));

        let frame = region.frame().unwrap();
        assert_eq!(frame.kind, VectorKind::Primitive);
        assert_eq!(frame.element, ElementType::Int32);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut region = Region::allocate(16, Frame::new(VectorKind::Bits, ElementType::Bool));
        region.write_u8(4, 0xAB).unwrap();
        region.write_u16(5, 0xBEEF).unwrap();
        region.write_u32(7, 0xDEAD_BEEF).unwrap();
        region.write_u64(11, u64::MAX - 1).unwrap();

        assert_eq!(region.read_u8(4).unwrap(), 0xAB);
        assert_eq!(region.read_u16(5).unwrap(), 0xBEEF);
        assert_eq!(region.read_u32(7).unwrap(), 0xDEAD_BEEF);
        assert_eq!(region.read_u64(11).unwrap(), u64::MAX - 1);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut region = Region::allocate(4, Frame::new(VectorKind::Bits, ElementType::Bool));
        region.write_u32(4, 0x0403_0201).unwrap();
        assert_eq!(&region.as_slice()[4..8], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut region = Region::allocate(4, Frame::new(VectorKind::Bits, ElementType::Bool));
        assert_eq!(
            region.read_u32(6),
            Err(VectorError::OutOfBounds { offset: 6, width: 4, len: 8 })
        );
        assert!(region.write_u64(1, 0).is_err());
        assert!(region.read_u8(8).is_err());
        assert!(region.read_u16(usize::MAX).is_err());
    }

    #[test]
    fn test_u32_field_rejects_wide_values() {
        let mut bytes = [0u8; 8];
        write_u32_field(&mut bytes, 2, MAX_FIELD, "length").unwrap();
        assert_eq!(&bytes[2..6], &[0xFF; 4]);

        let result = write_u32_field(&mut bytes, 2, MAX_FIELD + 1, "length");
        assert!(matches!(result, Err(VectorError::Overflow(_))));
        assert_eq!(&bytes[2..6], &[0xFF; 4]);
    }

    #[test]
    fn test_bad_magic() {
        let region = Region::new(vec![0u8, 0, 1, 1, 0, 0]);
        assert_eq!(region.frame(), Err(VectorError::BadMagic { found: 0 }));

        let short = Region::new(&[0x7Cu8, 0xB1][..]);
        assert!(matches!(short.frame(), Err(VectorError::InvalidData(_))));
    }

    #[test]
    fn test_unknown_kind() {
        let mut bytes = Region::allocate(0, Frame::new(VectorKind::Bits, ElementType::Bool)).into_vec();
        bytes[2] = 42;
        assert!(matches!(Region::new(bytes).frame(), Err(VectorError::InvalidData(_))));
    }

    #[test]
    fn test_frame_expect() {
        let frame = Frame::new(VectorKind::Masked, ElementType::Int64);
        assert!(frame.expect(VectorKind::Masked, ElementType::Int64).is_ok());
        assert_eq!(
            frame.expect(VectorKind::Masked, ElementType::Int32),
            Err(VectorError::ElementMismatch {
                expected: ElementType::Int32,
                found: ElementType::Int64,
            })
        );
        assert!(frame.expect(VectorKind::Primitive, ElementType::Int64).is_err());
    }
}
