//! Dictionary-encoded string vectors.
//!
//! Distinct present strings are stored once, in first-seen order, and each
//! element is an integer code into that list:
//!
//! ```text
//! [4B offsetToCodes][dictionary: UTF-8 body, no NA][codes: masked body]
//! ```
//!
//! Codes are packed at the narrowest unsigned width covering
//! `[0, dictionary size)`. Missing elements are marked in the codes' NA
//! bitmap; the bitmap is empty when nothing is missing.

use std::collections::HashMap;

use tracing::trace;

use crate::bitmap::BitmapMask;
use crate::buffer::{read_u32, write_u32_field, ElementType, Frame, Region, VectorKind, FRAME_LEN};
use crate::error::VectorError;
use crate::masked::{AppendableMaskedVector, MaskedLayout};
use crate::optimizer::{optimize, OptimizedVector};
use crate::primitive::{Packing, Primitive};
use crate::utf8::{AppendableUtf8Vector, Utf8Layout};
use crate::Result;

const OFFSET_LEN: usize = 4;

/// An immutable dictionary-encoded string vector.
#[derive(Clone, Debug)]
pub struct DictionaryVector<B = Vec<u8>> {
    region: Region<B>,
    dictionary: Vec<String>,
    codes: MaskedLayout,
}

impl DictionaryVector<Vec<u8>> {
    /// Dictionary-encode `values`.
    pub fn encode<S: AsRef<str>>(values: &[Option<S>]) -> Result<Self> {
        let mut index: HashMap<&str, u32> = HashMap::new();
        let mut distinct: Vec<&str> = Vec::new();
        let mut codes = Vec::with_capacity(values.len());
        for value in values {
            let code = value.as_ref().map(|s| {
                let s = s.as_ref();
                *index.entry(s).or_insert_with(|| {
                    distinct.push(s);
                    (distinct.len() - 1) as u32
                })
            });
            codes.push(code);
        }

        let data_bytes = distinct.iter().map(|s| s.len()).sum();
        let mut dict = AppendableUtf8Vector::new(distinct.len(), data_bytes);
        for s in &distinct {
            dict.add_value(s)?;
        }
        let dict = dict.freeze();
        let dict_body = &dict.as_bytes()[FRAME_LEN..];

        let code_range = if distinct.is_empty() {
            None
        } else {
            Some((0, distinct.len() as i64 - 1))
        };
        let packing = Packing::narrowest(code_range, Packing::I32);
        let mut code_vector = AppendableMaskedVector::<i32>::with_packing(codes.len(), packing)?;
        for code in &codes {
            code_vector.add_option(code.map(|c| c as i32))?;
        }
        let code_vector = optimize(code_vector)?;

        let codes_len = match &code_vector {
            OptimizedVector::Masked(v) => v.encoded_len() - FRAME_LEN,
            OptimizedVector::Primitive(v) => OFFSET_LEN + v.encoded_len() - FRAME_LEN,
        };
        let codes_start = OFFSET_LEN + dict_body.len();
        let mut region = Region::allocate(
            codes_start + codes_len,
            Frame::new(VectorKind::Dictionary, ElementType::Utf8),
        );
        let bytes = region.as_mut_slice();
        write_u32_field(bytes, FRAME_LEN, codes_start, "codes offset")?;
        bytes[FRAME_LEN + OFFSET_LEN..FRAME_LEN + codes_start].copy_from_slice(dict_body);
        let at = FRAME_LEN + codes_start;
        match &code_vector {
            OptimizedVector::Masked(v) => {
                bytes[at..].copy_from_slice(&v.as_bytes()[FRAME_LEN..]);
            }
            OptimizedVector::Primitive(v) => {
                MaskedLayout::write_header(bytes, at, 0);
                bytes[at + OFFSET_LEN..].copy_from_slice(&v.as_bytes()[FRAME_LEN..]);
            }
        }
        trace!(
            len = values.len(),
            distinct = distinct.len(),
            packing = %code_vector.packing(),
            "dictionary encoded vector"
        );
        DictionaryVector::from_region(region)
    }
}

impl<B: AsRef<[u8]>> DictionaryVector<B> {
    /// Open a framed dictionary vector. The dictionary is read once here and
    /// cached; every code is checked against it.
    pub fn from_region(region: Region<B>) -> Result<Self> {
        region.frame()?.expect(VectorKind::Dictionary, ElementType::Utf8)?;
        let bytes = region.as_slice();
        let end = bytes.len();
        let codes_start = FRAME_LEN + read_u32(bytes, FRAME_LEN)? as usize;
        if codes_start < FRAME_LEN + OFFSET_LEN || codes_start > end {
            return Err(VectorError::InvalidData(format!(
                "codes offset {} outside dictionary vector of {} bytes",
                codes_start - FRAME_LEN,
                end
            )));
        }

        let dict = Utf8Layout::parse(bytes, FRAME_LEN + OFFSET_LEN, codes_start)?;
        if !dict.na.view(bytes).is_all_present() {
            return Err(VectorError::InvalidData("dictionary contains missing entries".into()));
        }
        let dictionary: Vec<String> = (0..dict.len).map(|i| dict.str_at(bytes, i).to_owned()).collect();

        let codes = MaskedLayout::parse(bytes, codes_start, end)?;
        if !i32::supports(codes.inner.packing) {
            return Err(VectorError::InvalidData(format!(
                "codes cannot be stored as {}",
                codes.inner.packing
            )));
        }
        for i in 0..codes.inner.len {
            if !codes.is_available(bytes, i) {
                continue;
            }
            let code = i32::unpack(codes.inner.raw(bytes, i), codes.inner.packing);
            if code < 0 || code as usize >= dictionary.len() {
                return Err(VectorError::InvalidData(format!(
                    "code {} at {} outside dictionary of {} entries",
                    code,
                    i,
                    dictionary.len()
                )));
            }
        }

        Ok(DictionaryVector {
            region,
            dictionary,
            codes,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.codes.inner.len
    }

    /// Whether the vector has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.len(),
            "index {} out of bounds for vector of length {}",
            index,
            self.len()
        );
    }

    /// Distinct strings in first-seen order.
    pub fn dictionary(&self) -> &[String] {
        &self.dictionary
    }

    /// Packing of the code stream.
    pub fn code_packing(&self) -> Packing {
        self.codes.inner.packing
    }

    /// The code at `index`, or `None` if the element is missing.
    pub fn code(&self, index: usize) -> Option<u32> {
        if self.is_available(index) {
            let bytes = self.region.as_slice();
            Some(i32::unpack(self.codes.inner.raw(bytes, index), self.codes.inner.packing) as u32)
        } else {
            None
        }
    }

    /// Whether the element at `index` is present.
    pub fn is_available(&self, index: usize) -> bool {
        self.check_index(index);
        self.codes.is_available(self.region.as_slice(), index)
    }

    /// The string at `index`; empty if the element is missing.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    pub fn apply(&self, index: usize) -> &str {
        match self.code(index) {
            Some(code) => &self.dictionary[code as usize],
            None => "",
        }
    }

    /// The string at `index`, or `None` if it is missing.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.code(index).map(|code| self.dictionary[code as usize].as_str())
    }

    /// Iterate over all elements as options.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// The NA bitmap of the codes; empty when nothing is missing.
    pub fn mask(&self) -> BitmapMask<&[u8]> {
        self.codes.mask.view(self.region.as_slice())
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

impl DictionaryVector<Vec<u8>> {
    /// Consume the vector and return its encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.region.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario() {
        let values = [Some("a"), Some("a"), Some("b"), None, Some("a")];
        let v = DictionaryVector::encode(&values).unwrap();
        assert_eq!(v.dictionary(), &["a".to_string(), "b".to_string()]);
        assert_eq!(
            (0..v.len()).map(|i| v.code(i)).collect::<Vec<_>>(),
            vec![Some(0), Some(0), Some(1), None, Some(0)]
        );
        assert_eq!(v.code_packing(), Packing::U8);
        assert_eq!(v.iter().collect::<Vec<_>>(), values.to_vec());
        assert_eq!(v.apply(3), "");
    }

    #[test]
    fn test_no_missing_uses_empty_mask() {
        let values = [Some("x"), Some("y"), Some("x")];
        let v = DictionaryVector::encode(&values).unwrap();
        assert!(v.mask().is_all_present());
        assert_eq!(v.iter().collect::<Vec<_>>(), values.to_vec());
    }

    #[test]
    fn test_owned_strings_and_wide_codes() {
        let values: Vec<Option<String>> = (0..300).map(|i| Some(format!("k{}", i % 260))).collect();
        let v = DictionaryVector::encode(&values).unwrap();
        assert_eq!(v.dictionary().len(), 260);
        assert_eq!(v.code_packing(), Packing::U16);
        assert_eq!(v.get(299), Some("k39"));
    }

    #[test]
    fn test_all_missing_and_empty() {
        let v = DictionaryVector::encode::<&str>(&[None, None]).unwrap();
        assert!(v.dictionary().is_empty());
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![None, None]);
        assert_eq!(v.apply(0), "");

        let v = DictionaryVector::encode::<&str>(&[]).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn test_reopen_borrowed() {
        let values = [Some("p"), None, Some("q"), Some("p")];
        let bytes = DictionaryVector::encode(&values).unwrap().into_bytes();
        let view = DictionaryVector::from_region(Region::new(&bytes[..])).unwrap();
        assert_eq!(view.iter().collect::<Vec<_>>(), values.to_vec());
    }

    #[test]
    fn test_rejects_code_outside_dictionary() {
        let mut bytes = DictionaryVector::encode(&[Some("p"), Some("q")]).unwrap().into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = 7;
        assert!(matches!(
            DictionaryVector::from_region(Region::new(&bytes[..])),
            Err(VectorError::InvalidData(_))
        ));
    }
}
