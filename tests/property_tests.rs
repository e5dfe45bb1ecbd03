//! Property-based tests for column encoding.
//!
//! These tests verify invariants that must hold for all inputs, using
//! proptest to generate random columns with and without missing values.

use binvec::{
    AppendableMaskedVector, AppendablePrimitiveVector, BinaryVector, ColumnCodec, EncodingHint, Packing,
    VectorError, VectorKind,
};
use proptest::prelude::*;

/// Generate a column where roughly one value in five is missing.
fn column<T: std::fmt::Debug>(
    values: impl Strategy<Value = T>,
    max_len: usize,
) -> impl Strategy<Value = Vec<Option<T>>> {
    proptest::collection::vec(proptest::option::weighted(0.8, values), 0..max_len)
}

/// Generate short strings drawn from a small alphabet, so that repeats (and
/// therefore dictionary encoding) are common.
fn repetitive_strings(max_len: usize) -> impl Strategy<Value = Vec<Option<String>>> {
    column("[a-c]{0,3}", max_len)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    // =======================================================================
    // ROUNDTRIP INVARIANT: decode(encode(s)) == s
    // =======================================================================

    #[test]
    fn roundtrip_i32(values in column(any::<i32>(), 200)) {
        let codec = ColumnCodec::new();
        let bytes = codec.encode_numeric(&values)?;
        let decoded = codec.decode_numeric::<i32>(&bytes)?;
        prop_assert_eq!(decoded.len(), values.len());
        prop_assert_eq!(decoded.options().collect::<Vec<_>>(), values);
    }

    #[test]
    fn roundtrip_small_i32(values in column(-1000i32..1000, 200)) {
        let codec = ColumnCodec::new();
        let bytes = codec.encode_numeric(&values)?;
        let decoded = codec.decode_numeric::<i32>(&bytes)?;
        prop_assert_eq!(decoded.options().collect::<Vec<_>>(), values);
    }

    #[test]
    fn roundtrip_i64(values in column(any::<i64>(), 200)) {
        let codec = ColumnCodec::new();
        let bytes = codec.encode_numeric(&values)?;
        let decoded = codec.decode_numeric::<i64>(&bytes)?;
        prop_assert_eq!(decoded.options().collect::<Vec<_>>(), values);
    }

    #[test]
    fn roundtrip_clustered_i64(base in any::<i32>(), offsets in column(0i64..100_000, 200)) {
        let values: Vec<Option<i64>> = offsets.iter().map(|o| o.map(|o| base as i64 * 1000 + o)).collect();
        let codec = ColumnCodec::new();
        let bytes = codec.encode_numeric(&values)?;
        let decoded = codec.decode_numeric::<i64>(&bytes)?;
        prop_assert_eq!(decoded.options().collect::<Vec<_>>(), values);
    }

    #[test]
    fn roundtrip_f32(values in column(-1.0e6f32..1.0e6, 200)) {
        let codec = ColumnCodec::new();
        let bytes = codec.encode_numeric(&values)?;
        let decoded = codec.decode_numeric::<f32>(&bytes)?;
        prop_assert_eq!(decoded.options().collect::<Vec<_>>(), values);
    }

    #[test]
    fn roundtrip_f64(values in column(-1.0e12f64..1.0e12, 200)) {
        let codec = ColumnCodec::new();
        let bytes = codec.encode_numeric(&values)?;
        let decoded = codec.decode_numeric::<f64>(&bytes)?;
        prop_assert_eq!(decoded.options().collect::<Vec<_>>(), values);
    }

    #[test]
    fn roundtrip_bools(values in column(any::<bool>(), 300)) {
        let codec = ColumnCodec::new();
        let bytes = codec.encode_bools(&values)?;
        let decoded = codec.decode_bools(&bytes)?;
        prop_assert_eq!(decoded.options().collect::<Vec<_>>(), values);
    }

    #[test]
    fn roundtrip_strings(values in column(".{0,12}", 100)) {
        let codec = ColumnCodec::new();
        let bytes = codec.encode_strings(&values)?;
        let decoded = codec.decode_strings(&bytes)?;
        let expected: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
        prop_assert_eq!(decoded.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn roundtrip_repetitive_strings(values in repetitive_strings(200)) {
        let codec = ColumnCodec::new().with_hint(EncodingHint::Dictionary);
        let bytes = codec.encode_strings(&values)?;
        let decoded = codec.decode_strings(&bytes)?;
        let expected: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
        prop_assert_eq!(decoded.iter().collect::<Vec<_>>(), expected);
    }

    // =======================================================================
    // AGGREGATES: sums survive every numeric encoding path
    // =======================================================================

    #[test]
    fn sum_preserved_i64(values in column(-1_000_000_000i64..1_000_000_000, 200)) {
        let expected: i128 = values.iter().flatten().map(|&v| v as i128).sum();
        for hint in [EncodingHint::Auto, EncodingHint::Primitive, EncodingHint::Delta] {
            let codec = ColumnCodec::new().with_hint(hint);
            let bytes = codec.encode_numeric(&values)?;
            let decoded = codec.decode_numeric::<i64>(&bytes)?;
            let sum: i128 = decoded.options().flatten().map(|v| v as i128).sum();
            prop_assert_eq!(sum, expected);
        }
    }

    #[test]
    fn sum_preserved_f64(values in column(-1.0e9f64..1.0e9, 200)) {
        let expected: f64 = values.iter().flatten().sum();
        let codec = ColumnCodec::new();
        let bytes = codec.encode_numeric(&values)?;
        let decoded = codec.decode_numeric::<f64>(&bytes)?;
        let sum: f64 = decoded.options().flatten().sum();
        prop_assert_eq!(sum, expected);
    }

    // =======================================================================
    // BOOLEANS: count and positions of true values
    // =======================================================================

    #[test]
    fn true_positions_preserved(values in column(any::<bool>(), 300)) {
        let codec = ColumnCodec::new();
        let bytes = codec.encode_bools(&values)?;
        let decoded = codec.decode_bools(&bytes)?;

        let expected: Vec<usize> = values.iter().enumerate().filter(|(_, v)| **v == Some(true)).map(|(i, _)| i).collect();
        let actual: Vec<usize> = (0..decoded.len()).filter(|&i| decoded.get(i) == Some(true)).collect();
        prop_assert_eq!(decoded.count_true(), expected.len());
        prop_assert_eq!(actual, expected);
    }

    // =======================================================================
    // WIDTH MINIMALITY: bytes fit in bytes
    // =======================================================================

    #[test]
    fn byte_range_packs_to_eight_bits(values in proptest::collection::vec(-128i32..=127, 1..200)) {
        let column: Vec<Option<i32>> = values.iter().copied().map(Some).collect();
        let codec = ColumnCodec::new().with_hint(EncodingHint::Primitive);
        let bytes = codec.encode_numeric(&column)?;
        let meta = codec.metadata(&bytes)?;

        prop_assert_eq!(meta.kind, VectorKind::Primitive);
        prop_assert!(!meta.masked);
        let expected = if values.iter().any(|&v| v < 0) { Packing::I8 } else { Packing::U8 };
        prop_assert_eq!(meta.packing, Some(expected));
    }

    #[test]
    fn optimized_packing_never_wider_than_natural(values in column(any::<i32>(), 100)) {
        let mut vector = AppendableMaskedVector::<i32>::new(values.len());
        for &v in &values {
            vector.add_option(v)?;
        }
        let optimized = binvec::optimize(vector)?;
        prop_assert!(optimized.packing().width <= Packing::I32.width);
        prop_assert_eq!(optimized.is_masked(), values.iter().any(Option::is_none));
        prop_assert_eq!(optimized.options().collect::<Vec<_>>(), values);
    }

    // =======================================================================
    // FREEZE: an exactly sized bitmap is reused without copying
    // =======================================================================

    #[test]
    fn freeze_reuses_exact_bitmap(words in 1usize..8, short in 0usize..64) {
        let capacity = words * 64;
        let len = capacity - short;
        let mut vector = AppendableMaskedVector::<i32>::new(capacity);
        for i in 0..len {
            if i % 3 == 0 {
                vector.add_na()?;
            } else {
                vector.add_value(i as i32)?;
            }
        }
        let ptr = vector.as_bytes().as_ptr();
        let frozen = vector.freeze();
        prop_assert_eq!(frozen.as_bytes().as_ptr(), ptr);
        prop_assert_eq!(frozen.len(), len);
    }

    // =======================================================================
    // CAPACITY: appends past the declared maximum fail and change nothing
    // =======================================================================

    #[test]
    fn capacity_enforced_masked(values in column(any::<i32>(), 100), extra in proptest::option::of(any::<i32>())) {
        let mut vector = AppendableMaskedVector::<i32>::new(values.len());
        for &v in &values {
            vector.add_option(v)?;
        }
        let before = vector.as_bytes().to_vec();
        let result = vector.add_option(extra);
        prop_assert!(
            matches!(result, Err(VectorError::CapacityExceeded { .. })),
            "expected capacity error"
        );
        prop_assert_eq!(vector.len(), values.len());
        prop_assert_eq!(vector.as_bytes(), &before[..]);
    }

    #[test]
    fn capacity_enforced_primitive(values in proptest::collection::vec(any::<i64>(), 0..100), extra in any::<i64>()) {
        let mut vector = AppendablePrimitiveVector::<i64>::new(values.len());
        for &v in &values {
            vector.add_value(v)?;
        }
        prop_assert!(
            matches!(vector.add_value(extra), Err(VectorError::CapacityExceeded { .. })),
            "expected capacity error"
        );
        prop_assert_eq!(vector.len(), values.len());
        prop_assert_eq!(vector.freeze().iter().collect::<Vec<_>>(), values);
    }
}

// =======================================================================
// DETERMINISTIC SCENARIOS
// =======================================================================

#[test]
fn mixed_missing_scenario() {
    let codec = ColumnCodec::new();
    let values = vec![Some(1i32), None, Some(300), None, Some(-5)];
    let bytes = codec.encode_numeric(&values).unwrap();

    let meta = codec.metadata(&bytes).unwrap();
    assert_eq!(meta.kind, VectorKind::Masked);
    assert_eq!(meta.packing, Some(Packing::I16));

    let decoded = codec.decode_numeric::<i32>(&bytes).unwrap();
    assert_eq!(decoded.options().collect::<Vec<_>>(), values);
}

#[test]
fn frozen_vectors_read_concurrently() {
    let codec = ColumnCodec::new();
    let values: Vec<Option<i64>> = (0..10_000)
        .map(|i| if i % 7 == 0 { None } else { Some(i * 31) })
        .collect();
    let bytes = codec.encode_numeric(&values).unwrap();
    let decoded = codec.decode_numeric::<i64>(&bytes).unwrap();
    let expected: i64 = values.iter().flatten().sum();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| decoded.options().flatten().sum::<i64>()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn decode_rejects_garbage() {
    let codec = ColumnCodec::new();
    assert!(codec.decode(&[0xde, 0xad, 0xbe, 0xef, 0, 0]).is_err());

    let mut bytes = codec.encode_strings(&[Some("ok")]).unwrap();
    let last = bytes.len() - 1;
    bytes[last] = 0xFF;
    assert!(matches!(
        codec.decode_strings(&bytes),
        Err(VectorError::InvalidData(_))
    ));
}
