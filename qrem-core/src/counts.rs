//! Counts-vector conversions
//!
//! Measurement backends report observed bitstrings as a sparse
//! `label -> count` mapping. The numerics in this crate work on dense
//! vectors indexed by basis-state value, so every component funnels through
//! the conversions here.
//!
//! Convention: a basis label is a string of '0'/'1' characters whose
//! leftmost character is the most significant bit; the index of a label in
//! a dense vector is its value read as a binary integer.

use crate::error::{MitigationError, Result};
use ndarray::{Array1, ArrayView1};
use std::collections::HashMap;

/// Observed or corrected measurement counts keyed by basis label.
///
/// Raw counts from a backend are integral. Corrected counts may be
/// fractional or negative; a negative value is a legitimate result of
/// exact inversion, not an error.
pub type Counts = HashMap<String, f64>;

/// Check that `label` is a well-formed basis label of `n_bits` binary digits.
pub fn validate_label(label: &str, n_bits: usize) -> Result<()> {
    if label.len() != n_bits || !label.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(MitigationError::MalformedLabel {
            label: label.to_string(),
            expected: n_bits,
        });
    }
    Ok(())
}

/// Basis-state value of a label, leftmost character most significant.
pub fn label_to_index(label: &str) -> Result<usize> {
    let mut index = 0usize;
    for b in label.bytes() {
        index = (index << 1)
            | match b {
                b'0' => 0,
                b'1' => 1,
                _ => {
                    return Err(MitigationError::MalformedLabel {
                        label: label.to_string(),
                        expected: label.len(),
                    })
                }
            };
    }
    Ok(index)
}

/// Label of a basis-state value at a fixed width.
pub fn index_to_label(index: usize, n_bits: usize) -> String {
    format!("{:0width$b}", index, width = n_bits)
}

/// Value of the sub-label at byte span `[start, start + len)`.
///
/// Assumes `bytes` has already been validated as a binary label.
pub(crate) fn span_index(bytes: &[u8], start: usize, len: usize) -> usize {
    let mut index = 0usize;
    for &b in &bytes[start..start + len] {
        index = (index << 1) | usize::from(b == b'1');
    }
    index
}

/// Total number of observations in a counts mapping.
pub fn total_counts(counts: &Counts) -> f64 {
    counts.values().sum()
}

/// Common label width of a counts mapping, or `None` when it is empty.
///
/// Fails with [`MitigationError::MalformedLabel`] if any key contains a
/// non-binary character or the keys disagree on width.
pub fn infer_width(counts: &Counts) -> Result<Option<usize>> {
    let mut width: Option<usize> = None;
    for label in counts.keys() {
        match width {
            None => {
                validate_label(label, label.len())?;
                width = Some(label.len());
            }
            Some(w) => validate_label(label, w)?,
        }
    }
    Ok(width)
}

/// Expand a counts mapping into a dense vector over all `2^n_bits` labels.
///
/// Labels absent from the mapping contribute 0. Fails with
/// [`MitigationError::MalformedLabel`] if any key has length != `n_bits` or
/// a character other than '0'/'1'.
pub fn counts_to_vector(counts: &Counts, n_bits: usize) -> Result<Array1<f64>> {
    let dim = 1usize << n_bits;
    let mut vector = Array1::zeros(dim);
    for (label, &count) in counts {
        validate_label(label, n_bits)?;
        let index = label_to_index(label)?;
        vector[index] += count;
    }
    Ok(vector)
}

/// Collapse a dense vector back into a sparse counts mapping.
///
/// Entries that are exactly zero are dropped so corrected output is not
/// polluted with spurious zero-count labels; every nonzero entry is kept,
/// including negative ones.
pub fn vector_to_counts(vector: ArrayView1<f64>, n_bits: usize) -> Counts {
    debug_assert_eq!(vector.len(), 1usize << n_bits);
    let mut counts = Counts::new();
    for (index, &value) in vector.iter().enumerate() {
        if value != 0.0 {
            counts.insert(index_to_label(index, n_bits), value);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts_of(pairs: &[(&str, f64)]) -> Counts {
        pairs.iter().map(|(l, c)| (l.to_string(), *c)).collect()
    }

    #[test]
    fn test_label_round_trip() {
        assert_eq!(index_to_label(0, 3), "000");
        assert_eq!(index_to_label(5, 3), "101");
        assert_eq!(label_to_index("101").unwrap(), 5);
        assert_eq!(label_to_index("0001").unwrap(), 1);
    }

    #[test]
    fn test_validate_label_rejects_bad_shape() {
        assert!(validate_label("010", 3).is_ok());
        assert!(matches!(
            validate_label("01", 3),
            Err(MitigationError::MalformedLabel { .. })
        ));
        assert!(matches!(
            validate_label("0120", 4),
            Err(MitigationError::MalformedLabel { .. })
        ));
        // from_str_radix would tolerate a leading sign; we must not
        assert!(validate_label("+1", 2).is_err());
    }

    #[test]
    fn test_counts_to_vector_basic() {
        let counts = counts_of(&[("00", 600.0), ("11", 400.0)]);
        let vector = counts_to_vector(&counts, 2).unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(vector[0], 600.0);
        assert_eq!(vector[1], 0.0);
        assert_eq!(vector[2], 0.0);
        assert_eq!(vector[3], 400.0);
    }

    #[test]
    fn test_counts_to_vector_rejects_malformed() {
        let counts = counts_of(&[("00", 1.0), ("012", 2.0)]);
        assert!(counts_to_vector(&counts, 2).is_err());

        let counts = counts_of(&[("0x", 1.0)]);
        assert!(matches!(
            counts_to_vector(&counts, 2),
            Err(MitigationError::MalformedLabel { .. })
        ));
    }

    #[test]
    fn test_vector_to_counts_drops_exact_zeros() {
        let vector = ndarray::arr1(&[12.0, 0.0, -3.5, 1e-12]);
        let counts = vector_to_counts(vector.view(), 2);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts["00"], 12.0);
        assert_eq!(counts["10"], -3.5);
        // tiny but nonzero entries are preserved verbatim
        assert_eq!(counts["11"], 1e-12);
        assert!(!counts.contains_key("01"));
    }

    #[test]
    fn test_round_trip_exact() {
        let counts = counts_of(&[("000", 17.0), ("101", 4130.0), ("111", 1.0)]);
        let vector = counts_to_vector(&counts, 3).unwrap();
        let back = vector_to_counts(vector.view(), 3);
        assert_eq!(back, counts);
    }

    #[test]
    fn test_infer_width() {
        assert_eq!(infer_width(&Counts::new()).unwrap(), None);

        let counts = counts_of(&[("01", 1.0), ("10", 2.0)]);
        assert_eq!(infer_width(&counts).unwrap(), Some(2));

        let counts = counts_of(&[("01", 1.0), ("100", 2.0)]);
        assert!(infer_width(&counts).is_err());
    }

    #[test]
    fn test_span_index() {
        let bytes = b"01101";
        assert_eq!(span_index(bytes, 0, 2), 1);
        assert_eq!(span_index(bytes, 1, 3), 6);
        assert_eq!(span_index(bytes, 4, 1), 1);
    }

    #[test]
    fn test_total_counts() {
        let counts = counts_of(&[("0", 500.5), ("1", 499.5)]);
        assert_eq!(total_counts(&counts), 1000.0);
    }
}
