//! Fixed-length face descriptor type.
//!
//! Every descriptor in the system — enrolled or freshly extracted — is
//! exactly [`DESCRIPTOR_DIM`] floats. The constructor enforces this, so
//! two constructed descriptors are always comparable; raw vectors from
//! the wire or storage go through [`Descriptor::new`] and surface a
//! wrong-length vector as [`DescriptorError::WrongLength`] instead of a
//! silent sentinel distance.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical descriptor dimension (dlib-style 128-d face embeddings).
pub const DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor has {actual} values, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
}

/// A 128-dimensional face embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    /// Build a descriptor, validating the dimension.
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::WrongLength {
                expected: DESCRIPTOR_DIM,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean distance to another descriptor.
    ///
    /// Both sides are dimension-checked at construction, so the zip
    /// never truncates.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(d: Descriptor) -> Self {
        d.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32) -> Descriptor {
        Descriptor::new(vec![value; DESCRIPTOR_DIM]).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = Descriptor::new(vec![0.0; 64]).unwrap_err();
        assert_eq!(
            err,
            DescriptorError::WrongLength {
                expected: DESCRIPTOR_DIM,
                actual: 64
            }
        );
    }

    #[test]
    fn test_new_accepts_canonical_length() {
        assert!(Descriptor::new(vec![0.5; DESCRIPTOR_DIM]).is_ok());
    }

    #[test]
    fn test_distance_zero_for_identical() {
        let a = constant(0.25);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        // Differ by 0.1 in every one of 128 dimensions:
        // sqrt(128 * 0.01) = sqrt(1.28)
        let a = constant(0.0);
        let b = constant(0.1);
        let expected = (128.0f32 * 0.01).sqrt();
        assert!((a.distance(&b) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = constant(0.2);
        let b = constant(0.7);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn test_serde_round_trip() {
        let a = constant(0.5);
        let json = serde_json::to_string(&a).unwrap();
        let back: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn test_serde_rejects_short_vector() {
        let json = serde_json::to_string(&vec![0.5f32; 127]).unwrap();
        let result: Result<Descriptor, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }
}
