//! Voxel spacing values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{TypeError, TypeResult};

/// Physical edge length of one voxel, in angstrom.
///
/// Always positive and finite, rounded to three decimals on construction, so
/// two spacings compare equal exactly when their rounded values match.
#[derive(Clone, Copy, Debug)]
pub struct VoxelSize(f64);

impl VoxelSize {
    /// Round `value` to three decimals. Fails unless both the input and the
    /// rounded result are positive and finite.
    pub fn new(value: f64) -> TypeResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(TypeError::InvalidVoxelSize(value));
        }
        let rounded = (value * 1000.0).round() / 1000.0;
        if !rounded.is_finite() || rounded <= 0.0 {
            return Err(TypeError::InvalidVoxelSize(value));
        }
        Ok(Self(rounded))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for VoxelSize {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for VoxelSize {}

impl Hash for VoxelSize {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for VoxelSize {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VoxelSize {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for VoxelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl TryFrom<f64> for VoxelSize {
    type Error = TypeError;

    fn try_from(value: f64) -> TypeResult<Self> {
        Self::new(value)
    }
}

impl From<VoxelSize> for f64 {
    fn from(v: VoxelSize) -> Self {
        v.0
    }
}

impl FromStr for VoxelSize {
    type Err = TypeError;

    fn from_str(s: &str) -> TypeResult<Self> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| TypeError::Parse(format!("invalid voxel size: {s:?}")))?;
        Self::new(value)
    }
}

impl Serialize for VoxelSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for VoxelSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Map keys arrive as strings, plain values as numbers.
        deserializer.deserialize_any(VoxelSizeVisitor)
    }
}

struct VoxelSizeVisitor;

impl Visitor<'_> for VoxelSizeVisitor {
    type Value = VoxelSize;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a positive voxel size as a number or numeric string")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<VoxelSize, E> {
        VoxelSize::new(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<VoxelSize, E> {
        self.visit_f64(v as f64)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<VoxelSize, E> {
        self.visit_f64(v as f64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<VoxelSize, E> {
        v.parse().map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn rounds_to_three_decimals() {
        assert_eq!(VoxelSize::new(10.0004).unwrap(), VoxelSize::new(10.0).unwrap());
        assert_ne!(VoxelSize::new(10.001).unwrap(), VoxelSize::new(10.0).unwrap());
        assert_eq!(VoxelSize::new(7.8416).unwrap().to_string(), "7.842");
    }

    #[test]
    fn rejects_non_positive() {
        assert!(VoxelSize::new(0.0).is_err());
        assert!(VoxelSize::new(-1.0).is_err());
        assert!(VoxelSize::new(0.0001).is_err());
        assert!(VoxelSize::new(f64::NAN).is_err());
        assert!(VoxelSize::new(f64::INFINITY).is_err());
    }

    #[test]
    fn rejects_values_that_overflow_when_rounded() {
        assert!(matches!(
            VoxelSize::new(1e306),
            Err(TypeError::InvalidVoxelSize(_))
        ));
        assert!(VoxelSize::new(f64::MAX).is_err());
        assert!(VoxelSize::new(1e300).is_ok());
    }

    #[test]
    fn deserializes_from_number_and_map_key() {
        let v: VoxelSize = serde_json::from_str("10").unwrap();
        assert_eq!(v.get(), 10.0);

        let map: BTreeMap<VoxelSize, Vec<String>> =
            serde_json::from_str(r#"{"10.0": ["wbp"], "7.84": ["denoised"]}"#).unwrap();
        let keys: Vec<f64> = map.keys().map(|k| k.get()).collect();
        assert_eq!(keys, vec![7.84, 10.0]);
    }

    proptest! {
        #[test]
        fn rounding_is_idempotent(v in 0.001f64..1e4) {
            let once = VoxelSize::new(v).unwrap();
            let twice = VoxelSize::new(once.get()).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
