//! Update kind vocabulary recorded in manifests.

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::MetadataError;

/// How a parameter's new value is expressed relative to its previous value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateType {
    /// Full value; materializes with no history.
    Dense,
    /// New values scattered into a copy of the previous value.
    Sparse,
    /// Previous value plus a low-rank product.
    LowRank,
    /// Previous value scaled by a broadcast multiplier.
    Ia3,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Dense => "dense",
            UpdateType::Sparse => "sparse",
            UpdateType::LowRank => "low-rank",
            UpdateType::Ia3 => "ia3",
        }
    }

    /// Whether materialization needs the previous value (and so a
    /// `last_commit` anchor).
    pub fn is_incremental(&self) -> bool {
        !matches!(self, UpdateType::Dense)
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateType {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, MetadataError> {
        match s {
            "dense" => Ok(UpdateType::Dense),
            "sparse" => Ok(UpdateType::Sparse),
            "low-rank" => Ok(UpdateType::LowRank),
            "ia3" => Ok(UpdateType::Ia3),
            other => Err(MetadataError::MalformedRecord {
                name: String::new(),
                reason: format!("unknown update type {other:?}"),
            }),
        }
    }
}

impl Serialize for UpdateType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UpdateType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_roundtrip() {
        for ty in [
            UpdateType::Dense,
            UpdateType::Sparse,
            UpdateType::LowRank,
            UpdateType::Ia3,
        ] {
            assert_eq!(ty.as_str().parse::<UpdateType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_only_dense_is_self_contained() {
        assert!(!UpdateType::Dense.is_incremental());
        assert!(UpdateType::Sparse.is_incremental());
        assert!(UpdateType::LowRank.is_incremental());
        assert!(UpdateType::Ia3.is_incremental());
    }
}
