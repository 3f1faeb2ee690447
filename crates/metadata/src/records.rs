//! Per-parameter manifest records.

use serde::{Deserialize, Serialize};
use theta_params::{CommitHash, Oid, Tensor};

use crate::UpdateType;

/// Identity of the materialized tensor value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorMetadata {
    /// Canonical shape.
    pub shape: Vec<u64>,
    /// Canonical dtype string.
    pub dtype: String,
    /// Content hash of the logical tensor after applying all updates.
    pub hash: Oid,
}

impl TensorMetadata {
    pub fn from_tensor(tensor: &Tensor) -> Self {
        Self {
            shape: tensor.shape().iter().map(|d| *d as u64).collect(),
            dtype: tensor.dtype().as_str().to_owned(),
            hash: tensor.content_hash(),
        }
    }
}

/// Reference to the stored update object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfsMetadata {
    /// Content address used to retrieve the serialized update.
    pub oid: Oid,
    /// Size of the stored object in bytes.
    pub size: u64,
}

/// How this entry relates to history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThetaMetadata {
    /// Update kind recorded for this entry.
    pub update_type: UpdateType,
    /// Commit at which the previous value was recorded; required by every
    /// incremental kind, absent for dense entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<CommitHash>,
}

/// The full manifest record for one parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamMetadata {
    pub tensor_metadata: TensorMetadata,
    pub lfs_metadata: LfsMetadata,
    pub theta_metadata: ThetaMetadata,
}

impl ParamMetadata {
    /// Manifest equality for change detection and merge classification is
    /// equality of the materialized value's hash.
    pub fn same_value(&self, other: &ParamMetadata) -> bool {
        self.tensor_metadata.hash == other.tensor_metadata.hash
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;
    use theta_params::Tensor;

    use super::*;

    #[test]
    fn test_tensor_metadata_captures_identity() {
        let t = Tensor::from_f32(arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn());
        let meta = TensorMetadata::from_tensor(&t);
        assert_eq!(meta.shape, vec![2, 2]);
        assert_eq!(meta.dtype, "float32");
        assert_eq!(meta.hash, t.content_hash());
    }

    #[test]
    fn test_same_value_ignores_storage() {
        let t = Tensor::from_f32(arr2(&[[1.0f32]]).into_dyn());
        let tensor_metadata = TensorMetadata::from_tensor(&t);
        let a = ParamMetadata {
            tensor_metadata: tensor_metadata.clone(),
            lfs_metadata: LfsMetadata {
                oid: Oid::new([0u8; 32]),
                size: 10,
            },
            theta_metadata: ThetaMetadata {
                update_type: UpdateType::Dense,
                last_commit: None,
            },
        };
        let b = ParamMetadata {
            tensor_metadata,
            lfs_metadata: LfsMetadata {
                oid: Oid::new([1u8; 32]),
                size: 99,
            },
            theta_metadata: ThetaMetadata {
                update_type: UpdateType::Sparse,
                last_commit: Some(CommitHash::new([2u8; 20])),
            },
        };
        assert!(a.same_value(&b));
    }
}
