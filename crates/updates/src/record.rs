//! Update records: the named tensor fields a kind serializes.

use std::collections::{btree_map, BTreeMap};

use theta_metadata::UpdateType;
use theta_params::Tensor;

use crate::{UpdateError, UpdateResult};

/// Map of field name to tensor, the unit an update kind produces and
/// consumes. Fields are sorted so the serialized envelope is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateRecord(BTreeMap<String, Tensor>);

impl UpdateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) {
        self.0.insert(key.into(), tensor);
    }

    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.0.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Tensor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fetch a required field, reporting the owning kind on absence.
    pub fn require(&self, update_type: UpdateType, key: &'static str) -> UpdateResult<&Tensor> {
        self.get(key)
            .ok_or(UpdateError::MissingKey { update_type, key })
    }

    /// Check the record carries exactly the given fields.
    pub fn validate_keys(
        &self,
        update_type: UpdateType,
        required: &'static [&'static str],
    ) -> UpdateResult<()> {
        for key in required {
            if !self.0.contains_key(*key) {
                return Err(UpdateError::MissingKey { update_type, key });
            }
        }
        for key in self.0.keys() {
            if !required.contains(&key.as_str()) {
                return Err(UpdateError::UnexpectedKey {
                    update_type,
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, Tensor)> for UpdateRecord {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for UpdateRecord {
    type Item = (String, Tensor);
    type IntoIter = btree_map::IntoIter<String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    fn tensor() -> Tensor {
        Tensor::from_f32(arr1(&[1.0f32]).into_dyn())
    }

    #[test]
    fn test_validate_keys_exact_match() {
        let mut record = UpdateRecord::new();
        record.insert("values", tensor());
        record.insert("indices", tensor());
        assert!(record
            .validate_keys(UpdateType::Sparse, &["values", "indices"])
            .is_ok());
    }

    #[test]
    fn test_validate_keys_missing() {
        let mut record = UpdateRecord::new();
        record.insert("values", tensor());
        assert!(matches!(
            record.validate_keys(UpdateType::Sparse, &["values", "indices"]),
            Err(UpdateError::MissingKey { key: "indices", .. })
        ));
    }

    #[test]
    fn test_validate_keys_unexpected() {
        let mut record = UpdateRecord::new();
        record.insert("parameter", tensor());
        record.insert("extra", tensor());
        assert!(matches!(
            record.validate_keys(UpdateType::Dense, &["parameter"]),
            Err(UpdateError::UnexpectedKey { .. })
        ));
    }
}
