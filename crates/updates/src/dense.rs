//! Full-value updates.

use async_trait::async_trait;
use theta_metadata::UpdateType;
use theta_params::Tensor;

use crate::{Update, UpdateAux, UpdateRecord, UpdateResult};

const KEYS: &[&str] = &["parameter"];

/// The materialization point: the record is the value.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseUpdate;

impl DenseUpdate {
    /// User-facing helper to express a full value as a record.
    pub fn format(parameter: Tensor) -> UpdateRecord {
        let mut record = UpdateRecord::new();
        record.insert("parameter", parameter);
        record
    }
}

#[async_trait]
impl Update for DenseUpdate {
    fn update_type(&self) -> UpdateType {
        UpdateType::Dense
    }

    fn required_keys(&self) -> &'static [&'static str] {
        KEYS
    }

    async fn calculate_update(
        &self,
        new: &Tensor,
        _previous: Option<&Tensor>,
        _aux: &UpdateAux,
    ) -> UpdateResult<UpdateRecord> {
        Ok(Self::format(new.clone()))
    }

    async fn apply_update(
        &self,
        update: &UpdateRecord,
        _previous: Option<&Tensor>,
    ) -> UpdateResult<Tensor> {
        update.validate_keys(UpdateType::Dense, KEYS)?;
        Ok(update
            .require(UpdateType::Dense, "parameter")?
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[tokio::test]
    async fn test_dense_ignores_previous() {
        let new = Tensor::from_f32(arr1(&[5.0f32, 6.0]).into_dyn());
        let prev = Tensor::from_f32(arr1(&[1.0f32, 2.0]).into_dyn());
        let record = DenseUpdate
            .calculate_update(&new, Some(&prev), &UpdateAux::default())
            .await
            .unwrap();
        let applied = DenseUpdate.apply_update(&record, None).await.unwrap();
        assert_eq!(applied, new);
    }

    #[tokio::test]
    async fn test_dense_roundtrip_without_previous() {
        let new = Tensor::from_f32(arr1(&[0.25f32]).into_dyn());
        let record = DenseUpdate
            .calculate_update(&new, None, &UpdateAux::default())
            .await
            .unwrap();
        assert_eq!(
            DenseUpdate.apply_update(&record, None).await.unwrap(),
            new
        );
    }
}
