//! Broadcast-scaling updates: `new = previous * ia3`.

use async_trait::async_trait;
use ndarray::{ArrayD, Axis};
use theta_metadata::UpdateType;
use theta_params::{ParamError, Tensor};

use crate::{Update, UpdateAux, UpdateError, UpdateRecord, UpdateResult};

const KEYS: &[&str] = &["ia3"];

/// A scalar multiplier per broadcast position.
///
/// The multiplier is the mean of the elementwise quotients `new / previous`
/// over the broadcast axes. Positions where the previous value is zero are
/// excluded from the mean; a reduction group that is zero everywhere yields
/// a zero multiplier. This kind is selected manually, so missing broadcast
/// axes are inapplicable rather than defaulted.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ia3Update;

impl Ia3Update {
    /// User-facing helper to express a multiplier as a record.
    pub fn format(ia3: Tensor) -> UpdateRecord {
        let mut record = UpdateRecord::new();
        record.insert("ia3", ia3);
        record
    }
}

#[async_trait]
impl Update for Ia3Update {
    fn update_type(&self) -> UpdateType {
        UpdateType::Ia3
    }

    fn required_keys(&self) -> &'static [&'static str] {
        KEYS
    }

    async fn calculate_update(
        &self,
        new: &Tensor,
        previous: Option<&Tensor>,
        aux: &UpdateAux,
    ) -> UpdateResult<UpdateRecord> {
        let previous = previous.ok_or(UpdateError::MissingPrevious(UpdateType::Ia3))?;
        let broadcast_dims = aux.broadcast_dims.as_deref().ok_or_else(|| {
            UpdateError::inapplicable(UpdateType::Ia3, "no broadcast dims configured")
        })?;
        if new.shape() != previous.shape() {
            return Err(ParamError::ShapeMismatch {
                expected: previous.shape().to_vec(),
                actual: new.shape().to_vec(),
            }
            .into());
        }
        let rank = new.shape().len();
        if let Some(bad) = broadcast_dims.iter().find(|d| **d >= rank) {
            return Err(UpdateError::inapplicable(
                UpdateType::Ia3,
                format!("broadcast dim {bad} out of range for rank {rank}"),
            ));
        }
        let new_values = new.as_f32()?;
        let prev_values = previous.as_f32()?;

        // Quotients where the previous value is nonzero, zero elsewhere.
        let mask = prev_values.mapv(|p| if p != 0.0 { 1.0f32 } else { 0.0 });
        let mut quotients = new_values.clone();
        ndarray::Zip::from(&mut quotients)
            .and(prev_values)
            .for_each(|q, p| {
                *q = if *p != 0.0 { *q / *p } else { 0.0 };
            });

        let counts = sum_keepdims(&mask, broadcast_dims);
        let sums = sum_keepdims(&quotients, broadcast_dims);
        let mut multiplier = sums;
        ndarray::Zip::from(&mut multiplier)
            .and(&counts)
            .for_each(|m, c| {
                *m = if *c != 0.0 { *m / *c } else { 0.0 };
            });

        Ok(Self::format(Tensor::from_f32(multiplier)))
    }

    async fn apply_update(
        &self,
        update: &UpdateRecord,
        previous: Option<&Tensor>,
    ) -> UpdateResult<Tensor> {
        update.validate_keys(UpdateType::Ia3, KEYS)?;
        let previous = previous.ok_or(UpdateError::MissingPrevious(UpdateType::Ia3))?;
        let multiplier = update.require(UpdateType::Ia3, "ia3")?;
        let prev_values = previous.as_f32()?;
        let scale = multiplier.as_f32()?;
        let scale_view = scale.broadcast(prev_values.raw_dim()).ok_or_else(|| {
            UpdateError::inapplicable(
                UpdateType::Ia3,
                format!(
                    "multiplier shape {:?} does not broadcast to {:?}",
                    multiplier.shape(),
                    previous.shape()
                ),
            )
        })?;
        let out = prev_values * &scale_view;
        Ok(Tensor::from_f32_as(previous.dtype(), out)?)
    }
}

/// Sum over `dims`, keeping each reduced axis as a length-1 dimension.
fn sum_keepdims(values: &ArrayD<f32>, dims: &[usize]) -> ArrayD<f32> {
    let mut sorted: Vec<usize> = dims.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut out = values.clone();
    for &axis in sorted.iter().rev() {
        out = out.sum_axis(Axis(axis)).insert_axis(Axis(axis));
    }
    out
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    fn aux(dims: &[usize]) -> UpdateAux {
        UpdateAux {
            broadcast_dims: Some(dims.to_vec()),
        }
    }

    #[tokio::test]
    async fn test_columnwise_doubling() {
        let prev = Tensor::from_f32(arr2(&[[2.0f32, 4.0], [6.0, 8.0]]).into_dyn());
        let new = Tensor::from_f32(arr2(&[[4.0f32, 8.0], [12.0, 16.0]]).into_dyn());
        let record = Ia3Update
            .calculate_update(&new, Some(&prev), &aux(&[1]))
            .await
            .unwrap();

        let ia3 = record.get("ia3").unwrap();
        assert_eq!(ia3.shape(), &[2, 1]);
        assert_eq!(ia3.as_f32().unwrap()[[0, 0]], 2.0);
        assert_eq!(ia3.as_f32().unwrap()[[1, 0]], 2.0);

        let applied = Ia3Update.apply_update(&record, Some(&prev)).await.unwrap();
        assert_eq!(applied, new);
    }

    #[tokio::test]
    async fn test_zero_previous_yields_zero_multiplier() {
        let prev = Tensor::from_f32(arr1(&[0.0f32, 0.0]).into_dyn());
        let new = Tensor::from_f32(arr1(&[5.0f32, 7.0]).into_dyn());
        let record = Ia3Update
            .calculate_update(&new, Some(&prev), &aux(&[0]))
            .await
            .unwrap();
        assert_eq!(record.get("ia3").unwrap().as_f32().unwrap()[[0]], 0.0);
    }

    #[tokio::test]
    async fn test_partial_zeros_excluded_from_mean() {
        // Second column is zero in previous; multiplier averages only the
        // first column's quotient.
        let prev = Tensor::from_f32(arr2(&[[2.0f32, 0.0]]).into_dyn());
        let new = Tensor::from_f32(arr2(&[[6.0f32, 1.0]]).into_dyn());
        let record = Ia3Update
            .calculate_update(&new, Some(&prev), &aux(&[1]))
            .await
            .unwrap();
        assert_eq!(record.get("ia3").unwrap().as_f32().unwrap()[[0, 0]], 3.0);
    }

    #[tokio::test]
    async fn test_missing_broadcast_dims_inapplicable() {
        let prev = Tensor::from_f32(arr1(&[1.0f32]).into_dyn());
        let new = Tensor::from_f32(arr1(&[2.0f32]).into_dyn());
        assert!(matches!(
            Ia3Update
                .calculate_update(&new, Some(&prev), &UpdateAux::default())
                .await,
            Err(UpdateError::Inapplicable { .. })
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_dim_inapplicable() {
        let prev = Tensor::from_f32(arr1(&[1.0f32]).into_dyn());
        let new = Tensor::from_f32(arr1(&[2.0f32]).into_dyn());
        assert!(matches!(
            Ia3Update.calculate_update(&new, Some(&prev), &aux(&[3])).await,
            Err(UpdateError::Inapplicable { .. })
        ));
    }
}
