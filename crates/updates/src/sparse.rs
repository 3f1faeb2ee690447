//! Scatter updates: new values at the positions that changed.

use async_trait::async_trait;
use ndarray::{ArrayD, IxDyn};
use theta_metadata::UpdateType;
use theta_params::{ParamError, Tensor};

use crate::{Update, UpdateAux, UpdateError, UpdateRecord, UpdateResult};

const KEYS: &[&str] = &["indices", "values"];

/// Positions are flat indices in logical (row-major) order; `values` are the
/// new values at those positions, so application is an exact scatter.
///
/// The kind always proceeds: a diff touching every element produces a
/// degenerate record that lists every position, which is valid if pointless.
#[derive(Clone, Copy, Debug, Default)]
pub struct SparseUpdate;

impl SparseUpdate {
    /// User-facing helper to express a scatter as a record.
    pub fn format(values: Tensor, indices: Tensor) -> UpdateRecord {
        let mut record = UpdateRecord::new();
        record.insert("values", values);
        record.insert("indices", indices);
        record
    }
}

#[async_trait]
impl Update for SparseUpdate {
    fn update_type(&self) -> UpdateType {
        UpdateType::Sparse
    }

    fn required_keys(&self) -> &'static [&'static str] {
        KEYS
    }

    async fn calculate_update(
        &self,
        new: &Tensor,
        previous: Option<&Tensor>,
        _aux: &UpdateAux,
    ) -> UpdateResult<UpdateRecord> {
        let previous = previous.ok_or(UpdateError::MissingPrevious(UpdateType::Sparse))?;
        if new.shape() != previous.shape() {
            return Err(ParamError::ShapeMismatch {
                expected: previous.shape().to_vec(),
                actual: new.shape().to_vec(),
            }
            .into());
        }
        if new.dtype() != previous.dtype() {
            return Err(UpdateError::inapplicable(
                UpdateType::Sparse,
                format!(
                    "dtype changed from {} to {}",
                    previous.dtype(),
                    new.dtype()
                ),
            ));
        }
        let new_values = new.as_f32()?;
        let prev_values = previous.as_f32()?;

        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (i, (n, p)) in new_values.iter().zip(prev_values.iter()).enumerate() {
            // Bitwise comparison so sign-of-zero and NaN edits are captured.
            if n.to_bits() != p.to_bits() {
                indices.push(i as i64);
                values.push(*n);
            }
        }
        tracing::debug!(
            changed = indices.len(),
            total = new.len(),
            "computed sparse update"
        );

        let count = indices.len();
        let values = Tensor::from_f32_as(
            new.dtype(),
            ArrayD::from_shape_vec(IxDyn(&[count]), values).expect("vec length matches"),
        )?;
        let indices = Tensor::from_i64(
            ArrayD::from_shape_vec(IxDyn(&[count]), indices).expect("vec length matches"),
        );
        Ok(Self::format(values, indices))
    }

    async fn apply_update(
        &self,
        update: &UpdateRecord,
        previous: Option<&Tensor>,
    ) -> UpdateResult<Tensor> {
        update.validate_keys(UpdateType::Sparse, KEYS)?;
        let previous = previous.ok_or(UpdateError::MissingPrevious(UpdateType::Sparse))?;
        let values = update.require(UpdateType::Sparse, "values")?;
        let indices = update.require(UpdateType::Sparse, "indices")?;

        let mut out: Vec<f32> = previous.as_f32()?.iter().copied().collect();
        for (idx, value) in indices.as_i64()?.iter().zip(values.as_f32()?.iter()) {
            let idx = usize::try_from(*idx).map_err(|_| {
                UpdateError::inapplicable(UpdateType::Sparse, format!("negative index {idx}"))
            })?;
            if idx >= out.len() {
                return Err(UpdateError::inapplicable(
                    UpdateType::Sparse,
                    format!("index {idx} out of bounds for {} elements", out.len()),
                ));
            }
            out[idx] = *value;
        }
        let array = ArrayD::from_shape_vec(IxDyn(previous.shape()), out)
            .expect("vec rebuilt from previous shape");
        Ok(Tensor::from_f32_as(values.dtype(), array)?)
    }
}
