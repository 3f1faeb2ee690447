//! Low-rank additive updates: `new = previous + R @ C`.

use async_trait::async_trait;
use ndarray::{Array2, ArrayD, Axis, Ix2};
use theta_metadata::UpdateType;
use theta_params::{Dtype, ParamError, Tensor};

use crate::{Update, UpdateAux, UpdateError, UpdateRecord, UpdateResult};

const KEYS: &[&str] = &["C", "R"];

/// Relative threshold below which a residual column counts as zero.
const RANK_TOLERANCE: f32 = 1e-5;

/// Factorizes the difference `new - previous` as an outer product of a tall
/// matrix `R` (m x r) and a wide matrix `C` (r x n).
///
/// The factorization is a deterministic column-pivoted Gram-Schmidt on the
/// difference, so equal inputs always produce equal records. Only 2-D float
/// tensors are encodable, and the kind refuses when the numerical rank
/// exceeds half of `min(m, n)` since the record would then be larger than
/// the difference itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct LowRankUpdate;

impl LowRankUpdate {
    /// User-facing helper to express a factorization as a record.
    pub fn format(r: Tensor, c: Tensor) -> UpdateRecord {
        let mut record = UpdateRecord::new();
        record.insert("R", r);
        record.insert("C", c);
        record
    }
}

#[async_trait]
impl Update for LowRankUpdate {
    fn update_type(&self) -> UpdateType {
        UpdateType::LowRank
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
        let previous = previous.ok_or(UpdateError::MissingPrevious(UpdateType::LowRank))?;
        if new.shape() != previous.shape() {
            return Err(ParamError::ShapeMismatch {
                expected: previous.shape().to_vec(),
                actual: new.shape().to_vec(),
            }
            .into());
        }
        let new_matrix = as_matrix(new)?;
        let prev_matrix = as_matrix(previous)?;
        let diff = &new_matrix - &prev_matrix;
        let (rows, cols) = diff.dim();
        let max_rank = rows.min(cols);

        let (basis, coeffs, rank) = pivoted_gram_schmidt(&diff);
        tracing::debug!(rank, rows, cols, "factorized low-rank update");
        if rank * 2 > max_rank {
            return Err(UpdateError::inapplicable(
                UpdateType::LowRank,
                format!("difference has rank {rank} of {max_rank}, not low-rank"),
            ));
        }

        let r = Tensor::from_f32(basis.into_dyn());
        let c = Tensor::from_f32(coeffs.into_dyn());
        Ok(Self::format(r, c))
    }

    async fn apply_update(
        &self,
        update: &UpdateRecord,
        previous: Option<&Tensor>,
    ) -> UpdateResult<Tensor> {
        update.validate_keys(UpdateType::LowRank, KEYS)?;
        let previous = previous.ok_or(UpdateError::MissingPrevious(UpdateType::LowRank))?;
        let r = as_matrix(update.require(UpdateType::LowRank, "R")?)?;
        let c = as_matrix(update.require(UpdateType::LowRank, "C")?)?;
        let prev_matrix = as_matrix(previous)?;

        if r.dim().0 != prev_matrix.dim().0 || c.dim().1 != prev_matrix.dim().1 || r.dim().1 != c.dim().0 {
            return Err(UpdateError::inapplicable(
                UpdateType::LowRank,
                format!(
                    "factor shapes {:?} x {:?} do not fit value shape {:?}",
                    r.dim(),
                    c.dim(),
                    prev_matrix.dim()
                ),
            ));
        }

        let out = &prev_matrix + &r.dot(&c);
        Ok(Tensor::from_f32_as(previous.dtype(), out.into_dyn())?)
    }
}

fn as_matrix(tensor: &Tensor) -> UpdateResult<Array2<f32>> {
    if tensor.dtype() == Dtype::I64 {
        return Err(ParamError::NotFloat(Dtype::I64).into());
    }
    let array: ArrayD<f32> = tensor.as_f32()?.clone();
    array
        .into_dimensionality::<Ix2>()
        .map_err(|_| UpdateError::inapplicable(UpdateType::LowRank, "tensor is not 2-D"))
}

/// Column-pivoted Gram-Schmidt factorization `D ~= Q * C`.
///
/// Returns the orthonormal basis (m x r), the coefficient rows (r x n), and
/// the numerical rank r. Rank zero yields empty factors, which apply back to
/// an unchanged value.
fn pivoted_gram_schmidt(diff: &Array2<f32>) -> (Array2<f32>, Array2<f32>, usize) {
    let (rows, cols) = diff.dim();
    let max_rank = rows.min(cols);
    let mut residual = diff.clone();
    let tolerance = RANK_TOLERANCE * frobenius_norm(diff).max(f32::MIN_POSITIVE);

    let mut basis: Vec<Array2<f32>> = Vec::new();
    let mut coeffs: Vec<Array2<f32>> = Vec::new();

    for _ in 0..max_rank {
        let (pivot, norm) = (0..cols)
            .map(|j| (j, column_norm(&residual, j)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .expect("at least one column");
        if norm <= tolerance {
            break;
        }
        let q = residual.column(pivot).mapv(|v| v / norm).insert_axis(Axis(1));
        // Coefficients of every column along q, then deflate.
        let c_row = q.t().dot(&residual);
        residual = &residual - &q.dot(&c_row);
        basis.push(q);
        coeffs.push(c_row);
    }

    let rank = basis.len();
    if rank == 0 {
        return (
            Array2::zeros((rows, 0)),
            Array2::zeros((0, cols)),
            0,
        );
    }
    let basis_views: Vec<_> = basis.iter().map(|q| q.view()).collect();
    let coeff_views: Vec<_> = coeffs.iter().map(|c| c.view()).collect();
    let q = ndarray::concatenate(Axis(1), &basis_views).expect("basis columns share height");
    let c = ndarray::concatenate(Axis(0), &coeff_views).expect("coefficient rows share width");
    (q, c, rank)
}

fn column_norm(matrix: &Array2<f32>, j: usize) -> f32 {
    matrix.column(j).iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn frobenius_norm(matrix: &Array2<f32>) -> f32 {
    matrix.iter().map(|v| v * v).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use ndarray::{arr2, Array2};

    use super::*;

    fn tensor(values: Array2<f32>) -> Tensor {
        Tensor::from_f32(values.into_dyn())
    }

    #[tokio::test]
    async fn test_rank_one_difference_roundtrips() {
        let prev = tensor(Array2::zeros((4, 6)));
        // Rank-1: outer product of [1,2,3,4] and [1,0,1,0,1,0].
        let u = [1.0f32, 2.0, 3.0, 4.0];
        let v = [1.0f32, 0.0, 1.0, 0.0, 1.0, 0.0];
        let mut new_values = Array2::zeros((4, 6));
        for i in 0..4 {
            for j in 0..6 {
                new_values[[i, j]] = u[i] * v[j];
            }
        }
        let new = tensor(new_values);

        let record = LowRankUpdate
            .calculate_update(&new, Some(&prev), &UpdateAux::default())
            .await
            .unwrap();
        assert_eq!(record.get("R").unwrap().shape(), &[4, 1]);
        assert_eq!(record.get("C").unwrap().shape(), &[1, 6]);

        let applied = LowRankUpdate
            .apply_update(&record, Some(&prev))
            .await
            .unwrap();
        assert!(applied.allclose(&new, 1e-5, 1e-5));
    }

    #[tokio::test]
    async fn test_unchanged_value_yields_rank_zero() {
        let prev = tensor(arr2(&[[1.0f32, 2.0], [3.0, 4.0]]));
        let record = LowRankUpdate
            .calculate_update(&prev.clone(), Some(&prev), &UpdateAux::default())
            .await
            .unwrap();
        assert_eq!(record.get("R").unwrap().shape(), &[2, 0]);
        let applied = LowRankUpdate
            .apply_update(&record, Some(&prev))
            .await
            .unwrap();
        assert!(applied.allclose(&prev, 1e-6, 1e-6));
    }

    #[tokio::test]
    async fn test_full_rank_difference_rejected() {
        let prev = tensor(Array2::zeros((4, 4)));
        // Identity difference has full rank 4.
        let new = tensor(Array2::from_diag_elem(4, 1.0));
        assert!(matches!(
            LowRankUpdate
                .calculate_update(&new, Some(&prev), &UpdateAux::default())
                .await,
            Err(UpdateError::Inapplicable { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_matrix_rejected() {
        let prev = Tensor::from_f32(ndarray::arr1(&[1.0f32, 2.0]).into_dyn());
        let new = Tensor::from_f32(ndarray::arr1(&[2.0f32, 3.0]).into_dyn());
        assert!(matches!(
            LowRankUpdate
                .calculate_update(&new, Some(&prev), &UpdateAux::default())
                .await,
            Err(UpdateError::Inapplicable { .. })
        ));
    }

    #[tokio::test]
    async fn test_mismatched_factors_rejected() {
        let prev = tensor(Array2::zeros((3, 3)));
        let record = LowRankUpdate::format(
            tensor(Array2::zeros((2, 1))),
            tensor(Array2::zeros((1, 3))),
        );
        assert!(matches!(
            LowRankUpdate.apply_update(&record, Some(&prev)).await,
            Err(UpdateError::Inapplicable { .. })
        ));
    }
}
