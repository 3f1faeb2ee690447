//! Update kinds for git-theta.
//!
//! An update kind is a strategy for expressing a tensor's new value given
//! its previous value: the full value (dense), new values scattered at a
//! few positions (sparse), a low-rank additive factorization (low-rank), or
//! a broadcast scaling vector (ia3). Each kind computes an update record at
//! clean time and applies one at smudge time; the two operations are
//! inverses up to the configured tolerances.

mod dense;
mod errors;
mod ia3;
mod low_rank;
mod record;
mod sparse;

use theta_metadata::UpdateType;

pub use dense::DenseUpdate;
pub use errors::{UpdateError, UpdateResult};
pub use ia3::Ia3Update;
pub use low_rank::LowRankUpdate;
pub use record::UpdateRecord;
pub use sparse::SparseUpdate;

use async_trait::async_trait;
use theta_params::Tensor;

/// Side inputs some kinds need beyond the two tensor values.
#[derive(Clone, Debug, Default)]
pub struct UpdateAux {
    /// Axes the ia3 multiplier is averaged over (and broadcast back along).
    pub broadcast_dims: Option<Vec<usize>>,
}

/// A strategy for representing one tensor's new value.
///
/// `apply_update(calculate_update(new, prev), prev)` reproduces `new` within
/// the kind's guarantees: bitwise for dense and sparse, within numeric
/// tolerance for low-rank and ia3. A kind that cannot encode a change
/// reports [`UpdateError::Inapplicable`]; callers never substitute dense on
/// its behalf.
#[async_trait]
pub trait Update: Send + Sync {
    /// The manifest vocabulary entry for this kind.
    fn update_type(&self) -> UpdateType;

    /// Exact set of tensor fields a record of this kind carries.
    fn required_keys(&self) -> &'static [&'static str];

    /// Compute the record expressing `new` given `previous`.
    async fn calculate_update(
        &self,
        new: &Tensor,
        previous: Option<&Tensor>,
        aux: &UpdateAux,
    ) -> UpdateResult<UpdateRecord>;

    /// Materialize the new value from a record and the previous value.
    async fn apply_update(
        &self,
        update: &UpdateRecord,
        previous: Option<&Tensor>,
    ) -> UpdateResult<Tensor>;
}

/// Look up the handler for an update type.
///
/// The registry is a fixed table populated at startup; there is no dynamic
/// discovery.
pub fn update_handler(update_type: UpdateType) -> &'static dyn Update {
    match update_type {
        UpdateType::Dense => &DenseUpdate,
        UpdateType::Sparse => &SparseUpdate,
        UpdateType::LowRank => &LowRankUpdate,
        UpdateType::Ia3 => &Ia3Update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_type() {
        for ty in [
            UpdateType::Dense,
            UpdateType::Sparse,
            UpdateType::LowRank,
            UpdateType::Ia3,
        ] {
            assert_eq!(update_handler(ty).update_type(), ty);
        }
    }
}
