//! Per-parameter three-way state classification.

use theta_metadata::ParamMetadata;

/// What happened to one parameter across the two branches.
///
/// `A` is our branch, `B` is theirs. Classification is symmetric: swapping
/// the current and other inputs swaps the A- and B-suffixed states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MergeState {
    Equal,
    ChangedA,
    ChangedB,
    ChangedBoth,
    AddedA,
    AddedB,
    AddedBoth,
    DeletedA,
    DeletedB,
    DeletedBoth,
}

impl MergeState {
    /// Human description shown above the action menu.
    pub fn description(&self) -> &'static str {
        match self {
            MergeState::Equal => "All parameter values are equal.",
            MergeState::ChangedA => "We changed this parameter.",
            MergeState::ChangedB => "They changed this parameter.",
            MergeState::ChangedBoth => "Both them and us changed this parameter.",
            MergeState::AddedA => "We added this parameter.",
            MergeState::AddedB => "They added this parameter.",
            MergeState::AddedBoth => "Both them and us added this parameter.",
            MergeState::DeletedA => "We deleted this parameter.",
            MergeState::DeletedB => "They deleted this parameter.",
            MergeState::DeletedBoth => "Both them and us deleted this parameter.",
        }
    }

    /// States that resolve without user input.
    pub fn auto_resolves(&self) -> bool {
        matches!(self, MergeState::Equal | MergeState::DeletedBoth)
    }
}

fn same(a: Option<&ParamMetadata>, b: Option<&ParamMetadata>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_value(b),
        _ => false,
    }
}

/// Classify the (ancestor, current, other) triple.
///
/// Equality is value-hash equality. The divergent-add case gets its own
/// state; it solicits resolution exactly like a divergent change.
pub fn infer_state(
    ancestor: Option<&ParamMetadata>,
    current: Option<&ParamMetadata>,
    other: Option<&ParamMetadata>,
) -> MergeState {
    if same(ancestor, current) && same(current, other) {
        return MergeState::Equal;
    }
    if same(ancestor, other) && !same(current, ancestor) {
        return if ancestor.is_none() {
            MergeState::AddedA
        } else if current.is_none() {
            MergeState::DeletedA
        } else {
            MergeState::ChangedA
        };
    }
    if same(ancestor, current) && !same(current, other) {
        return if ancestor.is_none() {
            MergeState::AddedB
        } else if other.is_none() {
            MergeState::DeletedB
        } else {
            MergeState::ChangedB
        };
    }
    if current.is_none() && other.is_none() {
        return MergeState::DeletedBoth;
    }
    if ancestor.is_none() {
        return MergeState::AddedBoth;
    }
    MergeState::ChangedBoth
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;
    use theta_metadata::{LfsMetadata, TensorMetadata, ThetaMetadata, UpdateType};
    use theta_params::{Oid, Tensor};

    use super::*;

    fn entry(value: f32) -> ParamMetadata {
        let t = Tensor::from_f32(arr1(&[value]).into_dyn());
        ParamMetadata {
            tensor_metadata: TensorMetadata::from_tensor(&t),
            lfs_metadata: LfsMetadata {
                oid: Oid::new([0u8; 32]),
                size: 1,
            },
            theta_metadata: ThetaMetadata {
                update_type: UpdateType::Dense,
                last_commit: None,
            },
        }
    }

    #[test]
    fn test_state_table() {
        let x = entry(1.0);
        let y = entry(2.0);
        let z = entry(3.0);
        let cases: Vec<(
            Option<&ParamMetadata>,
            Option<&ParamMetadata>,
            Option<&ParamMetadata>,
            MergeState,
        )> = vec![
            (Some(&x), Some(&x), Some(&x), MergeState::Equal),
            (None, None, None, MergeState::Equal),
            (Some(&x), Some(&y), Some(&x), MergeState::ChangedA),
            (Some(&x), Some(&x), Some(&y), MergeState::ChangedB),
            (Some(&x), Some(&y), Some(&z), MergeState::ChangedBoth),
            (None, Some(&x), None, MergeState::AddedA),
            (None, None, Some(&x), MergeState::AddedB),
            (None, Some(&x), Some(&y), MergeState::AddedBoth),
            (Some(&x), None, Some(&x), MergeState::DeletedA),
            (Some(&x), Some(&x), None, MergeState::DeletedB),
            (Some(&x), None, None, MergeState::DeletedBoth),
            // Both sides made the same change.
            (Some(&x), Some(&y), Some(&y), MergeState::Equal),
        ];
        for (a, c, o, expected) in cases {
            assert_eq!(infer_state(a, c, o), expected, "a={a:?} c={c:?} o={o:?}");
        }
    }

    #[test]
    fn test_swapping_sides_swaps_suffixes() {
        let x = entry(1.0);
        let y = entry(2.0);
        let z = entry(3.0);
        let swap = |s: MergeState| match s {
            MergeState::ChangedA => MergeState::ChangedB,
            MergeState::ChangedB => MergeState::ChangedA,
            MergeState::AddedA => MergeState::AddedB,
            MergeState::AddedB => MergeState::AddedA,
            MergeState::DeletedA => MergeState::DeletedB,
            MergeState::DeletedB => MergeState::DeletedA,
            other => other,
        };
        let triples: Vec<(
            Option<&ParamMetadata>,
            Option<&ParamMetadata>,
            Option<&ParamMetadata>,
        )> = vec![
            (Some(&x), Some(&x), Some(&x)),
            (Some(&x), Some(&y), Some(&x)),
            (Some(&x), Some(&x), Some(&y)),
            (Some(&x), Some(&y), Some(&z)),
            (None, Some(&x), None),
            (None, None, Some(&x)),
            (None, Some(&x), Some(&y)),
            (Some(&x), None, Some(&x)),
            (Some(&x), Some(&x), None),
            (Some(&x), None, None),
            (Some(&x), Some(&y), Some(&y)),
        ];
        for (a, c, o) in triples {
            assert_eq!(
                infer_state(a, o, c),
                swap(infer_state(a, c, o)),
                "a={a:?} c={c:?} o={o:?}"
            );
        }
    }

    #[test]
    fn test_equality_is_value_equality() {
        // Same value hash stored differently still classifies as equal.
        let t = Tensor::from_f32(arr1(&[5.0f32]).into_dyn());
        let mut stored_differently = entry(5.0);
        stored_differently.lfs_metadata.size = 999;
        stored_differently.theta_metadata.update_type = UpdateType::Sparse;
        let plain = ParamMetadata {
            tensor_metadata: TensorMetadata::from_tensor(&t),
            ..entry(5.0)
        };
        assert_eq!(
            infer_state(Some(&plain), Some(&stored_differently), Some(&plain)),
            MergeState::Equal
        );
    }
}
