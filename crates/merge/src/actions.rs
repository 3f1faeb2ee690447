//! Pluggable merge resolution actions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ndarray::ArrayD;
use theta_filter::{put_record, ParamCache};
use theta_metadata::{ParamMetadata, ParamName, TensorMetadata, ThetaMetadata, UpdateType};
use theta_params::Tensor;
use theta_store::ObjectStore;
use theta_updates::DenseUpdate;
use tracing::debug;

use crate::{MergeError, MergeResult, MergeState};

/// A prompted argument an action needs before it can run.
#[derive(Clone, Copy, Debug)]
pub struct ArgSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Validation applied to the raw input before the action sees it.
    pub validate: fn(&str) -> Result<(), String>,
}

/// What applying an action produced.
#[derive(Clone, Debug)]
pub enum ActionOutcome {
    /// A record for the merged manifest, or a deletion when `None`.
    Resolved(Option<ParamMetadata>),
    /// No resolution yet; prompt again (the context action).
    Continue,
}

/// Everything an action body can see.
///
/// Tensor values are pulled through the memoizing caches so repeated
/// actions against one parameter fetch objects once.
pub struct MergeContext<'a> {
    pub name: &'a ParamName,
    pub current: Option<&'a ParamMetadata>,
    pub other: Option<&'a ParamMetadata>,
    pub ancestor: Option<&'a ParamMetadata>,
    pub current_cache: &'a ParamCache<'a>,
    pub other_cache: &'a ParamCache<'a>,
    pub ancestor_cache: &'a ParamCache<'a>,
    pub store: &'a dyn ObjectStore,
    pub path: &'a str,
    pub args: &'a BTreeMap<String, String>,
}

impl std::fmt::Debug for MergeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeContext")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// One resolution strategy offered in the merge menu.
#[async_trait]
pub trait MergeAction: Send + Sync {
    /// Registry name; menu order is alphabetical over these.
    fn name(&self) -> &'static str;

    /// Requested shortcut key. Collisions fall back to numbers.
    fn short_cut(&self) -> &'static str;

    /// Menu label.
    fn description(&self) -> &'static str;

    /// States in which this action is hidden.
    fn inactive_states(&self) -> &'static [MergeState];

    /// Arguments to prompt for before running.
    fn arguments(&self) -> &'static [ArgSpec] {
        &[]
    }

    async fn apply(&self, ctx: &MergeContext<'_>) -> MergeResult<ActionOutcome>;
}

/// The built-in action set, in registry order.
pub fn builtin_actions() -> Vec<Box<dyn MergeAction>> {
    vec![
        Box::new(AverageAction),
        Box::new(ContextAction),
        Box::new(TakeAncestorAction),
        Box::new(TakeOursAction),
        Box::new(TakeTheirsAction),
    ]
}

/// Keep our branch's record (a deletion if we deleted).
#[derive(Clone, Copy, Debug, Default)]
pub struct TakeOursAction;

#[async_trait]
impl MergeAction for TakeOursAction {
    fn name(&self) -> &'static str {
        "take-ours"
    }

    fn short_cut(&self) -> &'static str {
        "u"
    }

    fn description(&self) -> &'static str {
        "Use our version of the parameter"
    }

    fn inactive_states(&self) -> &'static [MergeState] {
        &[]
    }

    async fn apply(&self, ctx: &MergeContext<'_>) -> MergeResult<ActionOutcome> {
        debug!(name = %ctx.name, "taking our version");
        Ok(ActionOutcome::Resolved(ctx.current.cloned()))
    }
}

/// Keep their branch's record (a deletion if they deleted).
#[derive(Clone, Copy, Debug, Default)]
pub struct TakeTheirsAction;

#[async_trait]
impl MergeAction for TakeTheirsAction {
    fn name(&self) -> &'static str {
        "take-theirs"
    }

    fn short_cut(&self) -> &'static str {
        "t"
    }

    fn description(&self) -> &'static str {
        "Use their version of the parameter"
    }

    fn inactive_states(&self) -> &'static [MergeState] {
        &[]
    }

    async fn apply(&self, ctx: &MergeContext<'_>) -> MergeResult<ActionOutcome> {
        debug!(name = %ctx.name, "taking their version");
        Ok(ActionOutcome::Resolved(ctx.other.cloned()))
    }
}

/// Fall back to the common ancestor's record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TakeAncestorAction;

#[async_trait]
impl MergeAction for TakeAncestorAction {
    fn name(&self) -> &'static str {
        "take-ancestor"
    }

    fn short_cut(&self) -> &'static str {
        "a"
    }

    fn description(&self) -> &'static str {
        "Use the ancestor's version of the parameter"
    }

    fn inactive_states(&self) -> &'static [MergeState] {
        // Nothing to fall back to when the parameter did not exist.
        &[MergeState::AddedA, MergeState::AddedB, MergeState::AddedBoth]
    }

    async fn apply(&self, ctx: &MergeContext<'_>) -> MergeResult<ActionOutcome> {
        debug!(name = %ctx.name, "taking the ancestor version");
        Ok(ActionOutcome::Resolved(ctx.ancestor.cloned()))
    }
}

/// Arithmetic mean of our and their values, stored as a fresh dense entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct AverageAction;

#[async_trait]
impl MergeAction for AverageAction {
    fn name(&self) -> &'static str {
        "average"
    }

    fn short_cut(&self) -> &'static str {
        "v"
    }

    fn description(&self) -> &'static str {
        "Average our and their values"
    }

    fn inactive_states(&self) -> &'static [MergeState] {
        // Needs a value on both sides.
        &[
            MergeState::AddedA,
            MergeState::AddedB,
            MergeState::DeletedA,
            MergeState::DeletedB,
        ]
    }

    async fn apply(&self, ctx: &MergeContext<'_>) -> MergeResult<ActionOutcome> {
        let ours = ctx.current_cache.fetch(ctx.name).await?;
        let theirs = ctx.other_cache.fetch(ctx.name).await?;
        if ours.shape() != theirs.shape() {
            return Err(MergeError::ActionFailed {
                action: self.name(),
                name: ctx.name.to_string(),
                reason: format!(
                    "shapes {:?} and {:?} cannot be averaged",
                    ours.shape(),
                    theirs.shape()
                ),
            });
        }
        let mean: ArrayD<f32> = (ours.as_f32()? + theirs.as_f32()?) / 2.0;
        let merged = Tensor::from_f32_as(ours.dtype(), mean)?;
        debug!(name = %ctx.name, "averaged both versions");

        // The averaged value exists on neither branch; store it dense.
        let record = DenseUpdate::format(merged.clone());
        let (lfs_metadata, _new_oids) = put_record(ctx.store, &record).await?;
        Ok(ActionOutcome::Resolved(Some(ParamMetadata {
            tensor_metadata: TensorMetadata::from_tensor(&merged),
            lfs_metadata,
            theta_metadata: ThetaMetadata {
                update_type: UpdateType::Dense,
                last_commit: None,
            },
        })))
    }
}

/// Print where the parameter stands on each branch; resolves nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContextAction;

#[async_trait]
impl MergeAction for ContextAction {
    fn name(&self) -> &'static str {
        "context"
    }

    fn short_cut(&self) -> &'static str {
        "c"
    }

    fn description(&self) -> &'static str {
        "Show context for this parameter"
    }

    fn inactive_states(&self) -> &'static [MergeState] {
        &[]
    }

    async fn apply(&self, ctx: &MergeContext<'_>) -> MergeResult<ActionOutcome> {
        let describe = |entry: Option<&ParamMetadata>| match entry {
            Some(meta) => format!(
                "{} {:?} hash {}",
                meta.tensor_metadata.dtype, meta.tensor_metadata.shape, meta.tensor_metadata.hash
            ),
            None => "absent".to_owned(),
        };
        println!("parameter {} in {}", ctx.name, ctx.path);
        println!("  ours:     {}", describe(ctx.current));
        println!("  theirs:   {}", describe(ctx.other));
        println!("  ancestor: {}", describe(ctx.ancestor));
        Ok(ActionOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_shortcuts_are_distinct() {
        let actions = builtin_actions();
        let mut keys: Vec<&str> = actions.iter().map(|a| a.short_cut()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), actions.len());
    }

    #[test]
    fn test_builtins_sorted_by_name() {
        let actions = builtin_actions();
        let names: Vec<&str> = actions.iter().map(|a| a.name()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
