//! The merge driver: classify, prompt, resolve, write.

use std::{collections::BTreeMap, path::Path};

use itertools::Itertools;
use theta_checkpoints::HandlerRegistry;
use theta_config::Config;
use theta_filter::{ParamCache, SmudgePipeline};
use theta_metadata::{Metadata, ParamName};
use theta_store::ObjectStore;
use tracing::{debug, info, warn};

use crate::{
    builtin_actions, infer_state, ActionMenu, ActionOutcome, MenuEntry, MergeAction,
    MergeContext, MergeError, MergeResult, MergeState, Prompter,
};

/// Reserved key that aborts the merge.
pub const QUIT_ACTION: &str = "q";

/// Assign each action its selection key.
///
/// Actions are processed alphabetically by registry name. A requested
/// shortcut that is reserved or already taken falls back to the next value
/// of an incrementing number series.
pub fn assign_short_cuts(
    actions: Vec<Box<dyn MergeAction>>,
) -> BTreeMap<String, Box<dyn MergeAction>> {
    let mut assigned: BTreeMap<String, Box<dyn MergeAction>> = BTreeMap::new();
    let mut fallback = 1usize;
    for action in actions
        .into_iter()
        .sorted_by_key(|action| action.name().to_owned())
    {
        let requested = action.short_cut();
        if requested == QUIT_ACTION {
            warn!(
                action = action.name(),
                "action requested the reserved quit shortcut"
            );
        } else if !assigned.contains_key(requested) {
            assigned.insert(requested.to_owned(), action);
            continue;
        }
        assigned.insert(fallback.to_string(), action);
        fallback += 1;
    }
    assigned
}

fn active_actions<'a>(
    state: MergeState,
    actions: &'a BTreeMap<String, Box<dyn MergeAction>>,
) -> Vec<(&'a str, &'a dyn MergeAction)> {
    actions
        .iter()
        .filter(|(_, action)| !action.inactive_states().contains(&state))
        .map(|(key, action)| (key.as_str(), action.as_ref()))
        .collect()
}

fn build_menu(
    name: &ParamName,
    state: MergeState,
    active: &[(&str, &dyn MergeAction)],
    model_path: &str,
) -> ActionMenu {
    let mut entries: Vec<MenuEntry> = active
        .iter()
        .map(|(key, action)| MenuEntry {
            key: (*key).to_owned(),
            label: action.description().to_owned(),
        })
        .collect();
    entries.push(MenuEntry {
        key: QUIT_ACTION.to_owned(),
        label: "quit".to_owned(),
    });
    ActionMenu {
        title: format!("{name}: {}", state.description()),
        entries,
        footer: format!("Merging parameter: {name} in model {model_path}"),
    }
}

/// Drives a three-way manifest merge.
pub struct MergeDriver<'a> {
    config: &'a Config,
    registry: &'a HandlerRegistry,
    store: &'a dyn ObjectStore,
    source: &'a dyn theta_filter::ManifestSource,
}

impl std::fmt::Debug for MergeDriver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeDriver").finish_non_exhaustive()
    }
}

impl<'a> MergeDriver<'a> {
    pub fn new(
        config: &'a Config,
        registry: &'a HandlerRegistry,
        store: &'a dyn ObjectStore,
        source: &'a dyn theta_filter::ManifestSource,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            source,
        }
    }

    /// Merge `ancestor`/`current`/`other` manifests, writing the result
    /// over `current` on success. The working tree is untouched on abort.
    pub async fn merge(
        &self,
        ancestor_path: &Path,
        current_path: &Path,
        other_path: &Path,
        model_path: &str,
        prompter: &mut dyn Prompter,
    ) -> MergeResult<()> {
        println!("Fixing merge conflicts in {model_path}");
        let ancestor = Metadata::from_file(ancestor_path)?;
        let current = Metadata::from_file(current_path)?;
        let other = Metadata::from_file(other_path)?;
        info!(
            model_path,
            parameters = ancestor.len().max(current.len()).max(other.len()),
            "merging manifests"
        );

        let all_names: Vec<ParamName> = ancestor
            .names()
            .chain(current.names())
            .chain(other.names())
            .unique()
            .cloned()
            .sorted()
            .collect();

        let actions = assign_short_cuts(builtin_actions());
        let current_cache = ParamCache::new(self.source, self.store, &current, model_path);
        let other_cache = ParamCache::new(self.source, self.store, &other, model_path);
        let ancestor_cache = ParamCache::new(self.source, self.store, &ancestor, model_path);

        let mut merged = Metadata::new();
        for name in &all_names {
            let ancestor_param = ancestor.get(name);
            let current_param = current.get(name);
            let other_param = other.get(name);
            let state = infer_state(ancestor_param, current_param, other_param);

            if state == MergeState::Equal {
                debug!(name = %name, "unchanged on both branches");
                // Keep whichever record exists; they all carry the value.
                if let Some(meta) = current_param.or(ancestor_param).or(other_param) {
                    merged.insert(name.clone(), meta.clone());
                }
                continue;
            }
            if state == MergeState::DeletedBoth {
                debug!(name = %name, "deleted on both branches");
                continue;
            }

            let active = active_actions(state, &actions);
            let menu = build_menu(name, state, &active, model_path);

            loop {
                let key = prompter.select_action(&menu)?;
                if key == QUIT_ACTION {
                    debug!("user quit the merge tool, leaving merge files as they are");
                    return Err(MergeError::UserAbort);
                }
                let action = active
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, action)| *action)
                    .ok_or_else(|| MergeError::UnknownAction(key.clone()))?;

                let mut args = BTreeMap::new();
                for spec in action.arguments() {
                    let value = prompter.prompt_argument(spec)?;
                    args.insert(spec.name.to_owned(), value);
                }

                let ctx = MergeContext {
                    name,
                    current: current_param,
                    other: other_param,
                    ancestor: ancestor_param,
                    current_cache: &current_cache,
                    other_cache: &other_cache,
                    ancestor_cache: &ancestor_cache,
                    store: self.store,
                    path: model_path,
                    args: &args,
                };
                match action.apply(&ctx).await? {
                    ActionOutcome::Continue => continue,
                    ActionOutcome::Resolved(Some(meta)) => {
                        merged.insert(name.clone(), meta);
                        break;
                    }
                    ActionOutcome::Resolved(None) => {
                        debug!(name = %name, "resolution deleted the parameter");
                        break;
                    }
                }
            }
        }

        merged.write(current_path)?;
        info!(model_path, parameters = merged.len(), "merge complete");
        Ok(())
    }

    /// Write the three fully materialized checkpoints next to the working
    /// tree so the user can merge out-of-band.
    pub async fn manual_merge(
        &self,
        ancestor_path: &Path,
        current_path: &Path,
        other_path: &Path,
        model_path: &str,
    ) -> MergeResult<()> {
        let smudge = SmudgePipeline::new(self.config, self.registry, self.store, self.source);
        let sides = [
            ("ours.ckpt", current_path),
            ("theirs.ckpt", other_path),
            ("ancestor.ckpt", ancestor_path),
        ];
        for (output, manifest_path) in sides {
            let manifest_bytes = std::fs::read(manifest_path)?;
            let checkpoint = smudge.smudge(&manifest_bytes, model_path).await?;
            std::fs::write(output, checkpoint)?;
            info!(output, "wrote checkpoint for manual merging");
        }
        println!(
            "Manual merging: combine ours.ckpt, theirs.ckpt, and ancestor.ckpt \
             as you wish, save the result to {model_path}, and continue the merge."
        );
        Ok(())
    }
}
