//! Merge driver tests over scripted prompts and in-memory collaborators.

use std::path::PathBuf;

use ndarray::arr1;
use theta_checkpoints::{CheckpointHandler, HandlerRegistry, ParamTree, TensorDictCheckpoint};
use theta_config::Config;
use theta_filter::{CleanPipeline, StaticManifestSource};
use theta_merge::{assign_short_cuts, builtin_actions, MergeDriver, MergeError, ScriptedPrompter};
use theta_metadata::{Metadata, ParamName, UpdateType};
use theta_params::Tensor;
use theta_store::MemoryObjectStore;

const MODEL_PATH: &str = "model.ckpt";

fn test_config() -> Config {
    Config {
        checkpoint_type: "tensor-dict".to_owned(),
        update_type: UpdateType::Dense,
        ..Config::default()
    }
}

fn tensor(values: &[f32]) -> Tensor {
    Tensor::from_f32(arr1(values).into_dyn())
}

/// Clean a single-parameter checkpoint into a manifest backed by `store`.
async fn manifest_for(
    store: &MemoryObjectStore,
    registry: &HandlerRegistry,
    values: &[f32],
) -> Metadata {
    let mut tree = ParamTree::new();
    tree.insert(ParamName::from(["w"]), tensor(values));
    let bytes = TensorDictCheckpoint.write(&tree).unwrap();
    let config = test_config();
    let source = StaticManifestSource::new();
    CleanPipeline::new(&config, registry, store, &source)
        .clean(&bytes, MODEL_PATH)
        .await
        .unwrap()
        .manifest
}

struct MergeSetup {
    _dir: tempfile::TempDir,
    ancestor: PathBuf,
    current: PathBuf,
    other: PathBuf,
}

fn write_manifests(ancestor: &Metadata, current: &Metadata, other: &Metadata) -> MergeSetup {
    let dir = tempfile::tempdir().unwrap();
    let paths = MergeSetup {
        ancestor: dir.path().join("ancestor"),
        current: dir.path().join("current"),
        other: dir.path().join("other"),
        _dir: dir,
    };
    ancestor.write(&paths.ancestor).unwrap();
    current.write(&paths.current).unwrap();
    other.write(&paths.other).unwrap();
    paths
}

#[tokio::test]
async fn test_equal_parameters_merge_without_prompting() {
    let config = test_config();
    let registry = HandlerRegistry::new();
    let store = MemoryObjectStore::new();
    let source = StaticManifestSource::new();

    let manifest = manifest_for(&store, &registry, &[1.0, 2.0]).await;
    let setup = write_manifests(&manifest, &manifest, &manifest);

    // No answers scripted: a prompt would fail the merge.
    let mut prompter = ScriptedPrompter::default();
    MergeDriver::new(&config, &registry, &store, &source)
        .merge(
            &setup.ancestor,
            &setup.current,
            &setup.other,
            MODEL_PATH,
            &mut prompter,
        )
        .await
        .unwrap();

    let merged = Metadata::from_file(&setup.current).unwrap();
    assert_eq!(merged, manifest);
}

#[tokio::test]
async fn test_taking_ours_keeps_our_change() {
    let config = test_config();
    let registry = HandlerRegistry::new();
    let store = MemoryObjectStore::new();
    let source = StaticManifestSource::new();

    let ancestor = manifest_for(&store, &registry, &[1.0, 2.0]).await;
    let ours = manifest_for(&store, &registry, &[9.0, 9.0]).await;
    // Theirs identical to the ancestor: state is CHANGED_A.
    let setup = write_manifests(&ancestor, &ours, &ancestor);

    let mut prompter = ScriptedPrompter::new(["u"]);
    MergeDriver::new(&config, &registry, &store, &source)
        .merge(
            &setup.ancestor,
            &setup.current,
            &setup.other,
            MODEL_PATH,
            &mut prompter,
        )
        .await
        .unwrap();

    assert_eq!(Metadata::from_file(&setup.current).unwrap(), ours);
    assert!(prompter.is_exhausted());
}

#[tokio::test]
async fn test_average_materializes_the_mean() {
    let config = test_config();
    let registry = HandlerRegistry::new();
    let store = MemoryObjectStore::new();
    let source = StaticManifestSource::new();

    let ancestor = manifest_for(&store, &registry, &[0.0, 0.0]).await;
    let ours = manifest_for(&store, &registry, &[2.0, 2.0]).await;
    let theirs = manifest_for(&store, &registry, &[4.0, 4.0]).await;
    let setup = write_manifests(&ancestor, &ours, &theirs);

    let mut prompter = ScriptedPrompter::new(["v"]);
    MergeDriver::new(&config, &registry, &store, &source)
        .merge(
            &setup.ancestor,
            &setup.current,
            &setup.other,
            MODEL_PATH,
            &mut prompter,
        )
        .await
        .unwrap();

    let merged = Metadata::from_file(&setup.current).unwrap();
    let entry = merged.get(&ParamName::from(["w"])).unwrap();
    assert_eq!(entry.theta_metadata.update_type, UpdateType::Dense);
    assert_eq!(entry.tensor_metadata.hash, tensor(&[3.0, 3.0]).content_hash());
}

#[tokio::test]
async fn test_quit_aborts_without_writing() {
    let config = test_config();
    let registry = HandlerRegistry::new();
    let store = MemoryObjectStore::new();
    let source = StaticManifestSource::new();

    let ancestor = manifest_for(&store, &registry, &[1.0]).await;
    let ours = manifest_for(&store, &registry, &[2.0]).await;
    let theirs = manifest_for(&store, &registry, &[3.0]).await;
    let setup = write_manifests(&ancestor, &ours, &theirs);
    let before = std::fs::read(&setup.current).unwrap();

    let mut prompter = ScriptedPrompter::new(["q"]);
    let result = MergeDriver::new(&config, &registry, &store, &source)
        .merge(
            &setup.ancestor,
            &setup.current,
            &setup.other,
            MODEL_PATH,
            &mut prompter,
        )
        .await;

    assert!(matches!(result, Err(MergeError::UserAbort)));
    assert_eq!(std::fs::read(&setup.current).unwrap(), before);
}

#[tokio::test]
async fn test_both_deleted_resolves_to_removal() {
    let config = test_config();
    let registry = HandlerRegistry::new();
    let store = MemoryObjectStore::new();
    let source = StaticManifestSource::new();

    let ancestor = manifest_for(&store, &registry, &[1.0]).await;
    let empty = Metadata::new();
    let setup = write_manifests(&ancestor, &empty, &empty);

    let mut prompter = ScriptedPrompter::default();
    MergeDriver::new(&config, &registry, &store, &source)
        .merge(
            &setup.ancestor,
            &setup.current,
            &setup.other,
            MODEL_PATH,
            &mut prompter,
        )
        .await
        .unwrap();

    assert!(Metadata::from_file(&setup.current).unwrap().is_empty());
}

#[tokio::test]
async fn test_context_then_resolution() {
    let config = test_config();
    let registry = HandlerRegistry::new();
    let store = MemoryObjectStore::new();
    let source = StaticManifestSource::new();

    let ancestor = manifest_for(&store, &registry, &[1.0]).await;
    let ours = manifest_for(&store, &registry, &[2.0]).await;
    let theirs = manifest_for(&store, &registry, &[3.0]).await;
    let setup = write_manifests(&ancestor, &ours, &theirs);

    // Context prints and keeps prompting; then take theirs.
    let mut prompter = ScriptedPrompter::new(["c", "t"]);
    MergeDriver::new(&config, &registry, &store, &source)
        .merge(
            &setup.ancestor,
            &setup.current,
            &setup.other,
            MODEL_PATH,
            &mut prompter,
        )
        .await
        .unwrap();

    assert_eq!(Metadata::from_file(&setup.current).unwrap(), theirs);
}

#[test]
fn test_short_cut_assignment_prefers_requests() {
    let assigned = assign_short_cuts(builtin_actions());
    let mut pairs: Vec<(String, &'static str)> = assigned
        .iter()
        .map(|(key, action)| (key.clone(), action.name()))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("a".to_owned(), "take-ancestor"),
            ("c".to_owned(), "context"),
            ("t".to_owned(), "take-theirs"),
            ("u".to_owned(), "take-ours"),
            ("v".to_owned(), "average"),
        ]
    );
}
