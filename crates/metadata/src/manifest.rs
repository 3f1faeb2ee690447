//! The manifest: sorted map of parameter name to metadata record, plus its
//! canonical on-disk text form.

use std::{
    collections::{btree_map, BTreeMap},
    fs,
    path::Path,
};

use serde_json::{Map, Value};

use crate::{MetadataError, MetadataResult, ParamMetadata, ParamName};

const RECORD_KEYS: [&str; 3] = ["lfs_metadata", "tensor_metadata", "theta_metadata"];

/// A metadata manifest.
///
/// The in-memory form is flat (full parameter name to record); the on-disk
/// form nests records under name components. Serialization is deterministic:
/// keys sort lexicographically at every level and the pretty-printing is
/// fixed, so equal manifests are equal bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<ParamName, ParamMetadata>);

/// Result of comparing two manifests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataDiff {
    /// In `new` but not `old`.
    pub added: Metadata,
    /// In `old` but not `new`.
    pub removed: Metadata,
    /// In both, with different value hashes. Records are `new`'s.
    pub modified: Metadata,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: ParamName, meta: ParamMetadata) {
        self.0.insert(name, meta);
    }

    pub fn get(&self, name: &ParamName) -> Option<&ParamMetadata> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &ParamName) -> Option<ParamMetadata> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &ParamName) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ParamName, ParamMetadata> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &ParamName> {
        self.0.keys()
    }

    /// Build the nested tree form, grouping records under name components.
    pub fn unflatten(&self) -> MetadataResult<Value> {
        let mut root = Map::new();
        for (name, meta) in &self.0 {
            let (groups, leaf) = name.split_last();
            let mut node = &mut root;
            for component in groups {
                let entry = node
                    .entry(component.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                node = match entry {
                    Value::Object(map) if !is_record(map) => map,
                    _ => return Err(MetadataError::NameCollision(name.to_string())),
                };
            }
            let record = serde_json::to_value(meta)?;
            if node.insert(leaf.to_owned(), record).is_some() {
                return Err(MetadataError::NameCollision(name.to_string()));
            }
        }
        Ok(Value::Object(root))
    }

    /// Flatten a nested tree back into a manifest.
    ///
    /// Leaves are the objects carrying the full record triple; anything else
    /// nested at a leaf position is malformed.
    pub fn flatten(tree: &Value) -> MetadataResult<Self> {
        let root = tree
            .as_object()
            .ok_or_else(|| malformed("<root>", "manifest root must be an object"))?;
        let mut out = Metadata::new();
        let mut prefix = Vec::new();
        flatten_into(root, &mut prefix, &mut out)?;
        Ok(out)
    }

    /// Canonical manifest bytes.
    pub fn to_canonical_bytes(&self) -> MetadataResult<Vec<u8>> {
        let tree = self.unflatten()?;
        let mut text = serde_json::to_string_pretty(&tree)?;
        text.push('\n');
        Ok(text.into_bytes())
    }

    /// Parse manifest bytes.
    pub fn from_bytes(bytes: &[u8]) -> MetadataResult<Self> {
        let tree: Value = serde_json::from_slice(bytes)?;
        Self::flatten(&tree)
    }

    /// Write the canonical form to `path`.
    pub fn write(&self, path: &Path) -> MetadataResult<()> {
        fs::write(path, self.to_canonical_bytes()?)?;
        Ok(())
    }

    /// Parse the manifest at `path`.
    pub fn from_file(path: &Path) -> MetadataResult<Self> {
        Self::from_bytes(&fs::read(path)?)
    }

    /// Compare two manifests by value hash.
    pub fn diff(new: &Metadata, old: &Metadata) -> MetadataDiff {
        let mut diff = MetadataDiff::default();
        for (name, meta) in new.iter() {
            match old.get(name) {
                None => diff.added.insert(name.clone(), meta.clone()),
                Some(prev) if !meta.same_value(prev) => {
                    diff.modified.insert(name.clone(), meta.clone());
                }
                Some(_) => {}
            }
        }
        for (name, meta) in old.iter() {
            if !new.contains(name) {
                diff.removed.insert(name.clone(), meta.clone());
            }
        }
        diff
    }
}

impl IntoIterator for Metadata {
    type Item = (ParamName, ParamMetadata);
    type IntoIter = btree_map::IntoIter<ParamName, ParamMetadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(ParamName, ParamMetadata)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (ParamName, ParamMetadata)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn is_record(map: &Map<String, Value>) -> bool {
    RECORD_KEYS.iter().all(|k| map.contains_key(*k))
}

fn malformed(name: &str, reason: &str) -> MetadataError {
    MetadataError::MalformedRecord {
        name: name.to_owned(),
        reason: reason.to_owned(),
    }
}

fn flatten_into(
    node: &Map<String, Value>,
    prefix: &mut Vec<String>,
    out: &mut Metadata,
) -> MetadataResult<()> {
    for (key, value) in node {
        prefix.push(key.clone());
        let display = prefix.join("/");
        match value {
            Value::Object(map) if is_record(map) => {
                let meta: ParamMetadata = serde_json::from_value(value.clone())
                    .map_err(|e| malformed(&display, &e.to_string()))?;
                let name = ParamName::new(prefix.clone())?;
                out.insert(name, meta);
            }
            Value::Object(map) => flatten_into(map, prefix, out)?,
            _ => return Err(malformed(&display, "expected an object")),
        }
        prefix.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;
    use theta_params::{CommitHash, Oid, Tensor};

    use super::*;
    use crate::{LfsMetadata, TensorMetadata, ThetaMetadata, UpdateType};

    fn record(fill: u8, update_type: UpdateType) -> ParamMetadata {
        let t = Tensor::from_f32(arr1(&[fill as f32, 2.0]).into_dyn());
        ParamMetadata {
            tensor_metadata: TensorMetadata::from_tensor(&t),
            lfs_metadata: LfsMetadata {
                oid: Oid::new([fill; 32]),
                size: 64,
            },
            theta_metadata: ThetaMetadata {
                update_type,
                last_commit: update_type
                    .is_incremental()
                    .then(|| CommitHash::new([fill; 20])),
            },
        }
    }

    fn sample() -> Metadata {
        let mut m = Metadata::new();
        m.insert(
            ParamName::from(["decoder", "bias"]),
            record(3, UpdateType::Sparse),
        );
        m.insert(
            ParamName::from(["encoder", "layer0", "weight"]),
            record(1, UpdateType::Dense),
        );
        m.insert(
            ParamName::from(["encoder", "layer0", "bias"]),
            record(2, UpdateType::Dense),
        );
        m
    }

    #[test]
    fn test_bytes_roundtrip() {
        let m = sample();
        let bytes = m.to_canonical_bytes().unwrap();
        assert_eq!(Metadata::from_bytes(&bytes).unwrap(), m);
    }

    #[test]
    fn test_serialization_is_byte_stable() {
        let m = sample();
        let first = m.to_canonical_bytes().unwrap();
        let reparsed = Metadata::from_bytes(&first).unwrap();
        assert_eq!(reparsed.to_canonical_bytes().unwrap(), first);
    }

    #[test]
    fn test_canonical_bytes_sorted_and_terminated() {
        let bytes = sample().to_canonical_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with('\n'));
        let decoder = text.find("\"decoder\"").unwrap();
        let encoder = text.find("\"encoder\"").unwrap();
        assert!(decoder < encoder);
    }

    #[test]
    fn test_nesting_groups_share_prefixes() {
        let tree = sample().unflatten().unwrap();
        let weight = &tree["encoder"]["layer0"]["weight"];
        assert!(weight.get("tensor_metadata").is_some());
        assert!(weight.get("lfs_metadata").is_some());
        assert!(weight.get("theta_metadata").is_some());
    }

    #[test]
    fn test_diff_identity_is_empty() {
        let m = sample();
        let diff = Metadata::diff(&m, &m);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn test_diff_classifies_changes() {
        let old = sample();
        let mut new = sample();
        new.remove(&ParamName::from(["decoder", "bias"]));
        new.insert(ParamName::from(["head", "weight"]), record(7, UpdateType::Dense));
        new.insert(
            ParamName::from(["encoder", "layer0", "weight"]),
            record(9, UpdateType::Dense),
        );

        let diff = Metadata::diff(&new, &old);
        assert_eq!(diff.added.len(), 1);
        assert!(diff.added.contains(&ParamName::from(["head", "weight"])));
        assert_eq!(diff.removed.len(), 1);
        assert!(diff.removed.contains(&ParamName::from(["decoder", "bias"])));
        assert_eq!(diff.modified.len(), 1);
        assert!(diff
            .modified
            .contains(&ParamName::from(["encoder", "layer0", "weight"])));
    }

    #[test]
    fn test_value_and_group_collision_rejected() {
        let mut m = Metadata::new();
        m.insert(ParamName::from(["encoder"]), record(1, UpdateType::Dense));
        m.insert(
            ParamName::from(["encoder", "weight"]),
            record(2, UpdateType::Dense),
        );
        assert!(matches!(
            m.unflatten(),
            Err(MetadataError::NameCollision(_))
        ));
    }

    #[test]
    fn test_malformed_leaf_rejected() {
        let text = r#"{"encoder": {"weight": 3}}"#;
        assert!(Metadata::from_bytes(text.as_bytes()).is_err());
    }

    #[test]
    fn test_empty_manifest_roundtrip() {
        let empty = Metadata::new();
        let bytes = empty.to_canonical_bytes().unwrap();
        assert_eq!(Metadata::from_bytes(&bytes).unwrap(), empty);
    }
}
