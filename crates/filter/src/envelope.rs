//! The on-store layout of an update record.
//!
//! Each tensor field of a record is its own content-addressed object; the
//! envelope is a small sorted-JSON object mapping field name to the field's
//! pointer, stored as an object itself. The envelope's oid and size are
//! what the manifest's `lfs_metadata` carries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use theta_metadata::LfsMetadata;
use theta_params::{decode_tensor, encode_tensor, Oid};
use theta_store::{LfsPointer, ObjectStore};
use theta_updates::UpdateRecord;

use crate::{FilterError, FilterResult};

#[derive(Debug, Serialize, Deserialize)]
struct FieldPointer {
    oid: Oid,
    size: u64,
}

type Envelope = BTreeMap<String, FieldPointer>;

/// Store every field of `record` plus its envelope.
///
/// Returns the manifest reference for the envelope and the oids of every
/// object written, for the push batch.
pub async fn put_record(
    store: &dyn ObjectStore,
    record: &UpdateRecord,
) -> FilterResult<(LfsMetadata, Vec<Oid>)> {
    let mut envelope = Envelope::new();
    let mut new_oids = Vec::with_capacity(record.len() + 1);
    for (field, tensor) in record.iter() {
        let bytes = encode_tensor(tensor);
        let oid = store.put(&bytes).await?;
        new_oids.push(oid);
        envelope.insert(
            field.clone(),
            FieldPointer {
                oid,
                size: bytes.len() as u64,
            },
        );
    }
    // BTreeMap keys keep the JSON deterministic.
    let envelope_bytes = serde_json::to_vec(&envelope).map_err(theta_metadata::MetadataError::from)?;
    let envelope_oid = store.put(&envelope_bytes).await?;
    new_oids.push(envelope_oid);
    Ok((
        LfsMetadata {
            oid: envelope_oid,
            size: envelope_bytes.len() as u64,
        },
        new_oids,
    ))
}

/// Every oid behind one manifest entry: the envelope and its fields.
///
/// Used by the push porcelain to rebuild the batch an entry depends on.
pub async fn record_oids(store: &dyn ObjectStore, lfs: &LfsMetadata) -> FilterResult<Vec<Oid>> {
    let envelope_bytes = store.get(&LfsPointer::new(lfs.oid, lfs.size)).await?;
    let envelope: Envelope =
        serde_json::from_slice(&envelope_bytes).map_err(|e| FilterError::MalformedEnvelope {
            oid: lfs.oid,
            reason: e.to_string(),
        })?;
    let mut oids = vec![lfs.oid];
    oids.extend(envelope.values().map(|pointer| pointer.oid));
    Ok(oids)
}

/// Fetch and rebuild the record referenced by `lfs`.
pub async fn get_record(
    store: &dyn ObjectStore,
    lfs: &LfsMetadata,
) -> FilterResult<UpdateRecord> {
    let envelope_bytes = store.get(&LfsPointer::new(lfs.oid, lfs.size)).await?;
    let envelope: Envelope =
        serde_json::from_slice(&envelope_bytes).map_err(|e| FilterError::MalformedEnvelope {
            oid: lfs.oid,
            reason: e.to_string(),
        })?;
    let mut record = UpdateRecord::new();
    for (field, pointer) in envelope {
        let bytes = store
            .get(&LfsPointer::new(pointer.oid, pointer.size))
            .await?;
        record.insert(field, decode_tensor(&bytes)?);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;
    use theta_params::Tensor;
    use theta_store::MemoryObjectStore;
    use theta_updates::DenseUpdate;

    use super::*;

    #[tokio::test]
    async fn test_record_roundtrip() {
        let store = MemoryObjectStore::new();
        let record = DenseUpdate::format(Tensor::from_f32(arr1(&[1.0f32, 2.0]).into_dyn()));
        let (lfs, new_oids) = put_record(&store, &record).await.unwrap();
        // One field object plus the envelope.
        assert_eq!(new_oids.len(), 2);
        assert_eq!(*new_oids.last().unwrap(), lfs.oid);

        let rebuilt = get_record(&store, &lfs).await.unwrap();
        assert_eq!(rebuilt, record);
    }

    #[tokio::test]
    async fn test_identical_records_share_objects() {
        let store = MemoryObjectStore::new();
        let record = DenseUpdate::format(Tensor::from_f32(arr1(&[3.0f32]).into_dyn()));
        let (first, _) = put_record(&store, &record).await.unwrap();
        let (second, _) = put_record(&store, &record).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_envelope_is_not_found() {
        let store = MemoryObjectStore::new();
        let lfs = LfsMetadata {
            oid: Oid::new([7u8; 32]),
            size: 2,
        };
        assert!(matches!(
            get_record(&store, &lfs).await,
            Err(FilterError::Store(theta_store::StoreError::NotFound(_)))
        ));
    }
}
