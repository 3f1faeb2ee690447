//! Checkpoint format handlers for git-theta.
//!
//! A handler decodes a framework's checkpoint bytes into the flat mapping
//! of parameter name to tensor and encodes it back. Handlers are looked up
//! by name through a registry populated at startup; framework-specific
//! readers (pytorch, tensorflow, ...) are plugin territory and are reported
//! as unavailable rather than stubbed.

mod errors;
mod registry;
mod tensor_dict;

pub use errors::{CheckpointError, CheckpointResult};
pub use registry::HandlerRegistry;
pub use tensor_dict::TensorDictCheckpoint;

use std::collections::BTreeMap;

use theta_metadata::ParamName;
use theta_params::Tensor;

/// The decoded form of a checkpoint: full parameter name to tensor, sorted.
pub type ParamTree = BTreeMap<ParamName, Tensor>;

/// Decode/encode one checkpoint format.
///
/// Both directions are pure CPU codecs; the pipelines bridge them onto the
/// blocking pool.
pub trait CheckpointHandler: Send + Sync {
    /// Registry name of the format.
    fn name(&self) -> &'static str;

    /// Decode checkpoint bytes into the parameter tree.
    fn read(&self, bytes: &[u8]) -> CheckpointResult<ParamTree>;

    /// Encode a parameter tree into checkpoint bytes.
    ///
    /// Encoding is deterministic: equal trees produce equal bytes.
    fn write(&self, tree: &ParamTree) -> CheckpointResult<Vec<u8>>;
}
