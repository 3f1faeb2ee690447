//! Tensor value types for git-theta.
//!
//! A checkpoint decomposes into named tensors; this crate defines the tensor
//! value itself, its canonical byte layout, the SHA-256 content identifiers
//! derived from that layout, and the numeric comparisons (bitwise equality
//! and tolerance-based closeness) the rest of the system is built on.

mod dtype;
mod errors;
mod ids;
mod serialize;
mod tensor;

pub use dtype::Dtype;
pub use errors::{ParamError, ParamResult};
pub use ids::{CommitHash, Oid};
pub use serialize::{decode_tensor, encode_tensor};
pub use tensor::{Tensor, TensorData};
