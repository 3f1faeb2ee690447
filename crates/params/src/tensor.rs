//! The in-memory tensor value.

use ndarray::ArrayD;
use sha2::{Digest, Sha256};

use crate::{
    dtype::{bf16_bits_to_f32, f16_bits_to_f32, f32_to_bf16_bits, f32_to_f16_bits},
    serialize, Dtype, Oid, ParamError, ParamResult,
};

/// Element storage backing a [`Tensor`].
///
/// Half-precision dtypes are held as f32 and quantized at construction, so
/// the in-memory value always equals the value round-tripped through the
/// canonical bytes.
#[derive(Clone, Debug)]
pub enum TensorData {
    F32(ArrayD<f32>),
    I64(ArrayD<i64>),
}

/// A dense multidimensional value with an element dtype.
///
/// Equality is definitional: two tensors are equal iff their canonical byte
/// serializations are equal (same dtype, shape, and bitwise payload). This
/// keeps `-0.0` distinct from `+0.0` and lets NaNs participate bitwise.
#[derive(Clone, Debug)]
pub struct Tensor {
    dtype: Dtype,
    data: TensorData,
}

impl Tensor {
    /// Build an f32 tensor.
    pub fn from_f32(values: ArrayD<f32>) -> Self {
        Self {
            dtype: Dtype::F32,
            data: TensorData::F32(values),
        }
    }

    /// Build an i64 tensor.
    pub fn from_i64(values: ArrayD<i64>) -> Self {
        Self {
            dtype: Dtype::I64,
            data: TensorData::I64(values),
        }
    }

    /// Build a float tensor stored with the given dtype.
    ///
    /// Half-precision dtypes quantize `values` immediately.
    pub fn from_f32_as(dtype: Dtype, values: ArrayD<f32>) -> ParamResult<Self> {
        let data = match dtype {
            Dtype::F32 => values,
            Dtype::F16 => values.mapv(|v| f16_bits_to_f32(f32_to_f16_bits(v))),
            Dtype::BF16 => values.mapv(|v| bf16_bits_to_f32(f32_to_bf16_bits(v))),
            Dtype::I64 => return Err(ParamError::NotFloat(Dtype::I64)),
        };
        Ok(Self {
            dtype,
            data: TensorData::F32(data),
        })
    }

    pub(crate) fn from_parts(dtype: Dtype, data: TensorData) -> Self {
        Self { dtype, data }
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        match &self.data {
            TensorData::F32(a) => a.shape(),
            TensorData::I64(a) => a.shape(),
        }
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        match &self.data {
            TensorData::F32(a) => a.len(),
            TensorData::I64(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the float payload.
    pub fn as_f32(&self) -> ParamResult<&ArrayD<f32>> {
        match &self.data {
            TensorData::F32(a) => Ok(a),
            TensorData::I64(_) => Err(ParamError::NotFloat(self.dtype)),
        }
    }

    /// View the integer payload.
    pub fn as_i64(&self) -> ParamResult<&ArrayD<i64>> {
        match &self.data {
            TensorData::I64(a) => Ok(a),
            TensorData::F32(_) => Err(ParamError::NotInt(self.dtype)),
        }
    }

    /// The canonical byte serialization of this tensor.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serialize::encode_tensor(self)
    }

    /// SHA-256 of the canonical bytes, the tensor's content identity.
    pub fn content_hash(&self) -> Oid {
        let digest = Sha256::digest(self.canonical_bytes());
        Oid::new(digest.into())
    }

    /// Elementwise `|a - b| <= atol + rtol * |b|` over float payloads.
    ///
    /// Shape or dtype-kind mismatch is simply "not close". Comparisons with
    /// NaN are false, so tensors containing NaN are never close.
    pub fn allclose(&self, other: &Tensor, atol: f64, rtol: f64) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        match (&self.data, &other.data) {
            (TensorData::F32(a), TensorData::F32(b)) => a
                .iter()
                .zip(b.iter())
                .all(|(&x, &y)| (x as f64 - y as f64).abs() <= atol + rtol * (y as f64).abs()),
            (TensorData::I64(a), TensorData::I64(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype
            && self.shape() == other.shape()
            && self.canonical_bytes() == other.canonical_bytes()
    }
}

impl Eq for Tensor {}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2};

    use super::*;

    fn tensor_1d(values: &[f32]) -> Tensor {
        Tensor::from_f32(arr1(values).into_dyn())
    }

    #[test]
    fn test_equality_is_bitwise() {
        assert_eq!(tensor_1d(&[1.0, 2.0]), tensor_1d(&[1.0, 2.0]));
        assert_ne!(tensor_1d(&[1.0, 2.0]), tensor_1d(&[1.0, 2.5]));
    }

    #[test]
    fn test_signed_zero_distinct() {
        let pos = tensor_1d(&[0.0]);
        let neg = tensor_1d(&[-0.0]);
        assert_ne!(pos, neg);
        assert_ne!(pos.content_hash(), neg.content_hash());
        // Numerically they are still close.
        assert!(pos.allclose(&neg, 1e-8, 1e-5));
    }

    #[test]
    fn test_shape_participates_in_identity() {
        let flat = tensor_1d(&[1.0, 2.0, 3.0, 4.0]);
        let square = Tensor::from_f32(arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn());
        assert_ne!(flat, square);
        assert_ne!(flat.content_hash(), square.content_hash());
    }

    #[test]
    fn test_dtype_participates_in_identity() {
        let f32_t = tensor_1d(&[1.0, 2.0]);
        let f16_t = Tensor::from_f32_as(Dtype::F16, arr1(&[1.0f32, 2.0]).into_dyn()).unwrap();
        assert_ne!(f32_t, f16_t);
    }

    #[test]
    fn test_half_precision_quantizes_on_construction() {
        let t = Tensor::from_f32_as(Dtype::BF16, arr1(&[1.000001f32]).into_dyn()).unwrap();
        let stored = t.as_f32().unwrap()[0];
        assert_eq!(f32_to_bf16_bits(stored), f32_to_bf16_bits(1.000001));
        assert_eq!(bf16_bits_to_f32(f32_to_bf16_bits(stored)), stored);
    }

    #[test]
    fn test_allclose_tolerances() {
        let a = tensor_1d(&[1.0, 2.0]);
        let b = tensor_1d(&[1.0 + 5e-6, 2.0]);
        assert!(a.allclose(&b, 1e-8, 1e-5));
        assert!(!a.allclose(&b, 1e-8, 1e-7));
    }

    #[test]
    fn test_allclose_nan_is_never_close() {
        let a = tensor_1d(&[f32::NAN]);
        assert!(!a.allclose(&a.clone(), 1e-8, 1e-5));
        // But NaN payloads are bitwise equal to themselves.
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_int_tensor_rejects_float_view() {
        let t = Tensor::from_i64(arr1(&[1i64, 2]).into_dyn());
        assert!(t.as_f32().is_err());
        assert!(t.as_i64().is_ok());
    }
}
