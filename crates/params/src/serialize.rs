//! Canonical tensor byte layout.
//!
//! Layout: `b"THP1"` magic, dtype string (u8 length + ASCII), rank (u8),
//! dims (u64 little-endian each), then the raw little-endian element
//! payload. The encoding is deterministic: equal logical tensors always
//! produce equal bytes, and the SHA-256 of these bytes is the tensor's
//! content identity.

use ndarray::{ArrayD, IxDyn};

use crate::{
    dtype::{bf16_bits_to_f32, f16_bits_to_f32, f32_to_bf16_bits, f32_to_f16_bits},
    Dtype, ParamError, ParamResult, Tensor, TensorData,
};

const MAGIC: &[u8; 4] = b"THP1";

/// Serialize a tensor into its canonical bytes.
pub fn encode_tensor(tensor: &Tensor) -> Vec<u8> {
    let dtype = tensor.dtype();
    let shape = tensor.shape();
    let mut out =
        Vec::with_capacity(4 + 1 + dtype.as_str().len() + 1 + 8 * shape.len() + tensor.len() * dtype.size_bytes());
    out.extend_from_slice(MAGIC);
    let dtype_str = dtype.as_str().as_bytes();
    out.push(dtype_str.len() as u8);
    out.extend_from_slice(dtype_str);
    out.push(shape.len() as u8);
    for dim in shape {
        out.extend_from_slice(&(*dim as u64).to_le_bytes());
    }
    match tensor.data() {
        TensorData::F32(values) => match dtype {
            Dtype::F32 => {
                for v in values.iter() {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            Dtype::F16 => {
                for v in values.iter() {
                    out.extend_from_slice(&f32_to_f16_bits(*v).to_le_bytes());
                }
            }
            Dtype::BF16 => {
                for v in values.iter() {
                    out.extend_from_slice(&f32_to_bf16_bits(*v).to_le_bytes());
                }
            }
            Dtype::I64 => unreachable!("float storage never carries an int dtype"),
        },
        TensorData::I64(values) => {
            for v in values.iter() {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    out
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> ParamResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(ParamError::Truncated {
                expected: self.pos + n,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> ParamResult<u8> {
        Ok(self.take(1)?[0])
    }
}

/// Parse canonical tensor bytes.
pub fn decode_tensor(bytes: &[u8]) -> ParamResult<Tensor> {
    let mut reader = Reader { buf: bytes, pos: 0 };
    if reader.take(4)? != MAGIC {
        return Err(ParamError::Malformed("bad magic".to_owned()));
    }
    let dtype_len = reader.take_u8()? as usize;
    let dtype_str = std::str::from_utf8(reader.take(dtype_len)?)
        .map_err(|_| ParamError::Malformed("dtype is not ascii".to_owned()))?;
    let dtype: Dtype = dtype_str.parse()?;
    let rank = reader.take_u8()? as usize;
    let mut dims = Vec::with_capacity(rank);
    for _ in 0..rank {
        let raw = reader.take(8)?;
        dims.push(u64::from_le_bytes(raw.try_into().expect("8-byte slice")) as usize);
    }
    let count: usize = dims.iter().product();
    let payload = reader.take(count * dtype.size_bytes())?;
    if reader.pos != bytes.len() {
        return Err(ParamError::Malformed("trailing bytes".to_owned()));
    }

    let data = match dtype {
        Dtype::F32 => {
            let values = payload
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().expect("4-byte chunk")))
                .collect();
            TensorData::F32(array_from(dims, values)?)
        }
        Dtype::F16 => {
            let values = payload
                .chunks_exact(2)
                .map(|c| f16_bits_to_f32(u16::from_le_bytes(c.try_into().expect("2-byte chunk"))))
                .collect();
            TensorData::F32(array_from(dims, values)?)
        }
        Dtype::BF16 => {
            let values = payload
                .chunks_exact(2)
                .map(|c| bf16_bits_to_f32(u16::from_le_bytes(c.try_into().expect("2-byte chunk"))))
                .collect();
            TensorData::F32(array_from(dims, values)?)
        }
        Dtype::I64 => {
            let values = payload
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes(c.try_into().expect("8-byte chunk")))
                .collect();
            TensorData::I64(array_from(dims, values)?)
        }
    };
    Ok(Tensor::from_parts(dtype, data))
}

fn array_from<T>(dims: Vec<usize>, values: Vec<T>) -> ParamResult<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(&dims), values)
        .map_err(|e| ParamError::Malformed(format!("shape mismatch: {e}")))
}
