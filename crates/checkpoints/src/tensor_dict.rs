//! The native checkpoint container.
//!
//! Layout: `b"THCKPT01"` magic, u32 entry count, then entries sorted by
//! name. Each entry is the component list of the name (u8 count, per
//! component u16 length + UTF-8 bytes) followed by the tensor's canonical
//! bytes (u32 length prefix). Sorting makes encoding deterministic.

use theta_metadata::ParamName;
use theta_params::{decode_tensor, encode_tensor};

use crate::{CheckpointError, CheckpointHandler, CheckpointResult, ParamTree};

const MAGIC: &[u8; 8] = b"THCKPT01";

/// Handler for the native tensor-dict format.
#[derive(Clone, Copy, Debug, Default)]
pub struct TensorDictCheckpoint;

impl CheckpointHandler for TensorDictCheckpoint {
    fn name(&self) -> &'static str {
        "tensor-dict"
    }

    fn read(&self, bytes: &[u8]) -> CheckpointResult<ParamTree> {
        let mut reader = Reader { buf: bytes, pos: 0 };
        if reader.take(8)? != MAGIC {
            return Err(CheckpointError::Malformed("bad magic".to_owned()));
        }
        let count = reader.take_u32()?;
        let mut tree = ParamTree::new();
        for _ in 0..count {
            let component_count = reader.take(1)?[0] as usize;
            let mut components = Vec::with_capacity(component_count);
            for _ in 0..component_count {
                let len = reader.take_u16()? as usize;
                let raw = reader.take(len)?;
                let component = std::str::from_utf8(raw)
                    .map_err(|_| CheckpointError::Malformed("name is not utf-8".to_owned()))?;
                components.push(component.to_owned());
            }
            let name = ParamName::new(components)?;
            let tensor_len = reader.take_u32()? as usize;
            let tensor = decode_tensor(reader.take(tensor_len)?)?;
            if tree.insert(name.clone(), tensor).is_some() {
                return Err(CheckpointError::Malformed(format!(
                    "duplicate parameter {name}"
                )));
            }
        }
        if reader.pos != bytes.len() {
            return Err(CheckpointError::Malformed("trailing bytes".to_owned()));
        }
        Ok(tree)
    }

    fn write(&self, tree: &ParamTree) -> CheckpointResult<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(tree.len() as u32).to_le_bytes());
        for (name, tensor) in tree {
            let components = name.components();
            if components.len() > u8::MAX as usize {
                return Err(CheckpointError::Malformed(format!(
                    "parameter {name} nests too deeply"
                )));
            }
            out.push(components.len() as u8);
            for component in components {
                let raw = component.as_bytes();
                if raw.len() > u16::MAX as usize {
                    return Err(CheckpointError::Malformed(format!(
                        "component of {name} too long"
                    )));
                }
                out.extend_from_slice(&(raw.len() as u16).to_le_bytes());
                out.extend_from_slice(raw);
            }
            let tensor_bytes = encode_tensor(tensor);
            out.extend_from_slice(&(tensor_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&tensor_bytes);
        }
        Ok(out)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> CheckpointResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(CheckpointError::Malformed(format!(
                "truncated at byte {}",
                self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u16(&mut self) -> CheckpointResult<u16> {
        Ok(u16::from_le_bytes(
            self.take(2)?.try_into().expect("2-byte slice"),
        ))
    }

    fn take_u32(&mut self) -> CheckpointResult<u32> {
        Ok(u32::from_le_bytes(
            self.take(4)?.try_into().expect("4-byte slice"),
        ))
    }
}
