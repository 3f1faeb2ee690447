//! LFS v1 pointer text.

use std::fmt;

use theta_params::Oid;

use crate::{StoreError, StoreResult};

const VERSION_LINE: &str = "version https://git-lfs.github.com/spec/v1";

/// The pair needed to retrieve an object through the LFS smudge protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LfsPointer {
    pub oid: Oid,
    pub size: u64,
}

impl LfsPointer {
    pub fn new(oid: Oid, size: u64) -> Self {
        Self { oid, size }
    }

    /// Parse pointer text produced by `git lfs clean`.
    pub fn parse(text: &str) -> StoreResult<Self> {
        let mut oid = None;
        let mut size = None;
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("oid sha256:") {
                oid = Some(
                    rest.trim()
                        .parse::<Oid>()
                        .map_err(|_| StoreError::MalformedPointer(line.to_owned()))?,
                );
            } else if let Some(rest) = line.strip_prefix("size ") {
                size = Some(
                    rest.trim()
                        .parse::<u64>()
                        .map_err(|_| StoreError::MalformedPointer(line.to_owned()))?,
                );
            }
        }
        match (oid, size) {
            (Some(oid), Some(size)) => Ok(Self { oid, size }),
            _ => Err(StoreError::MalformedPointer(text.to_owned())),
        }
    }
}

impl fmt::Display for LfsPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{VERSION_LINE}")?;
        writeln!(f, "oid sha256:{}", self.oid)?;
        writeln!(f, "size {}", self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_roundtrip() {
        let pointer = LfsPointer::new(Oid::new([0xcd; 32]), 1234);
        let text = pointer.to_string();
        assert_eq!(LfsPointer::parse(&text).unwrap(), pointer);
    }

    #[test]
    fn test_parse_real_pointer_text() {
        let text = "version https://git-lfs.github.com/spec/v1\noid sha256:4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393\nsize 12345\n";
        let pointer = LfsPointer::parse(text).unwrap();
        assert_eq!(pointer.size, 12345);
    }

    #[test]
    fn test_missing_size_rejected() {
        let text = "version https://git-lfs.github.com/spec/v1\noid sha256:4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393\n";
        assert!(LfsPointer::parse(text).is_err());
    }
}
