use crate::errors::{Error, Result};
use crate::manifest::MAX_PART_NUMBER;

/// A contiguous byte range of the source, uploaded on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Part {
    pub number: i32,
    pub offset: u64,
    pub length: u64,
}

/// The ordered split of a source of `file_size` bytes into parts of `part_size` bytes; only the
/// last part may be shorter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartPlan {
    file_size: u64,
    part_size: u64,
    parts: Vec<Part>,
}

impl PartPlan {
    /// An empty source produces an empty plan, which callers must treat as nothing to upload:
    /// storage backends reject zero-length parts.
    pub fn new(file_size: u64, part_size: u64) -> Result<Self> {
        if part_size == 0 {
            return Err(Error::InvalidInput(String::from(
                "part size must be greater than zero",
            )));
        }

        let count = file_size / part_size + u64::from(file_size % part_size != 0);
        if count > MAX_PART_NUMBER as u64 {
            return Err(Error::InvalidInput(format!(
                "{file_size} bytes in parts of {part_size} bytes needs {count} parts, at most {MAX_PART_NUMBER} allowed"
            )));
        }

        let parts = (0..count)
            .map(|i| {
                let offset = i * part_size;
                Part {
                    number: i as i32 + 1,
                    offset,
                    length: part_size.min(file_size - offset),
                }
            })
            .collect();

        Ok(Self {
            file_size,
            part_size,
            parts,
        })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }
}
