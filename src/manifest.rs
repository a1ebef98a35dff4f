use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Largest part number an S3-compatible backend accepts.
pub const MAX_PART_NUMBER: i32 = 10_000;

/// A part number paired with the completion token the storage backend returned for it.
///
/// The token is opaque and travels untouched, quotes included, from the data-plane response
/// header to the finalize call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// Ordered list of [`CompletedPart`]s submitted to finalize a multipart upload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    parts: Vec<CompletedPart>,
}

impl Manifest {
    /// Wraps `parts` without reordering them; call [`Manifest::validate`] before trusting it.
    pub fn new(parts: Vec<CompletedPart>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Checks that the manifest is non-empty, that part numbers run 1..=n in ascending order
    /// with no gaps or duplicates, and that every part carries a token.
    pub fn validate(&self) -> Result<()> {
        if self.parts.is_empty() {
            return Err(Error::InvalidManifest(String::from("manifest is empty")));
        }
        if self.parts.len() > MAX_PART_NUMBER as usize {
            return Err(Error::InvalidManifest(format!(
                "manifest has {} parts, at most {MAX_PART_NUMBER} allowed",
                self.parts.len()
            )));
        }
        for (expected, part) in (1..).zip(self.parts.iter()) {
            if part.part_number != expected {
                return Err(Error::InvalidManifest(format!(
                    "expected part {expected}, found part {}",
                    part.part_number
                )));
            }
            if part.e_tag.is_empty() {
                return Err(Error::InvalidManifest(format!(
                    "part {} has an empty completion token",
                    part.part_number
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    fn manifest(numbers: &[i32]) -> Manifest {
        Manifest::new(
            numbers
                .iter()
                .map(|n| CompletedPart {
                    part_number: *n,
                    e_tag: format!("\"etag-{n}\""),
                })
                .collect(),
        )
    }

    #[rstest]
    #[case::single(&[1], true)]
    #[case::three(&[1, 2, 3], true)]
    #[case::empty(&[], false)]
    #[case::missing_middle(&[1, 3], false)]
    #[case::missing_first(&[2, 3], false)]
    #[case::descending(&[2, 1], false)]
    #[case::duplicate(&[1, 1, 2], false)]
    #[case::zero(&[0, 1], false)]
    fn validate(#[case] numbers: &[i32], #[case] ok: bool) {
        let result = manifest(numbers).validate();
        match (ok, result) {
            (true, Ok(())) => {}
            (false, Err(Error::InvalidManifest(_))) => {}
            (ok, result) => panic!("expected ok={ok}, got {result:?}"),
        }
    }

    #[test]
    fn empty_token_rejected() {
        let m = Manifest::new(vec![CompletedPart {
            part_number: 1,
            e_tag: String::new(),
        }]);
        assert!(matches!(m.validate(), Err(Error::InvalidManifest(_))));
    }

    #[test]
    fn serializes_as_bare_list() {
        let m = manifest(&[1, 2]);
        let json = serde_json::to_string(&m).expect("serializable");
        assert_eq!(
            r#"[{"partNumber":1,"eTag":"\"etag-1\""},{"partNumber":2,"eTag":"\"etag-2\""}]"#,
            json
        );
    }
}
