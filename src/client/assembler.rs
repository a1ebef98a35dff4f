//! Tail of the upload protocol: turn the part ledger into a manifest and finalize.

use std::collections::BTreeMap;
use std::time::Duration;

use super::driver::{PartRecord, PartStatus};
use super::plan::PartPlan;
use super::transport::ControlPlane;
use crate::errors::{Error, Result};
use crate::manifest::{CompletedPart, Manifest};
use crate::protocol::{CompleteResponse, UploadHandle};

/// Builds the manifest for `plan` out of `records`. Fails with [`Error::PartsFailed`] if any part
/// failed and with [`Error::PlanIncomplete`] if any planned part has no completion token.
pub fn assemble(plan: &PartPlan, records: &[PartRecord]) -> Result<Manifest> {
    let failed: Vec<&PartRecord> = records
        .iter()
        .filter(|r| r.status == PartStatus::Failed)
        .collect();
    if let Some(first) = failed.first() {
        return Err(Error::PartsFailed {
            parts: failed.iter().map(|r| r.part_number).collect(),
            reason: first
                .failure
                .clone()
                .unwrap_or_else(|| String::from("unknown failure")),
        });
    }

    let mut tokens = BTreeMap::new();
    for record in records {
        let token = match (&record.status, &record.completion_token) {
            (PartStatus::Uploaded, Some(token)) => token,
            _ => continue,
        };
        if tokens.insert(record.part_number, token.clone()).is_some() {
            return Err(Error::InvalidManifest(format!(
                "part {} recorded twice",
                record.part_number
            )));
        }
    }

    let missing: Vec<i32> = plan
        .parts()
        .iter()
        .map(|p| p.number)
        .filter(|n| !tokens.contains_key(n))
        .collect();
    if !missing.is_empty() {
        return Err(Error::PlanIncomplete(missing));
    }
    if tokens.len() != plan.len() {
        return Err(Error::InvalidManifest(format!(
            "{} parts recorded for a plan of {}",
            tokens.len(),
            plan.len()
        )));
    }

    let manifest = Manifest::new(
        tokens
            .into_iter()
            .map(|(part_number, e_tag)| CompletedPart { part_number, e_tag })
            .collect(),
    );
    manifest.validate()?;
    Ok(manifest)
}

/// Submits an assembled manifest and returns the coordinator's answer.
pub async fn finalize<C: ControlPlane + ?Sized>(
    control: &C,
    handle: &UploadHandle,
    manifest: &Manifest,
    elapsed: Duration,
) -> Result<CompleteResponse> {
    let response = control.complete(handle, manifest, elapsed).await?;
    if response.url.is_empty() {
        return Err(Error::CompletionFailed(String::from(
            "coordinator returned an empty object url",
        )));
    }
    Ok(response)
}
