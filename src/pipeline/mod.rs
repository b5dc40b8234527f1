//! The unified diagnosis pipeline. Both HTTP endpoints are thin adapters over
//! the components here; there is exactly one sequence of defaults and one
//! error classification, shared by every caller.

pub mod inference;
pub mod intake;
pub mod interpret;
pub mod normalize;
pub mod report;

use reqwest::Client;
use tracing::info;

use crate::config::AppConfig;
use crate::error::Result;
use crate::models::DiagnosisRecord;
use intake::UploadedImage;

/// Runs one diagnosis end to end: inference call, interpretation,
/// normalization. The only hard-failure exit is the inference call; the later
/// stages are total. Returns the record plus the echoed image data URL so a
/// stateless caller can request a report without re-uploading.
pub async fn diagnose(
    http: &Client,
    config: &AppConfig,
    upload: &UploadedImage,
) -> Result<(DiagnosisRecord, String)> {
    let raw = inference::request_diagnosis(http, config, upload).await?;
    let provisional = interpret::interpret(&raw, &config.fallback);
    let record = normalize::normalize(&provisional);

    info!(disease = %record.disease, healthy = record.healthy, "diagnosis complete");
    Ok((record, upload.data_url()))
}
