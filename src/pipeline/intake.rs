use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::{info, warn};

use crate::error::{DiagnosisError, Result};

/// Multipart field the image must arrive under.
const IMAGE_FIELD: &str = "image";

/// One uploaded photograph, fully read into memory and ready for transport
/// to the inference call. The transient file it was spooled through is gone
/// by the time this value exists.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Base64-encoded file content.
    pub data: String,
    /// Declared media type, trusted downstream (see module tests).
    pub media_type: String,
    pub size: usize,
    /// Advisory only, never used for type decisions.
    pub original_name: Option<String>,
}

impl UploadedImage {
    /// Data URL form used both in the diagnosis response and the outbound
    /// inference call.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Transient upload file, deleted on drop so every exit path releases it.
pub(crate) struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove transient upload {:?}: {}", self.path, e);
        }
    }
}

/// Pulls exactly one image out of the multipart request and spools it through
/// transient storage. Returns `MissingInput` when no `image` field is present.
pub async fn receive_upload(
    multipart: &mut Multipart,
    upload_dir: &Path,
) -> Result<UploadedImage> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| DiagnosisError::MissingInput)?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let original_name = field.file_name().map(|s| s.to_string());
        let media_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|_| DiagnosisError::MissingInput)?;

        // Declared type is trusted, not sniffed. Log-only check so operators
        // can see outbound calls wasted on non-image payloads.
        if image::guess_format(&bytes).is_err() {
            warn!(
                media_type = %media_type,
                size = bytes.len(),
                "upload does not look like a known image format; declared type trusted"
            );
        }

        let size = bytes.len();
        let data = spool_and_encode(upload_dir, &bytes).await?;

        info!(
            size,
            media_type = %media_type,
            original_name = original_name.as_deref().unwrap_or("unknown"),
            "image upload received"
        );
        return Ok(UploadedImage {
            data,
            media_type,
            size,
            original_name,
        });
    }

    Err(DiagnosisError::MissingInput)
}

/// Writes the upload to a transient file, reads it fully back and returns the
/// base64 payload. The file is deleted when the guard drops, which happens
/// only after the read has completed. I/O failures here are storage errors,
/// not upstream ones: no inference call has been made yet.
async fn spool_and_encode(upload_dir: &Path, bytes: &[u8]) -> Result<String> {
    let storage_err = |e: std::io::Error| DiagnosisError::UploadStorage(e.to_string());

    tokio::fs::create_dir_all(upload_dir).await.map_err(storage_err)?;

    let guard = TempFile {
        path: upload_dir.join(uuid::Uuid::new_v4().to_string()),
    };
    tokio::fs::write(guard.path(), bytes).await.map_err(storage_err)?;

    let stored = tokio::fs::read(guard.path()).await.map_err(storage_err)?;
    Ok(STANDARD.encode(stored))
}
