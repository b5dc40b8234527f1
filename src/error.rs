use thiserror::Error;

/// Failures that can leave the diagnosis pipeline.
///
/// Parse failures never appear here: the interpreter absorbs them into a
/// fallback record instead. Only upstream-call and report-synthesis problems
/// reach callers as errors.
#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("no image file uploaded")]
    MissingInput,

    /// Credentials missing or rejected. The variant carries no payload so the
    /// key (or the provider's raw error text) can never leak into a response.
    #[error("inference credentials are missing or invalid")]
    UpstreamAuth,

    #[error("inference quota exceeded")]
    UpstreamQuota,

    /// Anything else the inference call can do wrong: network faults,
    /// malformed responses, model-side errors. The detail is for logs only.
    #[error("inference call failed: {0}")]
    UpstreamTransport(String),

    /// Local disk trouble while spooling an upload, before any outbound call
    /// was made. Detail is for logs only.
    #[error("upload storage failed: {0}")]
    UploadStorage(String),

    #[error("report generation failed: {0}")]
    ReportGeneration(String),
}

pub type Result<T> = std::result::Result<T, DiagnosisError>;
