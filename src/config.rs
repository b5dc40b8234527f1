use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::{Value, json};

use crate::models::{DEFAULT_PREVENTION_TIPS, DEFAULT_RECOMMENDATIONS};

const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";
const DEFAULT_INFERENCE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Process-wide configuration, read once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub model: String,
    pub inference_url: String,
    pub inference_timeout: Duration,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub fallback: FallbackDiagnosis,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable is required")?;

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .unwrap_or(3000);

        let timeout_secs = std::env::var("INFERENCE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            api_key,
            model: std::env::var("DIAGNOSIS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            inference_url: std::env::var("INFERENCE_URL")
                .unwrap_or_else(|_| DEFAULT_INFERENCE_URL.to_string()),
            inference_timeout: Duration::from_secs(timeout_secs),
            port,
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "upload".to_string())
                .into(),
            reports_dir: std::env::var("REPORTS_DIR")
                .unwrap_or_else(|_| "reports".to_string())
                .into(),
            fallback: FallbackDiagnosis::default(),
        })
    }
}

/// The inconclusive diagnosis emitted when the model's answer contains no
/// parsable JSON object. Configurable so deployments can tune the wording
/// without touching the interpreter.
#[derive(Debug, Clone)]
pub struct FallbackDiagnosis {
    pub disease: String,
    pub severity: String,
    pub recommendations: Vec<String>,
    pub prevention_tips: Vec<String>,
}

impl Default for FallbackDiagnosis {
    fn default() -> Self {
        Self {
            disease: "Unknown Disease".to_string(),
            severity: "Moderate".to_string(),
            recommendations: DEFAULT_RECOMMENDATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            prevention_tips: DEFAULT_PREVENTION_TIPS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl FallbackDiagnosis {
    /// Renders the fallback as a provisional record, the same loose shape the
    /// interpreter produces from real model output.
    pub fn to_provisional(&self) -> Value {
        json!({
            "disease": self.disease,
            "confidence": 0.75,
            "severity": self.severity,
            "recommendations": self.recommendations,
            "healthy": false,
            "alternativeDiseases": [],
            "cropType": "Unknown",
            "affectedArea": "Unknown",
            "spreadRisk": "Medium",
            "treatmentCost": "Varies",
            "preventionTips": self.prevention_tips,
        })
    }
}
