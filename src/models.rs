use serde::{Deserialize, Serialize};

/// Disease value the model uses to signal a healthy subject.
pub const HEALTHY_SENTINEL: &str = "Healthy Plant";

/// Canonical diagnosis schema. Every field is present and type-correct in
/// every record leaving the normalizer; callers can rely on that without
/// re-validating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    pub disease: String,
    /// Always within [0.50, 0.98].
    pub confidence: f64,
    pub severity: Severity,
    /// Never empty.
    pub recommendations: Vec<String>,
    pub healthy: bool,
    pub alternative_diseases: Vec<AlternativeDisease>,
    pub crop_type: String,
    pub affected_area: String,
    pub spread_risk: SpreadRisk,
    pub treatment_cost: String,
    /// Never empty.
    pub prevention_tips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeDisease {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
    Healthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadRisk {
    Low,
    Medium,
    High,
    None,
}

/// Generic advice used when the model gives no usable recommendations.
pub const DEFAULT_RECOMMENDATIONS: &[&str] = &[
    "Consult with local agricultural expert",
    "Monitor the plant closely",
    "Consider soil testing",
    "Review irrigation practices",
    "Document symptoms for future reference",
];

pub const DEFAULT_PREVENTION_TIPS: &[&str] = &[
    "Maintain proper plant spacing",
    "Monitor regularly for early detection",
    "Use disease-resistant varieties when possible",
    "Practice crop rotation",
];

/// Body of the report endpoint. `result` is kept loose on purpose: it is
/// re-normalized before rendering, so a caller sending a stale or hand-built
/// record still gets a schema-complete document.
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub result: Option<serde_json::Value>,
    pub image: Option<String>,
}
