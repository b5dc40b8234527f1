use serde_json::Value;

use crate::models::{
    AlternativeDisease, DEFAULT_PREVENTION_TIPS, DEFAULT_RECOMMENDATIONS, DiagnosisRecord,
    HEALTHY_SENTINEL, Severity, SpreadRisk,
};

const CONFIDENCE_MIN: f64 = 0.50;
const CONFIDENCE_MAX: f64 = 0.98;
const CONFIDENCE_DEFAULT: f64 = 0.75;

/// Enforces the canonical schema over whatever the interpreter produced.
/// Total over all inputs, including `{}` and non-object values: every field
/// takes the provisional value when present and well-typed, else its default.
pub fn normalize(provisional: &Value) -> DiagnosisRecord {
    let disease = non_empty_string(&provisional["disease"], "Unknown Disease");

    // Derived from the sentinel only when the model omitted it explicitly.
    let healthy = provisional["healthy"]
        .as_bool()
        .unwrap_or(disease == HEALTHY_SENTINEL);

    DiagnosisRecord {
        healthy,
        confidence: clamp_confidence(
            provisional["confidence"].as_f64().unwrap_or(CONFIDENCE_DEFAULT),
        ),
        severity: enum_or(&provisional["severity"], Severity::Moderate),
        recommendations: string_list_or(&provisional["recommendations"], DEFAULT_RECOMMENDATIONS),
        alternative_diseases: alternatives(provisional),
        crop_type: non_empty_string(&provisional["cropType"], "Unknown"),
        affected_area: non_empty_string(&provisional["affectedArea"], "Unknown"),
        spread_risk: enum_or(&provisional["spreadRisk"], SpreadRisk::Medium),
        treatment_cost: non_empty_string(&provisional["treatmentCost"], "Varies"),
        prevention_tips: string_list_or(&provisional["preventionTips"], DEFAULT_PREVENTION_TIPS),
        disease,
    }
}

/// Always runs, even over the default, so there is exactly one code path.
fn clamp_confidence(value: f64) -> f64 {
    value.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
}

fn non_empty_string(value: &Value, default: &str) -> String {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => default.to_string(),
    }
}

fn enum_or<T: serde::de::DeserializeOwned>(value: &Value, default: T) -> T {
    serde_json::from_value(value.clone()).unwrap_or(default)
}

/// Keeps well-typed string entries; an empty or absent list gets the default.
fn string_list_or(value: &Value, default: &[&str]) -> Vec<String> {
    let items: Vec<String> = value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    if items.is_empty() {
        default.iter().map(|s| s.to_string()).collect()
    } else {
        items
    }
}

/// The prompt asks for `alternativeDiseases`, but models following older
/// prompt wording emit `alternative_diseases`; both spellings are accepted.
/// Malformed entries are dropped rather than defaulted: empty is valid here.
fn alternatives(provisional: &Value) -> Vec<AlternativeDisease> {
    let list = match provisional["alternativeDiseases"].as_array() {
        Some(arr) => Some(arr),
        None => provisional["alternative_diseases"].as_array(),
    };

    list.map(|arr| {
        arr.iter()
            .filter_map(|entry| {
                let name = entry["name"].as_str()?;
                let confidence = entry["confidence"].as_f64()?;
                Some(AlternativeDisease {
                    name: name.to_string(),
                    confidence,
                })
            })
            .collect()
    })
    .unwrap_or_default()
}
