use serde_json::Value;
use tracing::{debug, warn};

use crate::config::FallbackDiagnosis;

/// Turns raw model text into a provisional record. Three tiers, first success
/// wins, and the last tier cannot fail: the model's prose formatting is not
/// under our control, so a parse problem must never surface to the caller.
pub fn interpret(raw: &str, fallback: &FallbackDiagnosis) -> Value {
    if let Some(value) = parse_whole(raw) {
        debug!("model output parsed directly");
        return value;
    }

    if let Some(value) = parse_embedded(raw) {
        debug!("model output recovered from surrounding prose");
        return value;
    }

    // Observability signal: tier 3 reached. Operators track this to watch
    // model-output quality over time.
    warn!(
        chars = raw.len(),
        "model output had no parsable JSON object; using fallback diagnosis"
    );
    fallback.to_provisional()
}

/// Tier 1: the whole answer is a JSON object.
fn parse_whole(raw: &str) -> Option<Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_object)
}

/// Tier 2: an object embedded in prose or code fencing. The outermost brace
/// pair is enough; the model emits one object when it emits any.
fn parse_embedded(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&raw[start..=end])
        .ok()
        .filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fallback() -> FallbackDiagnosis {
        FallbackDiagnosis::default()
    }

    #[test]
    fn tier1_accepts_clean_json_verbatim() {
        let object = json!({
            "disease": "Leaf Rust",
            "confidence": 0.9,
            "severity": "Severe",
            "recommendations": ["spray"],
            "alternativeDiseases": [{"name": "Leaf Spot", "confidence": 0.1}]
        });
        let raw = serde_json::to_string(&object).unwrap();
        assert_eq!(interpret(&raw, &fallback()), object);
    }

    #[test]
    fn tier1_rejects_non_object_json() {
        // A bare JSON string parses but is not a diagnosis; tier 3 applies.
        let result = interpret("\"just a string\"", &fallback());
        assert_eq!(result["disease"], "Unknown Disease");
    }

    #[test]
    fn tier2_recovers_object_from_prose() {
        let raw = "Sure! Here is the analysis you asked for:\n\
                   {\"disease\": \"Powdery Mildew\", \"confidence\": 0.8}\n\
                   Let me know if you need anything else.";
        let result = interpret(raw, &fallback());
        assert_eq!(result["disease"], "Powdery Mildew");
    }

    #[test]
    fn tier2_recovers_object_from_code_fence() {
        let raw = "```json\n{\"disease\": \"Blight\", \"alternativeDiseases\": [{\"name\": \"Rust\", \"confidence\": 0.2}]}\n```";
        let result = interpret(raw, &fallback());
        assert_eq!(result["disease"], "Blight");
        assert_eq!(result["alternativeDiseases"][0]["name"], "Rust");
    }

    #[test]
    fn tier3_covers_empty_and_garbage_input() {
        for raw in ["", "I could not analyze this image.", "{not json", "\u{0}\u{1}\u{2}", "}{"] {
            let result = interpret(raw, &fallback());
            assert_eq!(result["disease"], "Unknown Disease", "input: {raw:?}");
            assert_eq!(result["severity"], "Moderate");
            assert!(!result["recommendations"].as_array().unwrap().is_empty());
        }
    }

    #[test]
    fn fallback_wording_is_configurable() {
        let custom = FallbackDiagnosis {
            disease: "Inconclusive".to_string(),
            ..FallbackDiagnosis::default()
        };
        let result = interpret("no json here", &custom);
        assert_eq!(result["disease"], "Inconclusive");
    }
}
