use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

use crate::config::AppConfig;
use crate::error::{DiagnosisError, Result};
use crate::pipeline::intake::UploadedImage;

/// Instruction block sent with every image. The schema is requested here but
/// never trusted: the interpreter and normalizer re-validate everything.
pub const DIAGNOSIS_PROMPT: &str = r#"Analyze this crop image for diseases and provide detailed information in JSON format.

Return a JSON response with the following structure:
{
  "disease": "disease name or 'Healthy Plant'",
  "confidence": 0.85,
  "severity": "Mild/Moderate/Severe/Healthy",
  "recommendations": ["treatment1", "treatment2", "treatment3", "treatment4", "treatment5"],
  "healthy": false,
  "alternativeDiseases": [{"name": "alternative1", "confidence": 0.10}, {"name": "alternative2", "confidence": 0.05}],
  "cropType": "detected crop type",
  "affectedArea": "estimated percentage",
  "spreadRisk": "Low/Medium/High/None",
  "treatmentCost": "estimated cost in INR per acre",
  "preventionTips": ["tip1", "tip2", "tip3", "tip4"]
}

Please analyze the image and provide realistic agricultural advice. If the plant appears healthy, indicate that. Respond only with valid JSON."#;

/// One chat-completions request carrying the instruction block and the image
/// as a data URL. Single request-response, no history, no streaming.
pub async fn request_diagnosis(
    http: &Client,
    config: &AppConfig,
    upload: &UploadedImage,
) -> Result<String> {
    let payload = build_request_body(&config.model, upload);

    let response = http
        .post(&config.inference_url)
        .bearer_auth(&config.api_key)
        .timeout(config.inference_timeout)
        .json(&payload)
        .send()
        .await
        .map_err(|e| classify_failure(e.status().map(|s| s.as_u16()), &e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_failure(Some(status.as_u16()), &body));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| DiagnosisError::UpstreamTransport(e.to_string()))?;

    let raw = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            DiagnosisError::UpstreamTransport("invalid response format from model".to_string())
        })?;

    info!(chars = raw.len(), "model answered");
    Ok(raw.to_string())
}

fn build_request_body(model: &str, upload: &UploadedImage) -> Value {
    json!({
        "model": model,
        "messages": [
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": DIAGNOSIS_PROMPT },
                    {
                        "type": "image_url",
                        "image_url": { "url": upload.data_url() }
                    }
                ]
            }
        ],
        "max_tokens": 2000
    })
}

/// Maps an upstream failure onto the error taxonomy. HTTP status wins when we
/// have one; otherwise the provider's message text is inspected the same way
/// callers of this service expect (quota markers vs credential markers).
pub(crate) fn classify_failure(status: Option<u16>, detail: &str) -> DiagnosisError {
    match status {
        Some(401) | Some(403) => DiagnosisError::UpstreamAuth,
        Some(429) => DiagnosisError::UpstreamQuota,
        _ => {
            if detail.contains("API_KEY") || detail.contains("403") {
                DiagnosisError::UpstreamAuth
            } else if detail.contains("quota") || detail.contains("429") {
                DiagnosisError::UpstreamQuota
            } else {
                DiagnosisError::UpstreamTransport(detail.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> UploadedImage {
        UploadedImage {
            data: "QUJD".to_string(),
            media_type: "image/jpeg".to_string(),
            size: 3,
            original_name: None,
        }
    }

    #[test]
    fn request_body_embeds_prompt_and_image() {
        let body = build_request_body("test-model", &upload());
        assert_eq!(body["model"], "test-model");

        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert!(content[0]["text"].as_str().unwrap().contains("valid JSON"));
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/jpeg;base64,QUJD"
        );
    }

    #[test]
    fn prompt_requests_the_full_schema() {
        for key in [
            "disease",
            "confidence",
            "severity",
            "recommendations",
            "healthy",
            "alternativeDiseases",
            "cropType",
            "affectedArea",
            "spreadRisk",
            "treatmentCost",
            "preventionTips",
        ] {
            assert!(DIAGNOSIS_PROMPT.contains(key), "prompt is missing {key}");
        }
    }

    #[test]
    fn quota_markers_classify_as_quota() {
        assert!(matches!(
            classify_failure(None, "got 429 from provider"),
            DiagnosisError::UpstreamQuota
        ));
        assert!(matches!(
            classify_failure(None, "daily quota exhausted"),
            DiagnosisError::UpstreamQuota
        ));
        assert!(matches!(
            classify_failure(Some(429), "anything"),
            DiagnosisError::UpstreamQuota
        ));
    }

    #[test]
    fn credential_markers_classify_as_auth() {
        assert!(matches!(
            classify_failure(None, "API_KEY_INVALID"),
            DiagnosisError::UpstreamAuth
        ));
        assert!(matches!(
            classify_failure(None, "server said 403"),
            DiagnosisError::UpstreamAuth
        ));
        assert!(matches!(
            classify_failure(Some(401), "unauthorized"),
            DiagnosisError::UpstreamAuth
        ));
    }

    #[test]
    fn anything_else_is_transport() {
        let err = classify_failure(None, "connection reset by peer");
        match err {
            DiagnosisError::UpstreamTransport(detail) => {
                assert!(detail.contains("connection reset"))
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
