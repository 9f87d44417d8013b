//! Bria generation provider
//!
//! Two-step HTTP flow: image or text is turned into a structured prompt
//! (`/structured_prompt/generate`), and a structured prompt is rendered
//! into an image (`/image/generate`). Long renders return a request id that
//! is polled on `/status/{id}` until it completes.

use crate::config::LocalizerConfig;
use crate::provider::*;
use base64::{engine::general_purpose, Engine};
use brandloc_core::{AttributeMap, LocalizerError, Result};
use brandloc_localize::RegionRequest;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const DEFAULT_BRIA_URL: &str = "https://engine.prod.bria-api.com/v2";
const REQUEST_TIMEOUT_SECS: u64 = 60;
const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const POLL_INTERVAL_MS: u64 = 2000;
const POLL_TIMEOUT_SECS: u64 = 300;

/// Bria provider for structured-prompt image generation
pub struct BriaProvider {
    api_key: String,
    api_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl BriaProvider {
    /// Create a new BriaProvider from config
    pub fn from_config(config: &LocalizerConfig) -> Result<Self> {
        let api_key = config
            .api_key("bria")
            .ok_or_else(|| {
                LocalizerError::Config(
                    "Bria API key not configured. Set BRANDLOC_BRIA_API_KEY or add to .brandloc/config.toml".to_string(),
                )
            })?
            .to_string();

        let api_url = config
            .api_url("bria")
            .unwrap_or(DEFAULT_BRIA_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key,
            api_url,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            poll_timeout: Duration::from_secs(POLL_TIMEOUT_SECS),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    fn post_json_with_retry(&self, url: &str, payload: &serde_json::Value) -> Result<serde_json::Value> {
        for attempt in 0..MAX_RETRIES {
            let agent = build_agent();
            let response = agent
                .post(url)
                .header("api_token", &self.api_key)
                .header("Content-Type", "application/json")
                .send_json(payload);

            match response {
                Ok(mut ok) => {
                    return ok.body_mut().read_json().map_err(|e| {
                        LocalizerError::ExternalService(format!(
                            "Failed to parse Bria response: {}",
                            e
                        ))
                    });
                }
                Err(e) => {
                    if attempt + 1 < MAX_RETRIES && is_retryable_error(&e) {
                        tracing::warn!(url, attempt, error = %e, "Retrying Bria request");
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(LocalizerError::ExternalService(format!(
                        "Bria API request failed: {}",
                        e
                    )));
                }
            }
        }

        Err(LocalizerError::ExternalService(
            "Bria API request failed after retries".to_string(),
        ))
    }

    fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let agent = build_agent();
        let mut response = agent
            .get(url)
            .header("api_token", &self.api_key)
            .call()
            .map_err(|e| LocalizerError::ExternalService(format!("Bria status check failed: {}", e)))?;
        response.body_mut().read_json().map_err(|e| {
            LocalizerError::ExternalService(format!("Failed to parse Bria status: {}", e))
        })
    }

    /// Poll `/status/{id}` until the request completes, fails, or times out
    fn poll_status(&self, request_id: &str) -> Result<serde_json::Value> {
        let url = self.endpoint(&format!("status/{}", request_id));
        let started = Instant::now();

        loop {
            let status = self.get_json(&url)?;
            match parse_status(&status) {
                RemoteStatus::Completed => return Ok(status),
                RemoteStatus::Failed(reason) => {
                    return Err(LocalizerError::ExternalService(format!(
                        "Bria request {} failed: {}",
                        request_id, reason
                    )))
                }
                RemoteStatus::Pending => {}
            }

            if started.elapsed() >= self.poll_timeout {
                return Err(LocalizerError::ExternalService(format!(
                    "Bria request {} timed out after {}s",
                    request_id,
                    self.poll_timeout.as_secs()
                )));
            }
            tracing::debug!(request_id, "Bria request still processing");
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Follow a request id if the service answered asynchronously
    fn resolve(&self, response: serde_json::Value) -> Result<serde_json::Value> {
        if parse_image_url(&response).is_none() && parse_structured_prompt(&response).is_none() {
            if let Some(request_id) = response.get("request_id").and_then(|r| r.as_str()) {
                return self.poll_status(request_id);
            }
        }
        Ok(response)
    }

    fn download_bytes_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        for attempt in 0..MAX_RETRIES {
            let agent = build_agent();
            let response = agent.get(url).call();

            match response {
                Ok(ok) => {
                    let mut reader = ok.into_body().into_reader();
                    let mut bytes = Vec::new();
                    std::io::Read::read_to_end(&mut reader, &mut bytes).map_err(|e| {
                        LocalizerError::ExternalService(format!(
                            "Failed to read image data: {}",
                            e
                        ))
                    })?;
                    return Ok(bytes);
                }
                Err(e) => {
                    if attempt + 1 < MAX_RETRIES && is_retryable_error(&e) {
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(LocalizerError::ExternalService(format!(
                        "Failed to download image: {}",
                        e
                    )));
                }
            }
        }

        Err(LocalizerError::ExternalService(
            "Image download failed after retries".to_string(),
        ))
    }
}

fn build_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .build();
    config.into()
}

fn is_retryable_error(e: &ureq::Error) -> bool {
    match e {
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => true,
        ureq::Error::StatusCode(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
        _ => false,
    }
}

fn sleep_backoff(attempt: usize) {
    let delay_ms = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
    std::thread::sleep(Duration::from_millis(delay_ms));
}

impl GenerationProvider for BriaProvider {
    fn name(&self) -> &str {
        "bria"
    }

    fn health_check(&self) -> Result<ProviderStatus> {
        if self.api_key.is_empty() {
            return Ok(ProviderStatus::NoApiKey);
        }
        Ok(ProviderStatus::Available)
    }

    fn analyze(&self, source: &AnalysisSource) -> Result<AttributeMap> {
        let payload = match source {
            AnalysisSource::Image(path) => {
                let bytes = std::fs::read(path)?;
                serde_json::json!({
                    "images": [general_purpose::STANDARD.encode(&bytes)],
                    "sync": true
                })
            }
            AnalysisSource::Text(brief) => serde_json::json!({
                "prompt": brief,
                "sync": true
            }),
        };

        let response = self.post_json_with_retry(&self.endpoint("structured_prompt/generate"), &payload)?;
        let response = self.resolve(response)?;
        parse_structured_prompt(&response).ok_or_else(|| {
            LocalizerError::ExternalService(format!(
                "No structured prompt in Bria response: {}",
                response
            ))
        })
    }

    fn generate(
        &self,
        request: &RegionRequest,
        params: &GenerationParams,
    ) -> Result<GeneratedAsset> {
        let start = Instant::now();
        let prompt = request.prompt_payload();

        let payload = serde_json::json!({
            "structured_prompt": prompt.to_string(),
            "aspect_ratio": params.aspect_ratio,
            "steps_num": params.steps,
            "guidance_scale": params.guidance,
            "seed": params.seed,
            "sync": false
        });

        tracing::info!(region = %request.region_id(), seed = params.seed, "Submitting Bria generation");
        let response = self.post_json_with_retry(&self.endpoint("image/generate"), &payload)?;
        let response = self.resolve(response)?;

        let image_url = parse_image_url(&response).ok_or_else(|| {
            LocalizerError::ExternalService(format!(
                "Unexpected Bria response format: {}",
                response
            ))
        })?;

        let bytes = self.download_bytes_with_retry(&image_url)?;
        let image = image::load_from_memory(&bytes)?;

        let mut metadata = BTreeMap::new();
        metadata.insert("image_url".to_string(), image_url);
        if let Some(id) = response.get("request_id").and_then(|r| r.as_str()) {
            metadata.insert("request_id".to_string(), id.to_string());
        }

        Ok(GeneratedAsset {
            image,
            prompt_used: prompt,
            provider: "bria".to_string(),
            seed: params.seed,
            duration_secs: start.elapsed().as_secs_f64(),
            metadata,
        })
    }
}

/// State of a remote request
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Pending,
    Completed,
    Failed(String),
}

/// Interpret a `/status/{id}` body
pub fn parse_status(response: &serde_json::Value) -> RemoteStatus {
    let status = response
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_uppercase();
    match status.as_str() {
        "COMPLETED" => RemoteStatus::Completed,
        "FAILED" | "ERROR" => RemoteStatus::Failed(
            response
                .get("error")
                .map(|e| match e.as_str() {
                    Some(s) => s.to_string(),
                    None => e.to_string(),
                })
                .unwrap_or_else(|| "Unknown error".to_string()),
        ),
        _ => RemoteStatus::Pending,
    }
}

/// Extract the image URL from a generation or status body
pub fn parse_image_url(response: &serde_json::Value) -> Option<String> {
    let body = response.get("result").unwrap_or(response);
    body.get("image_url")
        .and_then(|u| u.as_str())
        .or_else(|| {
            body.get("images")
                .and_then(|imgs| imgs.as_array())
                .and_then(|arr| arr.first())
                .and_then(|img| img.get("url"))
                .and_then(|u| u.as_str())
        })
        .map(|s| s.to_string())
}

/// Extract the structured prompt (an embedded JSON string or object)
pub fn parse_structured_prompt(response: &serde_json::Value) -> Option<AttributeMap> {
    let body = response.get("result").unwrap_or(response);
    let prompt = body.get("structured_prompt")?;
    match prompt {
        serde_json::Value::String(s) => serde_json::from_str(s).ok(),
        serde_json::Value::Object(_) => serde_json::from_value(prompt.clone()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let config = LocalizerConfig::default();
        assert!(matches!(
            BriaProvider::from_config(&config),
            Err(LocalizerError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_uses_custom_url() {
        let mut config = LocalizerConfig::default();
        config.providers.insert(
            "bria".to_string(),
            crate::config::ProviderConfig {
                api_key: Some("key".to_string()),
                api_url: Some("https://bria.test/v2/".to_string()),
                enabled: true,
            },
        );
        let provider = BriaProvider::from_config(&config).unwrap();
        assert_eq!(provider.endpoint("image/generate"), "https://bria.test/v2/image/generate");
        assert_eq!(provider.health_check().unwrap(), ProviderStatus::Available);
    }

    #[test]
    fn test_parse_image_url() {
        let sync = serde_json::json!({"result": {"image_url": "https://cdn/x.png", "seed": 42}});
        assert_eq!(parse_image_url(&sync).as_deref(), Some("https://cdn/x.png"));

        let listed = serde_json::json!({"images": [{"url": "https://cdn/y.png"}]});
        assert_eq!(parse_image_url(&listed).as_deref(), Some("https://cdn/y.png"));

        let pending = serde_json::json!({"request_id": "abc", "status_url": "..."});
        assert_eq!(parse_image_url(&pending), None);
    }

    #[test]
    fn test_parse_structured_prompt() {
        let embedded = serde_json::json!({
            "result": {"structured_prompt": "{\"camera_angle\":\"low angle\",\"lighting\":{\"conditions\":\"neon\"}}"}
        });
        let attrs = parse_structured_prompt(&embedded).unwrap();
        assert_eq!(attrs["camera_angle"].as_str(), Some("low angle"));

        let object = serde_json::json!({"structured_prompt": {"style_medium": "photograph"}});
        assert!(parse_structured_prompt(&object).unwrap().contains_key("style_medium"));

        let garbage = serde_json::json!({"structured_prompt": "not json"});
        assert!(parse_structured_prompt(&garbage).is_none());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse_status(&serde_json::json!({"status": "completed"})),
            RemoteStatus::Completed
        );
        assert_eq!(
            parse_status(&serde_json::json!({"status": "ERROR", "error": "nsfw"})),
            RemoteStatus::Failed("nsfw".to_string())
        );
        assert_eq!(
            parse_status(&serde_json::json!({"status": "IN_PROGRESS"})),
            RemoteStatus::Pending
        );
    }
}
