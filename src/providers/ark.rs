//! Volcengine Ark REST client.
//!
//! Images: `POST {base}/images/generations`
//! 3D tasks: `POST {base}/contents/generations/tasks`, `GET .../tasks/{id}`

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{ApiConfig, Config};
use crate::error::{ArkError, Result};

use super::{parse_api_error, GenerationApi, SequentialMode, TaskHandle, TaskSnapshot};

/// HTTP client for the Ark generation endpoints.
pub struct ArkClient {
    api_key: String,
    settings: ApiConfig,
    client: Client,
}

impl std::fmt::Debug for ArkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArkClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.settings.base_url)
            .finish()
    }
}

impl ArkClient {
    pub fn new(api_key: &str, settings: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ArkError::Provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key: api_key.to_string(),
            settings,
            client,
        })
    }

    /// Build from loaded config; fails when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config.require_api_key()?;
        Self::new(&key, config.api.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn image_request_body(&self, prompt: &str, sequential: SequentialMode) -> Value {
        json!({
            "model": self.settings.image_model,
            "prompt": prompt,
            "sequential_image_generation": sequential.as_str(),
            "response_format": "url",
            "size": self.settings.image_size,
            "stream": false,
            "watermark": false,
            "sequential_image_generation_options": {
                "max_images": self.settings.max_images
            }
        })
    }

    pub(crate) fn model_task_body(&self, image_url: &str) -> Value {
        json!({
            "model": self.settings.model_model,
            "content": [
                {
                    "type": "text",
                    "text": format!(
                        "--subdivisionlevel {} --fileformat {}",
                        self.settings.subdivision_level, self.settings.file_format
                    )
                },
                {
                    "type": "image_url",
                    "image_url": { "url": image_url }
                }
            ]
        })
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ArkError::Provider(format!("Failed reading API response: {}", e)))?;
        if !status.is_success() {
            return Err(parse_api_error(status.as_u16(), &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ArkError::Provider(format!("Failed to parse API response: {}", e)))
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| ArkError::Provider(format!("Request to {} failed: {}", url, e)))?;
        Self::read_json(response).await
    }
}

/// Extract `data[].url` from an image generation response.
pub(crate) fn image_urls(response: &Value) -> Vec<String> {
    response["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["url"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl GenerationApi for ArkClient {
    async fn generate_images(
        &self,
        prompt: &str,
        sequential: SequentialMode,
    ) -> Result<Vec<String>> {
        debug!(
            model = %self.settings.image_model,
            sequential = sequential.as_str(),
            "Requesting image generation"
        );
        let body = self.image_request_body(prompt, sequential);
        let response: Value = self.post_json("images/generations", &body).await?;
        let urls = image_urls(&response);
        debug!(count = urls.len(), "Image generation returned");
        Ok(urls)
    }

    async fn create_model_task(&self, image_url: &str) -> Result<TaskHandle> {
        debug!(model = %self.settings.model_model, "Submitting model generation task");
        let body = self.model_task_body(image_url);
        self.post_json("contents/generations/tasks", &body).await
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot> {
        let url = self.endpoint(&format!("contents/generations/tasks/{}", task_id));
        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ArkError::Provider(format!("Request to {} failed: {}", url, e)))?;
        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ArkClient {
        ArkClient::new("sk-test", ApiConfig::default()).unwrap()
    }

    #[test]
    fn test_debug_redacts_key() {
        let out = format!("{:?}", client());
        assert!(!out.contains("sk-test"));
        assert!(out.contains("REDACTED"));
    }

    #[test]
    fn test_from_config_requires_key() {
        let err = ArkClient::from_config(&Config::default()).unwrap_err();
        assert!(matches!(err, ArkError::Config(_)));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let mut settings = ApiConfig::default();
        settings.base_url = "http://localhost:9000/api/v3/".into();
        let c = ArkClient::new("k", settings).unwrap();
        assert_eq!(
            c.endpoint("/contents/generations/tasks/abc"),
            "http://localhost:9000/api/v3/contents/generations/tasks/abc"
        );
    }

    #[test]
    fn test_image_request_body_shape() {
        let body = client().image_request_body("a red teapot", SequentialMode::Auto);
        assert_eq!(body["model"], "doubao-seedream-4-0-250828");
        assert_eq!(body["prompt"], "a red teapot");
        assert_eq!(body["sequential_image_generation"], "auto");
        assert_eq!(body["response_format"], "url");
        assert_eq!(body["size"], "2K");
        assert_eq!(body["stream"], false);
        assert_eq!(body["watermark"], false);
        assert_eq!(body["sequential_image_generation_options"]["max_images"], 6);
    }

    #[test]
    fn test_model_task_body_shape() {
        let body = client().model_task_body("https://img.example.com/a.png");
        assert_eq!(body["model"], "doubao-seed3d-1-0-250928");
        let content = body["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(
            content[0]["text"],
            "--subdivisionlevel medium --fileformat glb"
        );
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "https://img.example.com/a.png");
    }

    #[test]
    fn test_image_urls_extracts_in_order() {
        let response = json!({
            "model": "m",
            "data": [
                { "url": "https://a/1.png", "size": "2048x2048" },
                { "b64_json": "..." },
                { "url": "https://a/2.png" }
            ]
        });
        assert_eq!(
            image_urls(&response),
            vec!["https://a/1.png".to_string(), "https://a/2.png".to_string()]
        );
    }

    #[test]
    fn test_image_urls_missing_data_is_empty() {
        assert!(image_urls(&json!({"error": {}})).is_empty());
    }
}
