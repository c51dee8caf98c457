use crate::error::ChatError;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HUB_ENDPOINT: &str = "https://api-inference.huggingface.co";

/// Authenticated JSON client for the Hugging Face inference API.
#[derive(Debug, Clone)]
pub struct HubClient {
    endpoint: Url,
    token: String,
    client: Client,
}

impl HubClient {
    pub fn new(
        endpoint: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ChatError::MissingCredentials(
                "HUGGINGFACEHUB_API_TOKEN is not set".to_string(),
            ));
        }

        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            token,
            client,
        })
    }

    pub fn url_for(&self, path: &str) -> Result<Url, ChatError> {
        Ok(self.endpoint.join(path.trim_start_matches('/'))?)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ChatError> {
        let url = self.url_for(path)?;
        tracing::debug!(url = %url, "hub request");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ChatError::BackendResponse {
                backend: "huggingface".to_string(),
                details: format!("{status}: {}", error_message(&details)),
            });
        }

        Ok(response.json().await?)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_fails_fast() {
        let result = HubClient::new(DEFAULT_HUB_ENDPOINT, "  ", Duration::from_secs(1));
        assert!(matches!(result, Err(ChatError::MissingCredentials(_))));
    }

    #[test]
    fn paths_join_under_endpoint_prefix() {
        let client = HubClient::new("http://localhost:8080/proxy", "hf_x", Duration::from_secs(1))
            .expect("valid client");
        let url = client.url_for("/models/google/flan-t5-large").expect("valid url");
        assert_eq!(url.as_str(), "http://localhost:8080/proxy/models/google/flan-t5-large");
    }

    #[test]
    fn error_bodies_are_unwrapped() {
        assert_eq!(error_message(r#"{"error":"Model is loading"}"#), "Model is loading");
        assert_eq!(error_message(" rate limited "), "rate limited");
    }
}
