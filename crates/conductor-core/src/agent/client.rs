//! HTTP client for the background-agent REST API.
//!
//! POST   {base_url}/v0/agents                 launch
//! POST   {base_url}/v0/agents/{id}/followup   follow-up
//! GET    {base_url}/v0/agents/{id}            status
//! GET    {base_url}/v0/agents/{id}/conversation
//! DELETE {base_url}/v0/agents/{id}
//!
//! Every request carries `Authorization: Bearer {api_key}`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{AgentService, AgentServiceError, Conversation, RemoteStatus};
use crate::config::EngineConfig;

pub struct CloudAgentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CloudAgentClient {
    pub fn new(config: &EngineConfig) -> Result<Self, AgentServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(AgentServiceError::Config(
                "API key is not set (CONDUCTOR_API_KEY or CURSOR_API_KEY)".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AgentServiceError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v0/agents{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AgentServiceError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AgentServiceError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentServiceError::Http(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(AgentServiceError::Status {
                code: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| AgentServiceError::Decode(e.to_string()))
    }
}

fn id_of(json: &serde_json::Value) -> Result<String, AgentServiceError> {
    json.get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AgentServiceError::Decode("response has no 'id' field".to_string()))
}

#[async_trait]
impl AgentService for CloudAgentClient {
    async fn launch(
        &self,
        content: &str,
        model: &str,
        repository: &str,
        is_sequence: bool,
    ) -> Result<String, AgentServiceError> {
        let body = serde_json::json!({
            "prompt": { "text": content },
            "model": model,
            "source": { "repository": repository },
            "target": { "autoCreatePr": is_sequence }
        });

        tracing::info!(
            "[AgentClient] Launching agent (model: {}, repository: {})",
            model,
            repository
        );

        let json: serde_json::Value = self.send(self.client.post(self.url("")).json(&body)).await?;
        id_of(&json)
    }

    async fn follow_up(&self, agent_id: &str, content: &str) -> Result<String, AgentServiceError> {
        let body = serde_json::json!({ "prompt": { "text": content } });
        tracing::info!("[AgentClient] Sending follow-up to agent {}", agent_id);

        let json: serde_json::Value = self
            .send(
                self.client
                    .post(self.url(&format!("/{}/followup", agent_id)))
                    .json(&body),
            )
            .await?;
        id_of(&json)
    }

    async fn status(&self, agent_id: &str) -> Result<RemoteStatus, AgentServiceError> {
        let json: serde_json::Value = self
            .send(self.client.get(self.url(&format!("/{}", agent_id))))
            .await?;
        let raw = json
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentServiceError::Decode("response has no 'status' field".to_string()))?;
        Ok(RemoteStatus::parse(raw))
    }

    async fn conversation(&self, agent_id: &str) -> Result<Conversation, AgentServiceError> {
        self.send(
            self.client
                .get(self.url(&format!("/{}/conversation", agent_id))),
        )
        .await
    }

    async fn delete(&self, agent_id: &str) -> Result<(), AgentServiceError> {
        tracing::info!("[AgentClient] Deleting agent {}", agent_id);
        let _: serde_json::Value = self
            .send(self.client.delete(self.url(&format!("/{}", agent_id))))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_api_key() {
        let config = EngineConfig::default();
        assert!(matches!(
            CloudAgentClient::new(&config),
            Err(AgentServiceError::Config(_))
        ));
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let config = EngineConfig {
            api_base_url: "https://api.example.com/".to_string(),
            api_key: "key".to_string(),
            ..EngineConfig::default()
        };
        let client = CloudAgentClient::new(&config).unwrap();
        assert_eq!(
            client.url("/bc-1/followup"),
            "https://api.example.com/v0/agents/bc-1/followup"
        );
    }
}
