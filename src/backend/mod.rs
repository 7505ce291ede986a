//! Backend sync
//!
//! Pushes hot-reloadable sampling parameters to a running inference backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::storage::settings::ManagerSettings;
use crate::types::config::ApiParameters;

/// Parameters a running backend accepts without restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveParameters {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl From<&ApiParameters> for LiveParameters {
    fn from(params: &ApiParameters) -> Self {
        Self {
            max_tokens: params.max_response_token,
            temperature: params.temperature,
            top_p: params.top_p,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
        }
    }
}

/// Backend errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Something that can apply live parameters to a backend
#[async_trait]
pub trait BackendSync: Send + Sync {
    async fn push_live_parameters(
        &self,
        port: u16,
        params: &LiveParameters,
    ) -> Result<(), BackendError>;

    /// Base URL of the backend listening on `port`
    fn server_root(&self, port: u16) -> String {
        format!("http://127.0.0.1:{}", port)
    }
}

/// HTTP client for the backend's `/update-config` endpoint
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    host: String,
}

impl HttpBackend {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        // System proxies must not intercept backend traffic.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            host: host.into(),
        })
    }

    pub fn from_settings(settings: &ManagerSettings) -> Result<Self, BackendError> {
        Self::new(
            settings.backend_host.clone(),
            Duration::from_secs(settings.push_timeout_secs),
        )
    }

    fn update_config_url(&self, port: u16) -> String {
        format!("{}/update-config", self.server_root(port))
    }
}

#[async_trait]
impl BackendSync for HttpBackend {
    async fn push_live_parameters(
        &self,
        port: u16,
        params: &LiveParameters,
    ) -> Result<(), BackendError> {
        let url = self.update_config_url(port);
        tracing::debug!("Pushing live parameters to {}", url);

        let response = self.client.post(&url).json(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("Backend accepted live parameters on port {}", port);
        Ok(())
    }

    fn server_root(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_parameters_exclude_port() {
        let params = ApiParameters {
            api_port: 9000,
            max_response_token: 2000,
            ..Default::default()
        };
        let live = LiveParameters::from(&params);
        let json = serde_json::to_value(&live).unwrap();

        assert_eq!(json["max_tokens"], 2000);
        assert!(json.get("api_port").is_none());
        assert!(json.get("apiPort").is_none());
        assert_eq!(json.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_urls() {
        let backend = HttpBackend::new("127.0.0.1", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.server_root(8000), "http://127.0.0.1:8000");
        assert_eq!(
            backend.update_config_url(8000),
            "http://127.0.0.1:8000/update-config"
        );
    }

    #[tokio::test]
    async fn test_closed_port_fails() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let backend = HttpBackend::new("127.0.0.1", Duration::from_secs(2)).unwrap();
        let live = LiveParameters::from(&ApiParameters::default());

        let result = backend.push_live_parameters(port, &live).await;
        assert!(result.is_err());
    }
}
