use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::{CommandRequest, CommandResponse};
use url::Url;

pub const DEFAULT_STATE_PATH: &str = "/api/estado_v24";
pub const DEFAULT_COMMAND_PATH: &str = "/api/tcp_send";

/// Channel to the remote controller.
///
/// `send_command` acknowledges delivery only. Whether the command had any
/// effect is observed through later state fetches.
#[async_trait]
pub trait ControllerTransport: Send + Sync {
    async fn fetch_state(&self) -> Result<serde_json::Value>;
    async fn send_command(&self, cmd: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: Url,
    pub state_path: String,
    pub command_path: String,
    pub request_timeout: Option<Duration>,
}

impl HttpTransportConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            state_path: DEFAULT_STATE_PATH.to_string(),
            command_path: DEFAULT_COMMAND_PATH.to_string(),
            request_timeout: None,
        }
    }
}

pub struct HttpControllerTransport {
    http: Client,
    state_url: Url,
    command_url: Url,
}

impl HttpControllerTransport {
    pub fn new(config: &HttpTransportConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build HTTP client")?;

        let state_url = config
            .base_url
            .join(&config.state_path)
            .with_context(|| format!("invalid state path '{}'", config.state_path))?;
        let command_url = config
            .base_url
            .join(&config.command_path)
            .with_context(|| format!("invalid command path '{}'", config.command_path))?;

        Ok(Self {
            http,
            state_url,
            command_url,
        })
    }
}

#[async_trait]
impl ControllerTransport for HttpControllerTransport {
    async fn fetch_state(&self) -> Result<serde_json::Value> {
        let value = self
            .http
            .get(self.state_url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("state response is not JSON")?;
        Ok(value)
    }

    async fn send_command(&self, cmd: &str) -> Result<()> {
        let response: CommandResponse = self
            .http
            .post(self.command_url.clone())
            .json(&CommandRequest {
                cmd: cmd.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("command response is not JSON")?;

        if !response.ok {
            return Err(anyhow!(
                "controller bridge rejected command '{cmd}': {}",
                response.message.as_deref().unwrap_or("no reason given")
            ));
        }
        Ok(())
    }
}

/// True when the controller answered but its body could not be decoded.
pub fn is_malformed_body(err: &anyhow::Error) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .is_some_and(|error| error.is_decode())
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
