use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use super::catalog::CommandCatalog;
use super::error::{RemoteError, RemoteResult};
use super::types::{Partition, RemoteCommand};
use crate::config::RemoteConfig;

/// Catalog backed by the platform's REST application-command routes
///
/// - global: `{base}/applications/{app}/commands`
/// - restricted: `{base}/applications/{app}/guilds/{guild}/commands`
pub struct HttpCommandCatalog {
    client: Client,
    api_base: String,
    token: String,
    restricted_guild_id: Option<String>,
    application_id: OnceCell<String>,
    request_timeout: Duration,
}

impl HttpCommandCatalog {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let base = Url::parse(&config.api_base)
            .map_err(|e| RemoteError::InvalidIdentifier(format!("api_base: {}", e)))?;
        let request_timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let client = Client::builder().timeout(request_timeout).build()?;

        let application_id = OnceCell::new();
        if let Some(id) = config.application_id.as_ref().filter(|id| !id.is_empty()) {
            let _ = application_id.set(id.clone());
        }

        Ok(Self {
            client,
            api_base: base.as_str().trim_end_matches('/').to_string(),
            token: config.token.clone().unwrap_or_default(),
            restricted_guild_id: config
                .restricted_guild_id
                .clone()
                .filter(|id| !id.is_empty()),
            application_id,
            request_timeout,
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Configured application id, or the one the token belongs to
    async fn application_id(&self) -> RemoteResult<&str> {
        let id = self
            .application_id
            .get_or_try_init(|| async {
                let url = format!("{}/oauth2/applications/@me", self.api_base);
                let response = self
                    .client
                    .get(&url)
                    .header("Authorization", self.auth_header())
                    .send()
                    .await
                    .map_err(|e| self.map_transport(e))?;
                let body: Value = check_response(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| RemoteError::decode(e.to_string()))?;
                let id = body
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RemoteError::decode("application without an id"))?
                    .to_string();
                info!("Resolved application id {}", id);
                Ok::<_, RemoteError>(id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn commands_url(&self, partition: Partition) -> RemoteResult<String> {
        let app = self.application_id().await?;
        match partition {
            Partition::Global => Ok(format!("{}/applications/{}/commands", self.api_base, app)),
            Partition::Restricted => {
                let guild = self
                    .restricted_guild_id
                    .as_deref()
                    .ok_or(RemoteError::PartitionUnavailable(Partition::Restricted))?;
                Ok(format!(
                    "{}/applications/{}/guilds/{}/commands",
                    self.api_base, app, guild
                ))
            }
        }
    }

    fn map_transport(&self, error: reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout(self.request_timeout)
        } else {
            RemoteError::Transport(error)
        }
    }
}

#[async_trait]
impl CommandCatalog for HttpCommandCatalog {
    async fn list_commands(&self, partition: Partition) -> RemoteResult<Vec<RemoteCommand>> {
        let url = self.commands_url(partition).await?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let body: Value = check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::decode(e.to_string()))?;
        let items = match body {
            Value::Array(items) => items,
            other => {
                return Err(RemoteError::decode(format!(
                    "expected a list of commands, got {}",
                    other
                )))
            }
        };
        items.into_iter().map(RemoteCommand::from_value).collect()
    }

    async fn replace_commands(
        &self,
        partition: Partition,
        commands: &[RemoteCommand],
    ) -> RemoteResult<()> {
        let url = self.commands_url(partition).await?;
        let payload: Vec<&Value> = commands.iter().map(|c| &c.schema).collect();
        debug!("PUT {} ({} commands)", url, payload.len());
        let response = self
            .client
            .put(&url)
            .header("Authorization", self.auth_header())
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        check_response(response).await?;
        Ok(())
    }

    async fn delete_command(
        &self,
        partition: Partition,
        command: &RemoteCommand,
    ) -> RemoteResult<()> {
        let id = command.id.as_deref().ok_or_else(|| {
            RemoteError::InvalidIdentifier(format!("command '{}' has no id", command.name))
        })?;
        let url = format!("{}/{}", self.commands_url(partition).await?, id);
        debug!("DELETE {}", url);
        let response = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        // already gone is as good as deleted
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_response(response).await?;
        Ok(())
    }
}

async fn check_response(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_header = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::Unauthorized(format!("HTTP {}", status.as_u16()))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = retry_after_header
                .or_else(|| {
                    serde_json::from_str::<Value>(&body)
                        .ok()
                        .and_then(|v| v.get("retry_after").and_then(Value::as_f64))
                })
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64);
            RemoteError::RateLimited { retry_after }
        }
        StatusCode::BAD_REQUEST if body.contains("snowflake") => {
            RemoteError::InvalidIdentifier(body)
        }
        _ => RemoteError::Status {
            status: status.as_u16(),
            body,
        },
    })
}
