//! Write path: hosted edge functions that mutate the authoritative store.
//!
//! A successful command is not reflected locally until its change event has
//! been applied to the mirror; see `ResourceSync::wait_for_row`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::types::ResourceType;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{message}")]
    Rejected { message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Command API is not configured")]
    Unavailable,

    #[error("Invalid functions URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    Create,
    Update,
    Delete,
}

impl CommandAction {
    pub fn verb(&self) -> &'static str {
        match self {
            CommandAction::Create => "create",
            CommandAction::Update => "update",
            CommandAction::Delete => "delete",
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for CommandAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(CommandAction::Create),
            "update" => Ok(CommandAction::Update),
            "delete" => Ok(CommandAction::Delete),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

#[async_trait]
pub trait CommandApi: Send + Sync {
    async fn execute(&self, resource: ResourceType, action: CommandAction, payload: Value) -> Result<Value, CommandError>;

    async fn create(&self, resource: ResourceType, payload: Value) -> Result<Value, CommandError> {
        self.execute(resource, CommandAction::Create, payload).await
    }

    async fn update(&self, resource: ResourceType, payload: Value) -> Result<Value, CommandError> {
        self.execute(resource, CommandAction::Update, payload).await
    }

    async fn delete(&self, resource: ResourceType, id: &str) -> Result<Value, CommandError> {
        self.execute(resource, CommandAction::Delete, json!({ "id": id })).await
    }
}

/// Calls `POST {base}/functions/v1/{verb}-{singular}` with the anon key
pub struct EdgeFunctionClient {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
}

impl EdgeFunctionClient {
    pub fn new(functions_url: &str, anon_key: impl Into<String>) -> Result<Self, CommandError> {
        let mut base = Url::parse(functions_url)?;
        // keep any path prefix when joining
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http: reqwest::Client::new(), base, anon_key: anon_key.into() })
    }

    pub fn endpoint(&self, resource: ResourceType, action: CommandAction) -> Result<Url, CommandError> {
        Ok(self.base.join(&format!("functions/v1/{}-{}", action.verb(), resource.singular()))?)
    }
}

#[async_trait]
impl CommandApi for EdgeFunctionClient {
    async fn execute(&self, resource: ResourceType, action: CommandAction, payload: Value) -> Result<Value, CommandError> {
        let url = self.endpoint(resource, action)?;
        tracing::debug!("Calling {}", url);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.anon_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CommandError::Transport(e.to_string()))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Function call failed")
                .to_string();
            tracing::warn!("{} {} rejected ({}): {}", action, resource, status, message);
            return Err(CommandError::Rejected { message });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_names_follow_verb_and_singular() {
        let client = EdgeFunctionClient::new("https://abc.example.co", "anon").unwrap();
        assert_eq!(
            client.endpoint(ResourceType::Pipeline, CommandAction::Create).unwrap().as_str(),
            "https://abc.example.co/functions/v1/create-pipeline"
        );
        assert_eq!(
            client.endpoint(ResourceType::Events, CommandAction::Delete).unwrap().as_str(),
            "https://abc.example.co/functions/v1/delete-event"
        );
    }

    #[test]
    fn endpoint_keeps_path_prefix() {
        let client = EdgeFunctionClient::new("http://localhost:54321/proxy", "anon").unwrap();
        assert_eq!(
            client.endpoint(ResourceType::Inventory, CommandAction::Update).unwrap().as_str(),
            "http://localhost:54321/proxy/functions/v1/update-inventory"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(EdgeFunctionClient::new("not a url", "anon"), Err(CommandError::InvalidUrl(_))));
    }
}
