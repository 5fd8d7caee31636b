//! Delivery of sign commands to other cluster nodes

use super::command::{SignCommand, SignResponse};
use crate::config::ClusterNodeConfig;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("node {node} unreachable: {message}")]
    Unreachable { node: String, message: String },

    #[error("node {node} answered HTTP {status}")]
    Status { node: String, status: u16 },

    #[error("node {node} sent an unreadable response: {message}")]
    InvalidResponse { node: String, message: String },

    #[error("node {node} did not answer within {seconds}s")]
    Timeout { node: String, seconds: u64 },
}

impl TransportError {
    pub fn node(&self) -> &str {
        match self {
            TransportError::Unreachable { node, .. }
            | TransportError::Status { node, .. }
            | TransportError::InvalidResponse { node, .. }
            | TransportError::Timeout { node, .. } => node,
        }
    }
}

/// Cluster membership and delivery collaborator
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn send_sign_command(
        &self,
        node: &ClusterNodeConfig,
        command: &SignCommand,
    ) -> Result<SignResponse, TransportError>;
}

/// JSON over HTTP: `POST {node.url}/sign`
#[derive(Clone)]
pub struct HttpClusterTransport {
    client: reqwest::Client,
    timeout_seconds: u64,
}

impl HttpClusterTransport {
    pub fn new(timeout_seconds: u64) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout_seconds,
        })
    }

    pub fn sign_url(node: &ClusterNodeConfig) -> String {
        format!("{}/sign", node.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ClusterTransport for HttpClusterTransport {
    async fn send_sign_command(
        &self,
        node: &ClusterNodeConfig,
        command: &SignCommand,
    ) -> Result<SignResponse, TransportError> {
        let url = Self::sign_url(node);
        debug!("Sending sign command for {} to {}", command.address, url);

        let response = self
            .client
            .post(&url)
            .json(command)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        node: node.id.clone(),
                        seconds: self.timeout_seconds,
                    }
                } else {
                    TransportError::Unreachable {
                        node: node.id.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                node: node.id.clone(),
                status: status.as_u16(),
            });
        }

        response
            .json::<SignResponse>()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                node: node.id.clone(),
                message: e.to_string(),
            })
    }
}
