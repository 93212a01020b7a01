// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messaging channel publisher.
//!
//! `POST {messaging_url}/messaging?channel_id={id}` with a bearer token
//! and a JSON body. Rejections come back as:
//!
//! ```json
//! {"error_code": "...", "errors": [{"field": "...", "reason": "...", "message": "..."}]}
//! ```

use crate::assertion::SigningKey;
use crate::bridge::{BridgeError, FramePublisher};
use crate::config::{ChannelId, CloudConfig};
use crate::frame::SensorFrame;
use crate::http::{HttpBody, HttpExecutor, HttpRequest, ReqwestExecutor};
use crate::token::{AuthError, TokenManager};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One entry of a structured rejection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

/// Structured rejection body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorsBody {
    pub error_code: String,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ErrorsBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error code: {}", self.error_code)?;
        for (i, e) in self.errors.iter().enumerate() {
            write!(
                f,
                "; error {}: {{field: {}, reason: {}, message: {}}}",
                i, e.field, e.reason, e.message
            )?;
        }
        Ok(())
    }
}

/// Publish failures.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Endpoint answered with a structured error body.
    #[error("publish rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: ErrorsBody },

    /// Non-200 answer whose body could not be decoded.
    #[error("publish failed with HTTP {status} and unreadable body: {reason}")]
    Unreadable { status: u16, reason: String },

    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("frame serialization failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Authenticated client for the messaging API.
pub struct MessagingClient {
    messaging_url: String,
    tokens: TokenManager,
    http: Arc<dyn HttpExecutor>,
}

impl MessagingClient {
    pub fn new(
        messaging_url: impl Into<String>,
        tokens: TokenManager,
        http: Arc<dyn HttpExecutor>,
    ) -> Self {
        Self {
            messaging_url: messaging_url.into(),
            tokens,
            http,
        }
    }

    /// Build the production client: load the signing key, then share one
    /// `reqwest` executor between token exchange and publishing.
    pub fn from_config(cloud: &CloudConfig) -> Result<Self, BridgeError> {
        let key = SigningKey::from_pem_file(&cloud.private_key_path)?;
        let http: Arc<dyn HttpExecutor> = Arc::new(ReqwestExecutor::new(cloud.http_timeout())?);
        let tokens = TokenManager::new(
            cloud.client_id.clone(),
            cloud.auth_url.clone(),
            cloud.scopes.clone(),
            key,
            http.clone(),
        );
        Ok(Self::new(cloud.messaging_url.clone(), tokens, http))
    }

    /// Token manager, e.g. to pre-fetch a token at startup.
    pub fn tokens_mut(&mut self) -> &mut TokenManager {
        &mut self.tokens
    }

    /// Publish URL for `channel`.
    pub fn publish_url(&self, channel: &ChannelId) -> String {
        // Channel IDs are restricted to [0-9a-v], so no query escaping is needed.
        format!(
            "{}/messaging?channel_id={}",
            self.messaging_url.trim_end_matches('/'),
            channel
        )
    }

    /// Publish raw payload bytes to `channel`.
    pub fn publish(&mut self, channel: &ChannelId, payload: &[u8]) -> Result<(), PublishError> {
        let mut request =
            HttpRequest::post(self.publish_url(channel)).with_body(HttpBody::Bytes(payload.to_vec()));
        self.tokens.authorize_outgoing(&mut request)?;

        let response = self
            .http
            .execute(request)
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        if response.is_ok() {
            tracing::debug!(channel = %channel, bytes = payload.len(), "message published");
            return Ok(());
        }

        match serde_json::from_slice::<ErrorsBody>(&response.body) {
            Ok(body) => Err(PublishError::Rejected {
                status: response.status,
                body,
            }),
            Err(e) => Err(PublishError::Unreadable {
                status: response.status,
                reason: e.to_string(),
            }),
        }
    }

    /// Serialize `frame` as JSON and publish it.
    pub fn publish_frame(
        &mut self,
        channel: &ChannelId,
        frame: &SensorFrame,
    ) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(frame)?;
        self.publish(channel, &payload)
    }
}

impl FramePublisher for MessagingClient {
    type Error = PublishError;

    fn publish_frame(
        &mut self,
        channel: &ChannelId,
        frame: &SensorFrame,
    ) -> Result<(), Self::Error> {
        MessagingClient::publish_frame(self, channel, frame)
    }
}
