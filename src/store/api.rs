//! Request/response client for the non-battle services
//!
//! Every message is posted as JSON to `{base}/api/{MessageName}`. Transient
//! transport resets are retried once; expired or superseded sessions schedule
//! a delayed sign-out of the viewer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::util::time::FORCED_SIGN_OUT_DELAY_MS;

use super::identity::ViewerIdentity;

/// Failure texts that warrant a single retry
const TRANSIENT_MARKERS: [&str; 3] = [
    "Connection reset by peer",
    "StreamTcpException",
    "The http server closed the connection unexpectedly",
];

/// A message the service understands, routed by its name
pub trait ApiMessage: Serialize + Send + Sync {
    const NAME: &'static str;
}

/// Client for request/response calls
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    viewer: ViewerIdentity,
    sign_out_pending: Arc<AtomicBool>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, viewer: ViewerIdentity) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
            viewer,
            sign_out_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), name)
    }

    /// Send `message` and return the response text
    pub async fn send<M: ApiMessage>(&self, message: &M) -> Result<String, ApiError> {
        let result = match self.send_once(message).await {
            Err(e) if e.is_transient() => {
                warn!(message = M::NAME, error = %e, "Transient failure, retrying once");
                self.send_once(message).await
            }
            other => other,
        };

        if let Err(e) = &result {
            self.handle_failure(M::NAME, e);
        }
        result
    }

    async fn send_once<M: ApiMessage>(&self, message: &M) -> Result<String, ApiError> {
        debug!(message = M::NAME, "Sending request");

        let response = self
            .client
            .post(self.endpoint(M::NAME))
            .timeout(self.timeout)
            .json(message)
            .send()
            .await
            .map_err(ApiError::from_request)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(ApiError::from_request)?;
        classify(status, body)
    }

    fn handle_failure(&self, name: &'static str, e: &ApiError) {
        match e {
            ApiError::CredentialInvalid => {
                warn!(message = name, "Credential invalid, signing out");
                self.schedule_sign_out();
            }
            ApiError::Superseded => {
                warn!(message = name, "Session is active on another device, signing out");
                self.schedule_sign_out();
            }
            ApiError::Timeout => warn!(message = name, "Request timed out"),
            other => error!(message = name, error = %other, "Request failed"),
        }
    }

    /// At most one sign-out is pending at a time
    fn schedule_sign_out(&self) {
        if self.sign_out_pending.swap(true, Ordering::AcqRel) {
            debug!("Sign-out already pending");
            return;
        }

        let viewer = self.viewer.clone();
        let pending = self.sign_out_pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(FORCED_SIGN_OUT_DELAY_MS)).await;
            info!("Forced sign-out");
            viewer.sign_out();
            pending.store(false, Ordering::Release);
        });
    }
}

/// Map a response status onto the outcome contract
fn classify(status: u16, body: String) -> Result<String, ApiError> {
    match status {
        200..=299 => Ok(body),
        400 => Err(ApiError::Rejected(body)),
        401 => Err(ApiError::CredentialInvalid),
        409 => Err(ApiError::Superseded),
        _ => Err(ApiError::Status { status, body }),
    }
}

pub fn is_transient_text(text: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Display text of an error and all of its sources
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// Request/response errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Request timed out, please check your network connection")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Credential invalid, please sign in again")]
    CredentialInvalid,

    #[error("Signed in on another device")]
    Superseded,

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    fn from_request(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Connection(error_chain(&e))
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Connection(text) | ApiError::Status { body: text, .. } => {
                is_transient_text(text)
            }
            _ => false,
        }
    }
}
