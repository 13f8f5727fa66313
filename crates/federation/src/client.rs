//! `ActivityPub` HTTP client.
//!
//! Dereferences signing keys and actors of remote servers, and delivers
//! signed activities to their inboxes.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::content_type::{ACTIVITY_JSON, ACTIVITY_STREAMS_PROFILE, LD_JSON};
use crate::signature::{HttpSigner, SignatureError};

/// Error type for AP client operations.
#[derive(Debug, thiserror::Error)]
pub enum ApClientError {
    /// Transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// A GET was answered with a non-success status.
    #[error("Fetch failed: {status} - {body}")]
    FetchFailed {
        /// Response status.
        status: u16,
        /// Response body, empty for 410.
        body: String,
    },
    /// A delivery POST was answered with a non-success status.
    #[error("Delivery failed: {status} - {body}")]
    DeliveryFailed {
        /// Response status.
        status: u16,
        /// Response body.
        body: String,
    },
    /// The request could not be signed.
    #[error("Signing failed: {0}")]
    Signature(#[from] SignatureError),
}

impl ApClientError {
    /// Whether the remote reported the document as missing or deleted.
    #[must_use]
    pub const fn is_gone(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed {
                status: 404 | 410,
                ..
            } | Self::DeliveryFailed {
                status: 404 | 410,
                ..
            }
        )
    }
}

/// `ActivityPub` HTTP client.
#[derive(Clone)]
pub struct ApClient {
    client: Client,
    user_agent: String,
}

impl ApClient {
    /// Create a new AP client identifying itself as `user_agent`.
    pub fn new(user_agent: impl Into<String>) -> Result<Self, ApClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }

    /// Fetch a remote object (actor, key, note, etc.) by its IRI.
    pub async fn fetch_object(&self, url: &Url) -> Result<Value, ApClientError> {
        debug!(url = %url, "Fetching remote object");

        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", &self.user_agent)
            .header(
                "Accept",
                format!("{ACTIVITY_JSON}, {LD_JSON}; {ACTIVITY_STREAMS_PROFILE}"),
            )
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = if status == StatusCode::GONE {
                String::new()
            } else {
                response.text().await.unwrap_or_default()
            };
            Err(ApClientError::FetchFailed {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// POST `body` to `inbox`, signed by `signer`.
    pub async fn deliver(
        &self,
        inbox: &Url,
        body: Vec<u8>,
        signer: &HttpSigner,
    ) -> Result<(), ApClientError> {
        let headers = signer.sign_request("POST", inbox, Some(&body))?;

        debug!(inbox = %inbox, "Delivering activity");

        let response = self
            .client
            .post(inbox.clone())
            .headers(headers)
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", ACTIVITY_JSON)
            .header("Accept", format!("{ACTIVITY_JSON}, {LD_JSON}"))
            .body(body)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            info!(inbox = %inbox, status = %status, "Activity delivered");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(inbox = %inbox, status = %status, "Activity delivery failed");
            Err(ApClientError::DeliveryFailed {
                status: status.as_u16(),
                body,
            })
        }
    }
}
