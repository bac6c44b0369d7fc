//! Outbound mail delivery
//!
//! The engine only needs "send this subject and body to this address". The
//! shipped transport posts JSON to a mail relay; tests substitute their own.

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("relay rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("relay timed out")]
    Timeout,
}

#[async_trait]
pub trait Delivery: Send + Sync {
    /// Single attempt; callers never retry at this layer
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Sender identity stamped on every relayed message
#[derive(Debug, Clone)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from_email: &'a str,
    from_name: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Delivery through an HTTP mail relay
#[derive(Clone)]
pub struct HttpRelayDelivery {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    sender: Sender,
}

impl HttpRelayDelivery {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        sender: Sender,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_RELAY_TIMEOUT)
            .build()
            .context("Failed to build mail relay HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
            sender,
        })
    }
}

#[async_trait]
impl Delivery for HttpRelayDelivery {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let message = RelayMessage {
            from_email: &self.sender.email,
            from_name: &self.sender.name,
            to,
            subject,
            body,
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout
            } else {
                DeliveryError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!("Relay accepted message to {to} ({status})");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DeliveryError::Rejected {
            status: 550,
            body: "mailbox unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "relay rejected message (550): mailbox unavailable"
        );
        assert_eq!(DeliveryError::Timeout.to_string(), "relay timed out");
    }

    #[test]
    fn test_relay_payload_shape() {
        let message = RelayMessage {
            from_email: "me@uni.edu",
            from_name: "ThesisLink",
            to: "smith@mit.edu",
            subject: "Hello",
            body: "Body",
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["to"], "smith@mit.edu");
        assert_eq!(json["from_name"], "ThesisLink");
        assert_eq!(json["subject"], "Hello");
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_transport_error() {
        let delivery = HttpRelayDelivery::new(
            "http://127.0.0.1:9/send",
            None,
            Sender {
                email: "me@uni.edu".to_string(),
                name: "ThesisLink".to_string(),
            },
        )
        .unwrap();
        let err = delivery
            .deliver("smith@mit.edu", "Hello", "Body")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Transport(_) | DeliveryError::Timeout
        ));
    }
}
