//! NATS subscriber for incoming prediction requests

use crate::config::NatsConfig;
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use tracing::info;

/// Consumer for receiving prediction requests from NATS.
///
/// Instances that share a queue group split the request stream, so several
/// `serve` processes can run behind one subject.
pub struct RequestConsumer {
    client: Client,
    subject: String,
    queue_group: Option<String>,
}

impl RequestConsumer {
    pub fn new(client: Client, config: &NatsConfig) -> Self {
        Self {
            client,
            subject: config.request_subject.clone(),
            queue_group: config.queue_group().map(str::to_string),
        }
    }

    /// Subscribe to the request subject, joining the queue group if set
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = match &self.queue_group {
            Some(group) => self
                .client
                .queue_subscribe(self.subject.clone(), group.clone())
                .await
                .with_context(|| format!("Failed to join queue group '{}'", group))?,
            None => self
                .client
                .subscribe(self.subject.clone())
                .await
                .with_context(|| format!("Failed to subscribe to '{}'", self.subject))?,
        };

        info!(
            subject = %self.subject,
            queue_group = ?self.queue_group,
            "Subscribed to prediction requests"
        );
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
