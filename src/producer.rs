//! NATS publisher for prediction replies

use crate::service::PredictionReply;
use anyhow::Result;
use async_nats::Client;
use tracing::debug;

/// Producer for answering prediction requests over NATS
#[derive(Clone)]
pub struct ReplyProducer {
    client: Client,
}

impl ReplyProducer {
    /// Create a new reply producer
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish a reply to the requester's inbox
    pub async fn publish(&self, reply_subject: String, reply: &PredictionReply) -> Result<()> {
        let payload = serde_json::to_vec(reply)?;

        self.client
            .publish(reply_subject.clone(), payload.into())
            .await?;

        debug!(
            request_id = %reply.request_id,
            subject = %reply_subject,
            rows = reply.results.len(),
            "Published prediction reply"
        );

        Ok(())
    }
}
