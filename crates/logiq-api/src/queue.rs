use async_nats::jetstream::{self, stream};
use async_trait::async_trait;
use futures::StreamExt;
use logiq_core::task::{TaskEnvelope, TaskReport};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::state::TaskBoard;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish task: {0}")]
    Publish(String),

    #[error("task stream unavailable: {0}")]
    Stream(String),
}

/// Hands ingestion work to the workers. Returns once the task is durably queued.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, envelope: &TaskEnvelope) -> Result<(), QueueError>;
}

/// Publishes envelopes to a JetStream work-queue stream.
///
/// Tasks stay in the stream until a worker acks them, so nothing is lost
/// while no worker is running.
pub struct NatsTaskQueue {
    jetstream: jetstream::Context,
    subject: String,
}

impl NatsTaskQueue {
    /// Binds to `stream_name`, creating it if no worker has yet.
    pub async fn connect(
        client: async_nats::Client,
        stream_name: &str,
        subject: impl Into<String>,
    ) -> Result<Self, QueueError> {
        let jetstream = jetstream::new(client);
        let subject = subject.into();
        jetstream
            .get_or_create_stream(stream::Config {
                name: stream_name.to_string(),
                subjects: vec![subject.clone()],
                retention: stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| QueueError::Stream(e.to_string()))?;
        info!(stream = stream_name, subject = %subject, "Task stream ready");
        Ok(Self { jetstream, subject })
    }
}

#[async_trait]
impl TaskQueue for NatsTaskQueue {
    async fn enqueue(&self, envelope: &TaskEnvelope) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(envelope)?;
        let ack = self
            .jetstream
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;
        // stored once the server acks
        ack.await.map_err(|e| QueueError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// Feeds worker reports from `subject` into the task board until the subscription closes.
pub async fn follow_reports(
    client: async_nats::Client,
    subject: String,
    board: Arc<TaskBoard>,
) -> Result<(), async_nats::SubscribeError> {
    let mut subscriber = client.subscribe(subject.clone()).await?;
    info!(subject = %subject, "Following task reports");

    while let Some(message) = subscriber.next().await {
        match serde_json::from_slice::<TaskReport>(&message.payload) {
            Ok(report) => {
                debug!(task_id = %report.task_id, status = ?report.status, "Task report");
                board.apply(report);
            }
            Err(e) => error!("Failed to parse task report: {}", e),
        }
    }
    Ok(())
}
