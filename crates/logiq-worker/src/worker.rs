//! Queue consumer: turns envelopes into ingestion runs and task reports

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_nats::jetstream::{self, AckKind};
use async_nats::jetstream::consumer::{AckPolicy, PullConsumer, pull};
use async_nats::jetstream::stream::{self, RetentionPolicy};
use futures::StreamExt;
use logiq_core::task::{TaskEnvelope, TaskReport, TaskStatus, WORKER_CONSUMER, salvage_task_id};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::retry::RetryPolicy;
use crate::task::IngestTask;

pub struct Worker {
    task: IngestTask,
    policy: RetryPolicy,
    time_limit: Duration,
}

impl Worker {
    pub fn new(task: IngestTask, policy: RetryPolicy, time_limit: Duration) -> Self {
        Self {
            task,
            policy,
            time_limit,
        }
    }

    /// Runs one envelope to completion and returns its final report.
    ///
    /// The time limit covers the whole retry loop; a task that runs past it
    /// is abandoned and reported failed.
    pub async fn handle(&self, envelope: &TaskEnvelope) -> TaskReport {
        let attempts = AtomicU32::new(0);
        let run = self.task.process(&envelope.payload, self.policy, &attempts);

        let status = match tokio::time::timeout(self.time_limit, run).await {
            Ok(Ok(outcome)) => {
                info!(task_id = %envelope.task_id, log_id = %outcome.log_id, attempts = outcome.attempts, "Task succeeded");
                TaskStatus::Succeeded {
                    log_id: outcome.log_id,
                    attempts: outcome.attempts,
                }
            }
            Ok(Err(failure)) => {
                error!(task_id = %envelope.task_id, attempts = failure.attempts, error = %failure.error, "Task failed");
                TaskStatus::Failed {
                    error: failure.error.to_string(),
                    attempts: failure.attempts,
                }
            }
            Err(_) => {
                let attempts = attempts.load(Ordering::Relaxed);
                error!(task_id = %envelope.task_id, attempts, limit_secs = self.time_limit.as_secs(), "Task exceeded time limit");
                TaskStatus::Failed {
                    error: format!("task exceeded time limit of {}s", self.time_limit.as_secs()),
                    attempts,
                }
            }
        };

        TaskReport::new(envelope.task_id, status)
    }
}

/// Where tasks come from and where reports go.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub stream: String,
    pub subject: String,
    pub results_subject: String,
    /// Unacked tasks are redelivered after this long.
    pub ack_wait: Duration,
    pub max_deliveries: i64,
    pub concurrency: usize,
}

/// Final report for a message that is not a valid envelope, if its task id can be recovered.
pub fn undecodable_report(raw: &[u8], error: &serde_json::Error) -> Option<TaskReport> {
    let task_id = salvage_task_id(raw)?;
    Some(TaskReport::new(
        task_id,
        TaskStatus::Failed {
            error: format!("invalid task envelope: {error}"),
            attempts: 0,
        },
    ))
}

async fn publish_report(nats: &async_nats::Client, subject: &str, report: &TaskReport) {
    let payload = match serde_json::to_vec(report) {
        Ok(p) => p,
        Err(e) => {
            error!(task_id = %report.task_id, "Failed to serialize report: {}", e);
            return;
        }
    };
    if let Err(e) = nats.publish(subject.to_string(), payload.into()).await {
        warn!(task_id = %report.task_id, "Failed to publish report: {}", e);
    }
}

async fn ack(message: &jetstream::Message, kind: AckKind) {
    if let Err(e) = message.ack_with(kind).await {
        warn!("Failed to ack task: {}", e);
    }
}

/// Pulls tasks from the ingest stream until the consumer closes.
///
/// A task is acked only after its final report is published, so a worker
/// that dies mid-task leaves it to be redelivered to another worker.
pub async fn run(nats: async_nats::Client, config: QueueConfig, worker: Arc<Worker>) -> Result<(), async_nats::Error> {
    let js = jetstream::new(nats.clone());
    let stream = js
        .get_or_create_stream(stream::Config {
            name: config.stream.clone(),
            subjects: vec![config.subject.clone()],
            retention: RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await?;
    let consumer: PullConsumer = stream
        .get_or_create_consumer(
            WORKER_CONSUMER,
            pull::Config {
                durable_name: Some(WORKER_CONSUMER.to_string()),
                ack_policy: AckPolicy::Explicit,
                ack_wait: config.ack_wait,
                max_deliver: config.max_deliveries,
                ..Default::default()
            },
        )
        .await?;

    info!(
        stream = %config.stream,
        subject = %config.subject,
        consumer = WORKER_CONSUMER,
        concurrency = config.concurrency,
        "Consuming tasks..."
    );
    let mut messages = consumer.messages().await?;
    let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));

    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to pull task: {}", e);
                continue;
            }
        };

        let envelope = match serde_json::from_slice::<TaskEnvelope>(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Failed to parse message: {}", e);
                if let Some(report) = undecodable_report(&message.payload, &e) {
                    publish_report(&nats, &config.results_subject, &report).await;
                }
                // redelivery cannot fix a malformed envelope
                ack(&message, AckKind::Term).await;
                continue;
            }
        };

        if let Ok(info) = message.info() {
            if info.delivered > 1 {
                warn!(task_id = %envelope.task_id, delivery = info.delivered, "Task redelivered");
            }
        }

        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let nats = nats.clone();
        let results_subject = config.results_subject.clone();
        let worker = worker.clone();

        tokio::spawn(async move {
            info!(task_id = %envelope.task_id, service = %envelope.payload.service, "Received task");
            publish_report(&nats, &results_subject, &TaskReport::new(envelope.task_id, TaskStatus::Started)).await;

            let report = worker.handle(&envelope).await;
            publish_report(&nats, &results_subject, &report).await;
            ack(&message, AckKind::Ack).await;
            drop(permit);
        });
    }

    Ok(())
}
