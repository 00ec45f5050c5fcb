//! Google Cloud Pub/Sub adapter implementing the `Publisher` and `Subscriber`
//! ports.
//!
//! - Uses `google-cloud-pubsub` over gRPC. When `PUBSUB_EMULATOR_HOST` is set
//!   the client talks to the emulator without credentials; otherwise it loads
//!   application default credentials.
//! - Resource names passed through the ports are short ids (`demo-topic`);
//!   the client expands them to `projects/<project>/topics/<id>`.
//! - gRPC `ALREADY_EXISTS` and `NOT_FOUND` map to the matching `CoreError`
//!   variants, everything else to `CoreError::Provider`.

use domain::{AckId, CoreError, Publisher, ReceivedMessage, ResourceName, Service, Subscriber};
use google_cloud_gax::conn::Environment;
use google_cloud_gax::grpc::{Code, Status};
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::subscription::SubscriptionConfig;
use runtime_bridge::BlockingRuntime;
use tracing::{debug, info};

/// Fully qualified topic path.
pub fn topic_path(project: &str, topic: &str) -> String {
    format!("projects/{}/topics/{}", project, topic)
}

/// Fully qualified subscription path.
pub fn subscription_path(project: &str, subscription: &str) -> String {
    format!("projects/{}/subscriptions/{}", project, subscription)
}

/// Publisher and subscriber backed by one Pub/Sub client.
#[derive(Clone)]
pub struct PubSubBroker {
    client: Client,
    project: String,
    rt: BlockingRuntime,
}

impl PubSubBroker {
    /// Connect to Pub/Sub (or the emulator) for `project`.
    pub fn connect(project: &str, rt: BlockingRuntime) -> Result<Self, CoreError> {
        let project_id = project.to_string();
        let client = rt.block_on(async {
            let mut config = ClientConfig {
                project_id: Some(project_id),
                ..Default::default()
            };
            if !matches!(config.environment, Environment::Emulator(_)) {
                config = config
                    .with_auth()
                    .await
                    .map_err(|e| messaging_err(format!("credentials: {e}")))?;
            }
            let emulator = matches!(config.environment, Environment::Emulator(_));
            let client = Client::new(config)
                .await
                .map_err(|e| messaging_err(format!("connect: {e}")))?;
            info!(emulator, "pubsub client ready");
            Ok::<_, CoreError>(client)
        })?;
        Ok(Self {
            client,
            project: project.to_string(),
            rt,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }
}

impl Publisher for PubSubBroker {
    fn create_topic(&self, topic: &ResourceName) -> Result<(), CoreError> {
        let handle = self.client.topic(topic.as_str());
        self.rt
            .block_on(async { handle.create(None, None).await })
            .map_err(map_status)?;
        debug!(topic = %topic_path(&self.project, topic.as_str()), "topic created");
        Ok(())
    }

    fn publish(&self, topic: &ResourceName, data: &[u8]) -> Result<String, CoreError> {
        let handle = self.client.topic(topic.as_str());
        let msg = PubsubMessage {
            data: data.to_vec(),
            ..Default::default()
        };
        let message_id = self.rt.block_on(async {
            let mut publisher = handle.new_publisher(None);
            let awaiter = publisher.publish(msg).await;
            let res = awaiter.get().await;
            // Flush and stop the background publisher tasks either way
            publisher.shutdown().await;
            res
        });
        let message_id = message_id.map_err(map_status)?;
        debug!(topic = %topic, message_id = %message_id, "message published");
        Ok(message_id)
    }
}

impl Subscriber for PubSubBroker {
    fn create_subscription(
        &self,
        subscription: &ResourceName,
        topic: &ResourceName,
    ) -> Result<(), CoreError> {
        let sub = self.client.subscription(subscription.as_str());
        let topic_name = self.client.topic(topic.as_str()).fully_qualified_name().to_string();
        self.rt
            .block_on(async {
                sub.create(&topic_name, SubscriptionConfig::default(), None)
                    .await
            })
            .map_err(map_status)?;
        debug!(
            subscription = %subscription_path(&self.project, subscription.as_str()),
            topic = %topic_name,
            "subscription created"
        );
        Ok(())
    }

    fn pull(
        &self,
        subscription: &ResourceName,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, CoreError> {
        let sub = self.client.subscription(subscription.as_str());
        let max = i32::try_from(max_messages).unwrap_or(i32::MAX);
        let received = self
            .rt
            .block_on(async { sub.pull(max, None).await })
            .map_err(map_status)?;
        debug!(subscription = %subscription, count = received.len(), "pulled");
        Ok(received
            .into_iter()
            .map(|m| ReceivedMessage {
                message_id: m.message.message_id.clone(),
                data: m.message.data.clone(),
                ack_id: AckId::new(m.ack_id()),
            })
            .collect())
    }

    fn acknowledge(&self, subscription: &ResourceName, ack_ids: &[AckId]) -> Result<(), CoreError> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let sub = self.client.subscription(subscription.as_str());
        let ids: Vec<String> = ack_ids.iter().map(|a| a.as_str().to_string()).collect();
        self.rt
            .block_on(async { sub.ack(ids).await })
            .map_err(map_status)?;
        debug!(subscription = %subscription, count = ack_ids.len(), "acknowledged");
        Ok(())
    }
}

fn messaging_err(msg: impl Into<String>) -> CoreError {
    CoreError::provider(Service::Messaging, msg)
}

fn map_status(status: Status) -> CoreError {
    match status.code() {
        Code::AlreadyExists => CoreError::AlreadyExists,
        Code::NotFound => CoreError::NotFound,
        code => messaging_err(format!("{:?}: {}", code, status.message())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_fully_qualified() {
        assert_eq!(topic_path("demo", "demo-topic"), "projects/demo/topics/demo-topic");
        assert_eq!(
            subscription_path("demo", "demo-sub"),
            "projects/demo/subscriptions/demo-sub"
        );
    }

    #[test]
    fn grpc_codes_map_to_domain_errors() {
        assert_eq!(
            map_status(Status::new(Code::AlreadyExists, "Topic already exists")),
            CoreError::AlreadyExists
        );
        assert_eq!(
            map_status(Status::new(Code::NotFound, "Subscription does not exist")),
            CoreError::NotFound
        );
        match map_status(Status::new(Code::Unavailable, "connection refused")) {
            CoreError::Provider { service, message } => {
                assert_eq!(service, Service::Messaging);
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }
}
