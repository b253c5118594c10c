//! Kafka publisher for todo-created events.

use crate::config::KafkaConfig;
use crate::ports::MessagePublisher;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const MESSAGE_TYPE: &str = "todo_created";

/// Errors that can occur while publishing
#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("Failed to create producer: {0}")]
    CreationError(String),

    #[error("Failed to send message to topic {topic}: {message}")]
    SendError { topic: String, message: String },

    #[error("Producer flush timed out after {0:?}")]
    Timeout(Duration),
}

/// Publishes serialized events to a single Kafka topic
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self, PublisherError> {
        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            "Creating Kafka producer"
        );

        let producer: FutureProducer = build_client_config(config)
            .create()
            .map_err(|e| PublisherError::CreationError(e.to_string()))?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            timeout: config.message_timeout(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Flush all pending messages
    pub fn flush(&self, timeout: Duration) -> Result<(), PublisherError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|_| PublisherError::Timeout(timeout))
    }
}

#[async_trait]
impl MessagePublisher for KafkaPublisher {
    #[instrument(skip(self, message), fields(topic = %self.topic))]
    async fn publish(&self, message: &str) -> anyhow::Result<()> {
        let key = message_key(message);
        let headers = OwnedHeaders::new().insert(Header {
            key: "message-type",
            value: Some(MESSAGE_TYPE),
        });

        let mut record = FutureRecord::to(&self.topic)
            .payload(message)
            .headers(headers);
        if let Some(ref k) = key {
            record = record.key(k);
        }

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| PublisherError::SendError {
                topic: self.topic.clone(),
                message: e.to_string(),
            })?;

        debug!(
            key = ?key,
            partition = partition,
            offset = offset,
            "Todo event delivered"
        );

        Ok(())
    }
}

impl Drop for KafkaPublisher {
    fn drop(&mut self) {
        info!("Shutting down Kafka producer");
        if let Err(e) = self.flush(Duration::from_secs(5)) {
            warn!("Failed to flush producer on shutdown: {}", e);
        }
    }
}

/// Producer settings derived from [`KafkaConfig`]
pub fn build_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();

    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("client.id", &config.client_id)
        .set("acks", &config.acks)
        .set("message.timeout.ms", config.message_timeout_ms.to_string());

    let sasl = matches!(
        (&config.sasl_username, &config.sasl_password),
        (Some(_), Some(_))
    );

    let protocol = match (config.ssl_enabled, sasl) {
        (true, true) => "SASL_SSL",
        (true, false) => "SSL",
        (false, true) => "SASL_PLAINTEXT",
        (false, false) => "PLAINTEXT",
    };
    client_config.set("security.protocol", protocol);

    if config.ssl_enabled {
        if let Some(ref ca_location) = config.ssl_ca_location {
            client_config.set("ssl.ca.location", ca_location);
        }
    }

    if let (Some(ref username), Some(ref password)) =
        (&config.sasl_username, &config.sasl_password)
    {
        client_config
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }

    client_config
}

/// Partition key: the `id` field of the JSON payload, when there is one
fn message_key(message: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(message)
        .ok()?
        .get("id")?
        .as_str()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kafka_config() -> KafkaConfig {
        KafkaConfig {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: "todo.created".to_string(),
            client_id: "todo-service".to_string(),
            message_timeout_ms: 5000,
            acks: "all".to_string(),
            ssl_enabled: false,
            ssl_ca_location: None,
            sasl_username: None,
            sasl_password: None,
        }
    }

    #[test]
    fn test_plaintext_client_config() {
        let client_config = build_client_config(&kafka_config());

        assert_eq!(client_config.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(client_config.get("acks"), Some("all"));
        assert_eq!(client_config.get("message.timeout.ms"), Some("5000"));
        assert_eq!(client_config.get("security.protocol"), Some("PLAINTEXT"));
        assert_eq!(client_config.get("sasl.username"), None);
    }

    #[test]
    fn test_sasl_ssl_client_config() {
        let mut config = kafka_config();
        config.ssl_enabled = true;
        config.ssl_ca_location = Some("/etc/ssl/ca.pem".to_string());
        config.sasl_username = Some("todo".to_string());
        config.sasl_password = Some("secret".to_string());

        let client_config = build_client_config(&config);

        assert_eq!(client_config.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(client_config.get("ssl.ca.location"), Some("/etc/ssl/ca.pem"));
        assert_eq!(client_config.get("sasl.mechanisms"), Some("PLAIN"));
    }

    #[test]
    fn test_message_key_from_payload() {
        assert_eq!(
            message_key(r#"{"id":"550e8400-e29b-41d4-a716-446655440000","description":"Buy milk"}"#),
            Some("550e8400-e29b-41d4-a716-446655440000".to_string())
        );
        assert_eq!(message_key(r#"{"description":"no id"}"#), None);
        assert_eq!(message_key("not json"), None);
    }
}
