//! RabbitMQ broker client built on `lapin` (AMQP 0.9.1).
//!
//! One connection and one channel are opened at startup and shared: the
//! publisher clones the channel handle, so every generation task publishes
//! through the same channel concurrently. Records go to the default exchange
//! with the queue name as routing key, persistent and `text/plain`. The
//! channel runs in confirm mode and every publish waits for its confirm.

use crate::common::{Error, Result};
use crate::service::broker::{Delivery, Publisher, QueueHandle};
use crate::service::config::BrokerConfig;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, BasicRejectOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

const CONNECTION_NAME: &str = "cdrgen";
const CONSUMER_TAG: &str = "cdrgen";
const PERSISTENT: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

pub struct RabbitBroker {
    connection: Connection,
    channel: Channel,
    redacted_url: String,
}

impl RabbitBroker {
    /// Connects, opens the shared channel, enables publisher confirms and
    /// applies the consumer prefetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Broker`] if any of those steps fails.
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let redacted_url = config.redacted_url();
        tracing::info!(url = %redacted_url, "Connecting to RabbitMQ");

        let connection = Connection::connect(
            &config.url(),
            ConnectionProperties::default().with_connection_name(CONNECTION_NAME.into()),
        )
        .await
        .map_err(|e| Error::broker(format!("connection to {redacted_url} failed: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| Error::broker(format!("channel creation failed: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| Error::broker(format!("failed to enable publisher confirms: {e}")))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| Error::broker(format!("failed to set QoS: {e}")))?;

        Ok(Self {
            connection,
            channel,
            redacted_url,
        })
    }

    pub fn redacted_url(&self) -> &str {
        &self.redacted_url
    }

    /// Declares a durable queue, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Broker`] if the broker refuses the declaration, e.g.
    /// because the queue exists with other properties.
    pub async fn declare_queue(&self, name: &str) -> Result<QueueHandle> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::broker(format!("failed to declare queue `{name}`: {e}")))?;

        tracing::debug!(queue = name, "Queue declared");
        Ok(QueueHandle::new(name))
    }

    pub fn publisher(&self, queue: &QueueHandle) -> RabbitPublisher {
        RabbitPublisher {
            channel: self.channel.clone(),
            queue: queue.name().to_owned(),
        }
    }

    /// Starts a manually acknowledged consumer on `queue`.
    ///
    /// The stream yields an error if the channel fails and ends if the
    /// consumer is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Broker`] if the consumer cannot be registered.
    pub async fn consume(
        &self,
        queue: &QueueHandle,
    ) -> Result<BoxStream<'static, Result<RabbitDelivery>>> {
        let consumer = self
            .channel
            .basic_consume(
                queue.name(),
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                Error::broker(format!("failed to consume from `{}`: {e}", queue.name()))
            })?;

        Ok(consumer
            .map(|delivery| {
                delivery
                    .map(RabbitDelivery::from)
                    .map_err(|e| Error::broker(format!("consumer failed: {e}")))
            })
            .boxed())
    }

    /// Closes the channel, then the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Broker`] if either close fails.
    pub async fn close(self) -> Result<()> {
        self.channel
            .close(REPLY_SUCCESS, "shutting down")
            .await
            .map_err(|e| Error::broker(format!("failed to close channel: {e}")))?;
        self.connection
            .close(REPLY_SUCCESS, "shutting down")
            .await
            .map_err(|e| Error::broker(format!("failed to close connection: {e}")))?;

        tracing::info!(url = %self.redacted_url, "Disconnected from RabbitMQ");
        Ok(())
    }
}

/// Publishes records to one queue over the shared channel.
#[derive(Clone)]
pub struct RabbitPublisher {
    channel: Channel,
    queue: String,
}

impl RabbitPublisher {
    fn publish_error(&self, context: impl core::fmt::Display) -> Error {
        Error::Publish {
            queue: self.queue.clone(),
            context: context.to_string(),
        }
    }
}

#[async_trait]
impl Publisher for RabbitPublisher {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn publish(&self, payload: &str) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT)
                    .with_content_type("text/plain".into()),
            )
            .await
            .map_err(|e| self.publish_error(e))?;

        let confirmation = confirm
            .await
            .map_err(|e| self.publish_error(format!("confirmation failed: {e}")))?;

        if confirmation.is_nack() {
            return Err(self.publish_error("broker nacked the record"));
        }
        Ok(())
    }
}

/// A request message consumed from RabbitMQ.
pub struct RabbitDelivery {
    tag: u64,
    data: Vec<u8>,
    acker: Acker,
}

impl From<lapin::message::Delivery> for RabbitDelivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Self {
            tag: delivery.delivery_tag,
            data: delivery.data,
            acker: delivery.acker,
        }
    }
}

#[async_trait]
impl Delivery for RabbitDelivery {
    fn body(&self) -> &[u8] {
        &self.data
    }

    async fn acknowledge(&self) -> Result<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::broker(format!("ack of delivery {} failed: {e}", self.tag)))
    }

    async fn reject(&self, requeue: bool) -> Result<()> {
        self.acker
            .reject(BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(|e| Error::broker(format!("reject of delivery {} failed: {e}", self.tag)))
    }
}
