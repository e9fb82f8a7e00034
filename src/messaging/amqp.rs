//! lapin-backed AMQP transport.
//!
//! Every channel is opened in publisher-confirm mode, so a publish only
//! succeeds once the broker has accepted the message.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    options::*,
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::debug;

use super::transport::{
    Acknowledger, BrokerChannel, Delivery, DeliveryStream, Envelope, Transport,
};
use crate::error::BrokerError;
use crate::types::{QueueDescriptor, MAX_PRIORITY};

/// AMQP 0-9-1 transport using lapin.
#[derive(Debug, Clone, Default)]
pub struct AmqpTransport;

#[async_trait]
impl Transport for AmqpTransport {
    type Connection = Connection;
    type Channel = AmqpChannel;

    async fn dial(&self, uri: &str) -> Result<Connection, BrokerError> {
        Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))
    }

    async fn open_channel(&self, conn: &Connection) -> Result<AmqpChannel, BrokerError> {
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;

        Ok(AmqpChannel { channel })
    }

    async fn close(&self, conn: &Connection) {
        if let Err(e) = conn.close(200, "OK").await {
            debug!(error = %e, "Closing broker connection failed");
        }
    }
}

/// A lapin channel in confirm mode.
pub struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&self, queue: &QueueDescriptor) -> Result<(), BrokerError> {
        let mut args = FieldTable::default();
        if queue.has_priority {
            args.insert(
                "x-max-priority".into(),
                AMQPValue::ShortInt(i16::from(MAX_PRIORITY)),
            );
        }

        let options = QueueDeclareOptions {
            durable: true,
            exclusive: false,
            auto_delete: false,
            ..Default::default()
        };

        self.channel
            .queue_declare(&queue.name, options, args)
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Declare {
                queue: queue.name.clone(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, routing_key: &str, envelope: &Envelope) -> Result<(), BrokerError> {
        let publish_err = |reason: String| BrokerError::Publish {
            queue: routing_key.to_string(),
            reason,
        };

        let mut properties =
            BasicProperties::default().with_content_type(Envelope::CONTENT_TYPE.into());
        if envelope.persistent {
            properties = properties.with_delivery_mode(2);
        }
        if let Some(priority) = envelope.priority {
            properties = properties.with_priority(priority);
        }
        if let Some(correlation_id) = &envelope.correlation_id {
            properties = properties.with_correlation_id(correlation_id.as_str().into());
        }

        let confirmation = self
            .channel
            .basic_publish(
                "",
                routing_key,
                BasicPublishOptions::default(),
                &envelope.body,
                properties,
            )
            .await
            .map_err(|e| publish_err(e.to_string()))?
            .await
            .map_err(|e| publish_err(e.to_string()))?;

        if confirmation.is_nack() {
            return Err(publish_err("broker rejected message".to_string()));
        }

        Ok(())
    }

    async fn qos(&self, prefetch: u16) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Qos(e.to_string()))
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let options = BasicConsumeOptions {
            no_ack: false,
            ..Default::default()
        };

        let consumer = self
            .channel
            .basic_consume(queue, consumer_tag, options, FieldTable::default())
            .await
            .map_err(|e| BrokerError::Consume {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        let stream = consumer.map(|delivery| {
            delivery
                .map(|d| {
                    let correlation_id = d
                        .properties
                        .correlation_id()
                        .as_ref()
                        .map(|id| id.as_str().to_string());
                    Delivery::new(d.data, correlation_id, Box::new(AmqpAcker(d.acker)))
                })
                .map_err(|e| BrokerError::Delivery(e.to_string()))
        });

        Ok(stream.boxed())
    }

    async fn close(&self) {
        if let Err(e) = self.channel.close(200, "OK").await {
            debug!(error = %e, "Closing channel failed");
        }
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn requeue(&self) -> Result<(), BrokerError> {
        self.0
            .nack(BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}
