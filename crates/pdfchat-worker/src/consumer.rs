// AMQP consumer for Q&A events
// Decision: Manual ack; a delivery is acked once its event sits in the staging buffer
// Decision: Malformed payloads are nacked without requeue so they cannot loop

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use pdfchat_core::{Disposition, HistoryError, Ingestor, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;

/// Long-lived consumer on the Q&A event queue
pub struct QueueConsumer {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue: String,
}

impl QueueConsumer {
    /// Connect, declare the durable queue and start consuming
    pub async fn connect(config: &WorkerConfig) -> Result<Self> {
        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(queue_error)?;
        let channel = connection.create_channel().await.map_err(queue_error)?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(queue_error)?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(queue_error)?;

        let consumer = channel
            .basic_consume(
                &config.queue,
                &config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(queue_error)?;

        info!(
            queue = %config.queue,
            consumer_tag = %config.consumer_tag,
            prefetch = config.prefetch_count,
            "Consuming Q&A events"
        );

        Ok(Self {
            connection,
            channel,
            consumer,
            queue: config.queue.clone(),
        })
    }

    /// Feed deliveries to the ingestor until shutdown.
    ///
    /// Returns an error if the broker closes the consumer stream.
    pub async fn run(mut self, ingestor: Ingestor, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let result = loop {
            tokio::select! {
                delivery = self.consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            if let Err(e) = settle(&ingestor, delivery).await {
                                break Err(e);
                            }
                        }
                        Some(Err(e)) => break Err(queue_error(e)),
                        None => break Err(HistoryError::queue(format!(
                            "consumer stream for queue {} closed",
                            self.queue
                        ))),
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("Queue consumer: shutdown requested");
                    break Ok(());
                }
            }
        };

        self.close().await;
        result
    }

    async fn close(self) {
        if let Err(e) = self.channel.close(200, "worker shutdown").await {
            debug!(error = %e, "Channel already closed");
        }
        if let Err(e) = self.connection.close(200, "worker shutdown").await {
            debug!(error = %e, "Connection already closed");
        }
        info!(queue = %self.queue, "Queue consumer stopped");
    }
}

/// Apply the ingestor's decision to the delivery
async fn settle(ingestor: &Ingestor, delivery: Delivery) -> Result<()> {
    match ingestor.handle(&delivery.data).await {
        Disposition::Ack => delivery
            .ack(BasicAckOptions::default())
            .await
            .map_err(queue_error),
        Disposition::Reject => {
            warn!(delivery_tag = delivery.delivery_tag, "Dropping malformed delivery");
            delivery
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await
                .map_err(queue_error)
        }
    }
}

fn queue_error(e: lapin::Error) -> HistoryError {
    HistoryError::queue(e.to_string())
}
