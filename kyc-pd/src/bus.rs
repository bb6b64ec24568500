//! Broker-backed event bus
//!
//! Publishes envelopes as JSON on named broker channels and runs one
//! listener task per subscription. Handlers are awaited sequentially per
//! topic, so per-topic ordering is preserved end to end. A lost broker
//! connection is retried with a short backoff; events published while the
//! listener is down are lost (at-most-once, best-effort delivery).

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use kyc_common::events::{check_topic, EventBus, EventEnvelope, EventHandler, EventPayload, Topic};
use kyc_common::{Error, Result};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct RedisEventBus {
    client: redis::Client,
    conn: redis::aio::ConnectionManager,
    op_timeout: Duration,
}

impl RedisEventBus {
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("invalid broker url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Unavailable(format!("broker connect: {e}")))?;
        info!("Event bus connected to broker");
        Ok(Self { client, conn, op_timeout })
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, topic: Topic, key: &str, payload: EventPayload) -> Result<()> {
        check_topic(topic, &payload)?;
        let envelope = EventEnvelope {
            topic,
            key: key.to_string(),
            payload,
            published_at: Utc::now(),
        };
        let body = serde_json::to_string(&envelope)
            .map_err(|e| Error::Internal(format!("serialize envelope: {e}")))?;

        let mut conn = self.conn.clone();
        let op = conn.publish::<_, _, i64>(topic.as_str(), body);
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(receivers)) => {
                debug!(topic = %topic, receivers, "Event published");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Unavailable(format!("publish on {topic}: {e}"))),
            Err(_) => Err(Error::Unavailable(format!(
                "publish on {topic} timed out after {} ms",
                self.op_timeout.as_millis()
            ))),
        }
    }

    async fn subscribe(&self, topic: Topic, handler: EventHandler) -> Result<()> {
        let client = self.client.clone();
        tokio::spawn(async move {
            loop {
                match client.get_async_pubsub().await {
                    Ok(mut pubsub) => {
                        if let Err(e) = pubsub.subscribe(topic.as_str()).await {
                            warn!(topic = %topic, error = %e, "Broker subscribe failed");
                        } else {
                            info!(topic = %topic, "Listening");
                            let mut messages = pubsub.on_message();
                            while let Some(message) = messages.next().await {
                                let body: String = match message.get_payload() {
                                    Ok(body) => body,
                                    Err(e) => {
                                        warn!(topic = %topic, error = %e, "Unreadable broker message");
                                        continue;
                                    }
                                };
                                match serde_json::from_str::<EventEnvelope>(&body) {
                                    // Awaited inline: the next message is not
                                    // dispatched until this handler returns
                                    Ok(envelope) => handler(envelope).await,
                                    Err(e) => {
                                        warn!(topic = %topic, error = %e, "Discarding malformed envelope")
                                    }
                                }
                            }
                            warn!(topic = %topic, "Broker stream ended, reconnecting");
                        }
                    }
                    Err(e) => warn!(topic = %topic, error = %e, "Broker connection failed"),
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
        Ok(())
    }
}
