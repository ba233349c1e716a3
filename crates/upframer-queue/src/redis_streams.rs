//! Broker transport on Redis Streams.
//!
//! Each queue is a stream read through a consumer group. Exchanges are hashes
//! mapping routing keys to queues. Headers travel as a JSON field next to the
//! body. Entries are deleted once settled, and entries left pending longer
//! than the visibility timeout are reclaimed by the next reader.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::headers::MessageHeaders;
use crate::topology::DeadLetterTopology;
use crate::transport::{BrokerTransport, Delivery, OutboundMessage, CONTENT_TYPE_JSON};

const FIELD_BODY: &str = "body";
const FIELD_HEADERS: &str = "headers";
const FIELD_CONTENT_TYPE: &str = "content_type";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key this transport owns
    pub key_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// This process's consumer name within the group
    pub consumer_name: String,
    /// Pending deliveries idle this long are reclaimed. Zero disables reclaim.
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "upframer".to_string(),
            consumer_group: "upframer:workers".to_string(),
            consumer_name: default_consumer_name(),
            visibility_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

fn default_consumer_name() -> String {
    format!("worker-{}", uuid::Uuid::new_v4().simple())
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            consumer_name: std::env::var("QUEUE_CONSUMER_NAME").unwrap_or(defaults.consumer_name),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        }
    }

    fn stream_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.key_prefix, queue)
    }

    fn exchange_key(&self, exchange: &str) -> String {
        format!("{}:exchange:{}", self.key_prefix, exchange)
    }
}

/// Redis Streams broker client.
pub struct RedisBroker {
    config: QueueConfig,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBroker {
    /// Connect and verify the server answers.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        info!(
            consumer = %config.consumer_name,
            group = %config.consumer_group,
            "Connected to Redis broker"
        );

        Ok(Self {
            config,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(QueueConfig::from_env()).await
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        self.conn.lock().await.clone().ok_or(QueueError::Closed)
    }

    async fn add_entry(
        &self,
        conn: &mut MultiplexedConnection,
        queue: &str,
        message: &OutboundMessage,
    ) -> QueueResult<String> {
        // Durability of stream entries is governed by the server's persistence settings
        let headers = serde_json::to_string(&message.headers)?;
        let id: String = redis::cmd("XADD")
            .arg(self.config.stream_key(queue))
            .arg("*")
            .arg(FIELD_BODY)
            .arg(message.body.as_slice())
            .arg(FIELD_HEADERS)
            .arg(headers)
            .arg(FIELD_CONTENT_TYPE)
            .arg(&message.content_type)
            .query_async(conn)
            .await
            .map_err(|e| QueueError::publish_failed(format!("XADD to {} failed: {}", queue, e)))?;
        Ok(id)
    }

    async fn remove_entry(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let key = self.config.stream_key(&delivery.queue);

        redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&key)
            .arg(&self.config.consumer_group)
            .arg(&delivery.tag)
            .ignore()
            .cmd("XDEL")
            .arg(&key)
            .arg(&delivery.tag)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| QueueError::settle_failed(format!("{}: {}", delivery.tag, e)))?;
        Ok(())
    }

    /// Take over one delivery left pending by a consumer that stopped
    /// settling it.
    async fn claim_stale(
        &self,
        conn: &mut MultiplexedConnection,
        queue: &str,
    ) -> QueueResult<Option<Delivery>> {
        if self.config.visibility_timeout.is_zero() {
            return Ok(None);
        }

        let key = self.config.stream_key(queue);
        let min_idle_ms = self.config.visibility_timeout.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&key)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(1)
            .query_async(conn)
            .await?;

        let Some(stale) = pending.ids.first() else {
            return Ok(None);
        };

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&key)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(min_idle_ms)
            .arg(&stale.id)
            .query_async(conn)
            .await?;

        match claimed.ids.into_iter().next() {
            Some(entry) => {
                info!(
                    queue,
                    tag = %entry.id,
                    previous_consumer = %stale.consumer,
                    times_delivered = stale.times_delivered,
                    "Reclaimed stale delivery"
                );
                Ok(Some(self.to_delivery(queue, entry, true)))
            }
            None => Ok(None),
        }
    }

    fn to_delivery(&self, queue: &str, entry: StreamId, redelivered: bool) -> Delivery {
        // A missing body surfaces as an undecodable job rather than being dropped here
        let body: Vec<u8> = entry.get(FIELD_BODY).unwrap_or_default();
        let headers = match entry.get::<String>(FIELD_HEADERS) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(queue, tag = %entry.id, "Ignoring malformed headers: {}", e);
                MessageHeaders::new()
            }),
            None => MessageHeaders::new(),
        };

        Delivery {
            queue: queue.to_string(),
            tag: entry.id,
            body,
            headers,
            redelivered,
        }
    }
}

#[async_trait]
impl BrokerTransport for RedisBroker {
    async fn declare_queue(&self, queue: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // Start at 0 so messages published before the group existed are delivered
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.config.stream_key(queue))
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group {} on {}", self.config.consumer_group, queue),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists on {}", queue);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    async fn declare_dead_letter(&self, topology: &DeadLetterTopology) -> QueueResult<()> {
        self.declare_queue(&topology.queue).await?;

        let mut conn = self.connection().await?;
        conn.hset::<_, _, _, ()>(
            self.config.exchange_key(&topology.exchange),
            &topology.routing_key,
            &topology.queue,
        )
        .await?;

        debug!(
            "Bound {} -> {} via {}",
            topology.exchange, topology.queue, topology.routing_key
        );
        Ok(())
    }

    async fn publish(&self, queue: &str, message: OutboundMessage) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let id = self.add_entry(&mut conn, queue, &message).await?;
        debug!(queue, id = %id, "Published message");
        Ok(())
    }

    async fn publish_to_exchange(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let bound: Option<String> = conn
            .hget(self.config.exchange_key(exchange), routing_key)
            .await?;

        let queue = bound.ok_or_else(|| QueueError::Unroutable {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        })?;

        let id = self.add_entry(&mut conn, &queue, &message).await?;
        debug!(exchange, routing_key, id = %id, "Published message via exchange");
        Ok(())
    }

    async fn next_delivery(&self, queue: &str, block: Duration) -> QueueResult<Option<Delivery>> {
        let mut conn = self.connection().await?;

        if let Some(delivery) = self.claim_stale(&mut conn, queue).await? {
            return Ok(Some(delivery));
        }

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(self.config.stream_key(queue))
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::consume_failed(e.to_string()))?;

        let entry = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next();

        Ok(entry.map(|entry| self.to_delivery(queue, entry, false)))
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.remove_entry(delivery).await?;
        debug!(queue = %delivery.queue, tag = %delivery.tag, "Acknowledged delivery");
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        if requeue {
            let mut conn = self.connection().await?;
            let message = OutboundMessage {
                body: delivery.body.clone(),
                headers: delivery.headers.clone(),
                content_type: CONTENT_TYPE_JSON.to_string(),
                persistent: true,
            };
            self.add_entry(&mut conn, &delivery.queue, &message).await?;
        }

        self.remove_entry(delivery).await?;
        debug!(queue = %delivery.queue, tag = %delivery.tag, requeue, "Rejected delivery");
        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        if self.conn.lock().await.take().is_some() {
            info!("Closed Redis broker connection");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::PRIMARY_QUEUE;

    #[test]
    fn test_key_naming() {
        let config = QueueConfig::default();

        assert_eq!(config.stream_key(PRIMARY_QUEUE), "upframer:queue:job-creation");
        assert_eq!(
            config.exchange_key("job-creation.dlq.exchange"),
            "upframer:exchange:job-creation.dlq.exchange"
        );
    }

    #[test]
    fn test_default_consumer_names_are_unique() {
        assert_ne!(QueueConfig::default().consumer_name, QueueConfig::default().consumer_name);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_redis_round_trip() {
        dotenvy::dotenv().ok();

        let config = QueueConfig {
            key_prefix: format!("upframer-test-{}", uuid::Uuid::new_v4().simple()),
            ..QueueConfig::from_env()
        };
        let broker = RedisBroker::connect(config).await.expect("Failed to connect to Redis");

        broker.declare_queue(PRIMARY_QUEUE).await.unwrap();
        broker.declare_queue(PRIMARY_QUEUE).await.unwrap();

        let headers = MessageHeaders::new().with(crate::HEADER_RETRY_COUNT, 2u32);
        broker
            .publish(
                PRIMARY_QUEUE,
                OutboundMessage::json(b"{}".to_vec()).with_headers(headers.clone()),
            )
            .await
            .unwrap();

        let delivery = broker
            .next_delivery(PRIMARY_QUEUE, Duration::from_millis(500))
            .await
            .unwrap()
            .expect("expected a delivery");
        assert_eq!(delivery.body, b"{}");
        assert_eq!(delivery.headers, headers);

        broker.ack(&delivery).await.unwrap();
        assert!(broker
            .next_delivery(PRIMARY_QUEUE, Duration::from_millis(100))
            .await
            .unwrap()
            .is_none());

        let topology = DeadLetterTopology::for_queue(PRIMARY_QUEUE);
        broker.declare_dead_letter(&topology).await.unwrap();
        broker
            .publish_to_exchange(
                &topology.exchange,
                &topology.routing_key,
                OutboundMessage::json(b"x".to_vec()),
            )
            .await
            .unwrap();

        broker.close().await.unwrap();
        assert!(matches!(
            broker.publish(PRIMARY_QUEUE, OutboundMessage::json(b"{}".to_vec())).await,
            Err(QueueError::Closed)
        ));
    }
}
