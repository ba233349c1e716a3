//! In-process broker transport.
//!
//! Behaves like a single-consumer broker with prefetch 1: a second delivery
//! is refused while one is unsettled. Also records every settlement and can
//! be told to fail publishes, so delivery outcomes can be asserted on.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{QueueError, QueueResult};
use crate::topology::DeadLetterTopology;
use crate::transport::{BrokerTransport, Delivery, OutboundMessage};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Nack { requeue: bool },
}

#[derive(Debug, Clone)]
struct Queued {
    message: OutboundMessage,
    redelivered: bool,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Queued>>,
    declared: Vec<String>,
    bindings: HashMap<(String, String), String>,
    in_flight: HashMap<String, Delivery>,
    settlements: Vec<(String, Settlement)>,
    failing_queues: HashSet<String>,
    next_tag: u64,
    closed: bool,
}

#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> QueueResult<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| QueueError::connection_failed("broker state poisoned"))
    }

    fn open(&self) -> QueueResult<std::sync::MutexGuard<'_, State>> {
        let state = self.lock()?;
        if state.closed {
            return Err(QueueError::Closed);
        }
        Ok(state)
    }

    /// Make every publish that lands on `queue` fail.
    pub fn fail_publishes_to(&self, queue: &str) {
        if let Ok(mut state) = self.lock() {
            state.failing_queues.insert(queue.to_string());
        }
    }

    /// Messages currently waiting on `queue`, oldest first.
    pub fn messages(&self, queue: &str) -> Vec<OutboundMessage> {
        self.lock()
            .map(|state| {
                state
                    .queues
                    .get(queue)
                    .map(|q| q.iter().map(|m| m.message.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Every declaration in call order, including repeats.
    pub fn declarations(&self) -> Vec<String> {
        self.lock().map(|s| s.declared.clone()).unwrap_or_default()
    }

    pub fn settlements(&self) -> Vec<(String, Settlement)> {
        self.lock().map(|s| s.settlements.clone()).unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().map(|s| s.in_flight.len()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|s| s.closed).unwrap_or(true)
    }

    fn enqueue(&self, queue: &str, message: OutboundMessage) -> QueueResult<()> {
        let mut state = self.open()?;
        if state.failing_queues.contains(queue) {
            return Err(QueueError::publish_failed(format!("{} rejected the message", queue)));
        }
        state.queues.entry(queue.to_string()).or_default().push_back(Queued {
            message,
            redelivered: false,
        });
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    fn try_take(&self, queue: &str) -> QueueResult<Option<Delivery>> {
        let mut state = self.open()?;
        if !state.in_flight.is_empty() {
            return Err(QueueError::consume_failed("prefetch limit of 1 reached"));
        }

        let Some(queued) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        state.next_tag += 1;
        let delivery = Delivery {
            queue: queue.to_string(),
            tag: state.next_tag.to_string(),
            body: queued.message.body,
            headers: queued.message.headers,
            redelivered: queued.redelivered,
        };
        state.in_flight.insert(delivery.tag.clone(), delivery.clone());
        Ok(Some(delivery))
    }

    fn settle(&self, delivery: &Delivery, settlement: Settlement) -> QueueResult<Delivery> {
        let mut state = self.open()?;
        let settled = state
            .in_flight
            .remove(&delivery.tag)
            .ok_or_else(|| {
                QueueError::settle_failed(format!("unknown delivery tag {}", delivery.tag))
            })?;
        state.settlements.push((delivery.tag.clone(), settlement));
        Ok(settled)
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> QueueResult<()> {
        let mut state = self.open()?;
        state.declared.push(queue.to_string());
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn declare_dead_letter(&self, topology: &DeadLetterTopology) -> QueueResult<()> {
        let mut state = self.open()?;
        state.declared.push(topology.exchange.clone());
        state.queues.entry(topology.queue.clone()).or_default();
        state.bindings.insert(
            (topology.exchange.clone(), topology.routing_key.clone()),
            topology.queue.clone(),
        );
        Ok(())
    }

    async fn publish(&self, queue: &str, message: OutboundMessage) -> QueueResult<()> {
        self.enqueue(queue, message)
    }

    async fn publish_to_exchange(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> QueueResult<()> {
        let queue = self
            .open()?
            .bindings
            .get(&(exchange.to_string(), routing_key.to_string()))
            .cloned()
            .ok_or_else(|| QueueError::Unroutable {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
            })?;
        self.enqueue(&queue, message)
    }

    async fn next_delivery(&self, queue: &str, block: Duration) -> QueueResult<Option<Delivery>> {
        let notified = self.notify.notified();
        if let Some(delivery) = self.try_take(queue)? {
            return Ok(Some(delivery));
        }
        let _ = tokio::time::timeout(block, notified).await;
        self.try_take(queue)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.settle(delivery, Settlement::Ack)?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        let settled = self.settle(delivery, Settlement::Nack { requeue })?;
        if requeue {
            let mut state = self.open()?;
            state.queues.entry(settled.queue.clone()).or_default().push_front(Queued {
                message: OutboundMessage::json(settled.body).with_headers(settled.headers),
                redelivered: true,
            });
        }
        Ok(())
    }

    async fn close(&self) -> QueueResult<()> {
        self.lock()?.closed = true;
        self.notify.notify_waiters();
        Ok(())
    }
}
