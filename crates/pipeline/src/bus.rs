//! Message bus seam and an in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::BusError;

/// One delivery of a message to a consumer.
///
/// The same message may be delivered more than once; `redeliveries` counts
/// how many times it was handed out before this delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub sequence: u64,
    pub topic: String,
    pub payload: Vec<u8>,
    pub redeliveries: u32,
}

/// Topic-addressed, at-least-once bus with manual acknowledgment.
///
/// A polled delivery stays in flight until acknowledged. Unacknowledged
/// deliveries are handed out again by the transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a payload to a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Takes up to `max` pending deliveries from a topic.
    async fn poll(&self, topic: &str, max: usize) -> Result<Vec<Delivery>, BusError>;

    /// Acknowledges a delivery so it is never redelivered.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BusError>;
}

#[derive(Debug, Default)]
struct InMemoryBusState {
    pending: HashMap<String, VecDeque<Delivery>>,
    in_flight: HashMap<u64, Delivery>,
    published: HashMap<String, Vec<Vec<u8>>>,
    next_sequence: u64,
    acked: usize,
    fail_on_publish: Option<String>,
    keep_history: bool,
}

/// In-memory bus for testing and local runs.
///
/// Unacknowledged deliveries are returned to their topic by
/// [`InMemoryBus::redeliver_unacked`], standing in for an ack-wait expiry.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Creates a bus that remembers every published payload for
    /// inspection through [`InMemoryBus::published`].
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryBusState {
                keep_history: true,
                ..InMemoryBusState::default()
            })),
        }
    }

    /// Creates a bus that keeps only pending and in-flight deliveries.
    /// Long-running processes use this so memory tracks the backlog, not
    /// the total traffic.
    pub fn without_history() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryBusState::default())),
        }
    }

    /// Makes publishes to `topic` fail until cleared with `None`.
    pub async fn set_fail_on_publish(&self, topic: Option<&str>) {
        self.state.write().await.fail_on_publish = topic.map(str::to_string);
    }

    /// Returns every payload successfully published to a topic, in order.
    /// Always empty on a bus created with [`InMemoryBus::without_history`].
    pub async fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state
            .read()
            .await
            .published
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of deliveries waiting to be polled on a topic.
    pub async fn pending_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .pending
            .get(topic)
            .map_or(0, VecDeque::len)
    }

    /// Returns the number of polled but unacknowledged deliveries.
    pub async fn in_flight_count(&self) -> usize {
        self.state.read().await.in_flight.len()
    }

    /// Returns the polled but unacknowledged deliveries, oldest first.
    pub async fn unacked(&self) -> Vec<Delivery> {
        let mut deliveries: Vec<Delivery> =
            self.state.read().await.in_flight.values().cloned().collect();
        deliveries.sort_by_key(|d| d.sequence);
        deliveries
    }

    /// Returns the number of acknowledged deliveries.
    pub async fn acked_count(&self) -> usize {
        self.state.read().await.acked
    }

    /// Puts every in-flight delivery back at the head of its topic.
    ///
    /// Returns how many deliveries were requeued.
    pub async fn redeliver_unacked(&self) -> usize {
        self.requeue(|_| true).await
    }

    /// Like [`InMemoryBus::redeliver_unacked`], restricted to one topic.
    pub async fn redeliver_unacked_on(&self, topic: &str) -> usize {
        self.requeue(|d| d.topic == topic).await
    }

    async fn requeue(&self, select: impl Fn(&Delivery) -> bool) -> usize {
        let mut state = self.state.write().await;
        let sequences: Vec<u64> = state
            .in_flight
            .values()
            .filter(|d| select(d))
            .map(|d| d.sequence)
            .collect();
        let mut requeued: Vec<Delivery> = sequences
            .iter()
            .filter_map(|seq| state.in_flight.remove(seq))
            .collect();
        requeued.sort_by_key(|d| std::cmp::Reverse(d.sequence));

        let count = requeued.len();
        for mut delivery in requeued {
            delivery.redeliveries += 1;
            state
                .pending
                .entry(delivery.topic.clone())
                .or_default()
                .push_front(delivery);
        }
        count
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut state = self.state.write().await;

        if state.fail_on_publish.as_deref() == Some(topic) {
            return Err(BusError::PublishFailed {
                topic: topic.to_string(),
                reason: "broker rejected publish".to_string(),
            });
        }

        if state.keep_history {
            state
                .published
                .entry(topic.to_string())
                .or_default()
                .push(payload.clone());
        }

        state.next_sequence += 1;
        let delivery = Delivery {
            sequence: state.next_sequence,
            topic: topic.to_string(),
            payload,
            redeliveries: 0,
        };
        state
            .pending
            .entry(topic.to_string())
            .or_default()
            .push_back(delivery);
        Ok(())
    }

    async fn poll(&self, topic: &str, max: usize) -> Result<Vec<Delivery>, BusError> {
        let mut state = self.state.write().await;
        let taken: Vec<Delivery> = match state.pending.get_mut(topic) {
            Some(queue) => {
                let n = max.min(queue.len());
                queue.drain(..n).collect()
            }
            None => Vec::new(),
        };
        for delivery in &taken {
            state.in_flight.insert(delivery.sequence, delivery.clone());
        }
        Ok(taken)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BusError> {
        let mut state = self.state.write().await;
        if state.in_flight.remove(&delivery.sequence).is_none() {
            return Err(BusError::UnknownDelivery(delivery.sequence));
        }
        state.acked += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_poll_ack() {
        let bus = InMemoryBus::new();
        bus.publish("t", b"one".to_vec()).await.unwrap();
        bus.publish("t", b"two".to_vec()).await.unwrap();

        let batch = bus.poll("t", 10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, b"one");
        assert_eq!(bus.in_flight_count().await, 2);

        bus.ack(&batch[0]).await.unwrap();
        assert_eq!(bus.acked_count().await, 1);
        assert_eq!(bus.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn test_poll_respects_max() {
        let bus = InMemoryBus::new();
        for i in 0..5u8 {
            bus.publish("t", vec![i]).await.unwrap();
        }
        assert_eq!(bus.poll("t", 2).await.unwrap().len(), 2);
        assert_eq!(bus.pending_count("t").await, 3);
        assert!(bus.poll("other", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redeliver_unacked_preserves_order() {
        let bus = InMemoryBus::new();
        bus.publish("t", b"a".to_vec()).await.unwrap();
        bus.publish("t", b"b".to_vec()).await.unwrap();
        bus.publish("t", b"c".to_vec()).await.unwrap();

        let first = bus.poll("t", 2).await.unwrap();
        assert_eq!(bus.redeliver_unacked().await, 2);

        let again = bus.poll("t", 3).await.unwrap();
        let payloads: Vec<&[u8]> = again.iter().map(|d| d.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
        assert_eq!(again[0].sequence, first[0].sequence);
        assert_eq!(again[0].redeliveries, 1);
        assert_eq!(again[2].redeliveries, 0);
    }

    #[tokio::test]
    async fn test_double_ack_rejected() {
        let bus = InMemoryBus::new();
        bus.publish("t", b"a".to_vec()).await.unwrap();
        let delivery = bus.poll("t", 1).await.unwrap().remove(0);

        bus.ack(&delivery).await.unwrap();
        assert!(matches!(
            bus.ack(&delivery).await,
            Err(BusError::UnknownDelivery(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_on_publish_is_topic_scoped() {
        let bus = InMemoryBus::new();
        bus.set_fail_on_publish(Some("out")).await;

        assert!(bus.publish("out", b"x".to_vec()).await.is_err());
        assert!(bus.publish("in", b"x".to_vec()).await.is_ok());
        assert!(bus.published("out").await.is_empty());

        bus.set_fail_on_publish(None).await;
        assert!(bus.publish("out", b"x".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn test_without_history_keeps_only_backlog() {
        let bus = InMemoryBus::without_history();
        for i in 0..3u8 {
            bus.publish("t", vec![i]).await.unwrap();
        }
        assert!(bus.published("t").await.is_empty());

        let batch = bus.poll("t", 3).await.unwrap();
        assert_eq!(batch[2].payload, vec![2]);
        for delivery in &batch {
            bus.ack(delivery).await.unwrap();
        }
        assert_eq!(bus.pending_count("t").await, 0);
        assert_eq!(bus.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn test_unacked_lists_in_flight_oldest_first() {
        let bus = InMemoryBus::new();
        bus.publish("t", b"a".to_vec()).await.unwrap();
        bus.publish("t", b"b".to_vec()).await.unwrap();
        bus.publish("t", b"c".to_vec()).await.unwrap();

        let batch = bus.poll("t", 3).await.unwrap();
        bus.ack(&batch[1]).await.unwrap();

        let unacked = bus.unacked().await;
        let payloads: Vec<&[u8]> = unacked.iter().map(|d| d.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"a"[..], &b"c"[..]]);
        assert_eq!(bus.in_flight_count().await, 2);
    }

    #[tokio::test]
    async fn test_redeliver_unacked_on_leaves_other_topics() {
        let bus = InMemoryBus::new();
        bus.publish("in", b"a".to_vec()).await.unwrap();
        bus.publish("out", b"b".to_vec()).await.unwrap();
        bus.poll("in", 1).await.unwrap();
        bus.poll("out", 1).await.unwrap();

        assert_eq!(bus.redeliver_unacked_on("in").await, 1);
        assert_eq!(bus.pending_count("in").await, 1);
        assert_eq!(bus.pending_count("out").await, 0);
        assert_eq!(bus.unacked().await[0].topic, "out");
    }
}
