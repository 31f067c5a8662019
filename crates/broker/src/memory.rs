//! In-process broker over tokio channels.
//!
//! Used by tests and by single-process runs. Queues follow the same
//! [`Topology`] as the AMQP broker; consumers of one queue compete for
//! messages. Every settlement is recorded and exposed through
//! [`InMemoryBroker::acknowledgements`]. A requeued message goes back to its
//! queue flagged as redelivered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broker::{MessageBroker, MessageConsumer, Topology};
use crate::delivery::{AckHandle, Acknowledgement, Delivery};
use crate::error::BrokerClientError;

/// 큐에 대기 중인 메시지
#[derive(Debug)]
pub(crate) struct QueuedMessage {
    pub(crate) payload: Vec<u8>,
    /// requeue로 다시 들어온 메시지
    pub(crate) redelivered: bool,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedMessage>>>;

struct MemoryQueue {
    sender: Option<mpsc::UnboundedSender<QueuedMessage>>,
    receiver: SharedReceiver,
}

/// Channel-backed [`MessageBroker`].
pub struct InMemoryBroker {
    topology: Topology,
    queues: Mutex<HashMap<String, MemoryQueue>>,
    acks: Arc<Mutex<Vec<Acknowledgement>>>,
}

impl InMemoryBroker {
    /// Declares every queue in `topology`.
    pub fn new(topology: Topology) -> Self {
        let queues = topology
            .bindings
            .iter()
            .map(|binding| {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    binding.queue.clone(),
                    MemoryQueue {
                        sender: Some(tx),
                        receiver: Arc::new(tokio::sync::Mutex::new(rx)),
                    },
                )
            })
            .collect();
        Self {
            topology,
            queues: Mutex::new(queues),
            acks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Settlements recorded so far, in order.
    pub fn acknowledgements(&self) -> Vec<Acknowledgement> {
        self.acks.lock().map(|acks| acks.clone()).unwrap_or_default()
    }

    /// Removes and returns every message currently waiting in `queue`.
    pub async fn drain(&self, queue: &str) -> Result<Vec<Vec<u8>>, BrokerClientError> {
        let receiver = self.receiver(queue)?;
        let mut rx = receiver.lock().await;
        let mut drained = Vec::new();
        while let Ok(message) = rx.try_recv() {
            drained.push(message.payload);
        }
        Ok(drained)
    }

    fn receiver(&self, queue: &str) -> Result<SharedReceiver, BrokerClientError> {
        let queues = self
            .queues
            .lock()
            .map_err(|e| BrokerClientError::Channel(format!("queue table poisoned: {e}")))?;
        queues
            .get(queue)
            .map(|q| Arc::clone(&q.receiver))
            .ok_or_else(|| BrokerClientError::UnknownQueue(queue.to_owned()))
    }
}

impl MessageBroker for InMemoryBroker {
    type Consumer = InMemoryConsumer;

    async fn publish(&self, route_key: &str, payload: &[u8]) -> Result<(), BrokerClientError> {
        let queues = self
            .queues
            .lock()
            .map_err(|e| BrokerClientError::Channel(format!("queue table poisoned: {e}")))?;

        let mut routed = 0usize;
        for name in self.topology.queues_for(route_key) {
            let Some(sender) = queues.get(name).and_then(|q| q.sender.as_ref()) else {
                return Err(BrokerClientError::Connection("broker closed".to_owned()));
            };
            sender
                .send(QueuedMessage {
                    payload: payload.to_vec(),
                    redelivered: false,
                })
                .map_err(|e| BrokerClientError::Publish {
                    route: route_key.to_owned(),
                    reason: e.to_string(),
                })?;
            routed += 1;
        }

        if routed == 0 {
            warn!(route_key, "message published to a route with no bound queue");
        }
        debug!(route_key, routed, "message published");
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<Self::Consumer, BrokerClientError> {
        let queues = self
            .queues
            .lock()
            .map_err(|e| BrokerClientError::Channel(format!("queue table poisoned: {e}")))?;
        let entry = queues
            .get(queue)
            .ok_or_else(|| BrokerClientError::UnknownQueue(queue.to_owned()))?;
        let requeue_to = entry
            .sender
            .as_ref()
            .map(mpsc::UnboundedSender::downgrade)
            .ok_or_else(|| BrokerClientError::Connection("broker closed".to_owned()))?;

        debug!(queue, consumer_tag, "consumer subscribed");
        Ok(InMemoryConsumer {
            receiver: Arc::clone(&entry.receiver),
            acks: Arc::clone(&self.acks),
            requeue_to,
        })
    }

    async fn close(&self) -> Result<(), BrokerClientError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|e| BrokerClientError::Channel(format!("queue table poisoned: {e}")))?;
        for queue in queues.values_mut() {
            queue.sender = None;
        }
        Ok(())
    }
}

/// Consumer handle of [`InMemoryBroker`].
pub struct InMemoryConsumer {
    receiver: SharedReceiver,
    acks: Arc<Mutex<Vec<Acknowledgement>>>,
    requeue_to: mpsc::WeakUnboundedSender<QueuedMessage>,
}

impl MessageConsumer for InMemoryConsumer {
    async fn recv(&mut self) -> Option<Result<Delivery, BrokerClientError>> {
        let message = self.receiver.lock().await.recv().await?;

        Some(Ok(Delivery::new(
            message.payload,
            message.redelivered,
            AckHandle::Memory {
                log: Arc::clone(&self.acks),
                requeue_to: self.requeue_to.clone(),
            },
        )))
    }
}
