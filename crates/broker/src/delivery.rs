//! A received message and its acknowledgement handle.
//!
//! Every [`Delivery`] must be settled exactly once with [`Delivery::ack`],
//! [`Delivery::reject`] or [`Delivery::requeue`]. The methods consume the
//! delivery, so double settlement does not type-check.

use std::sync::{Arc, Mutex};

use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use tokio::sync::mpsc::WeakUnboundedSender;

use crate::error::BrokerClientError;
use crate::memory::QueuedMessage;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// Processed; remove from the queue.
    Ack,
    /// Unprocessable; drop without redelivery.
    Reject,
    /// Not processed; return to the queue for redelivery.
    Requeue,
}

/// A settled in-memory delivery, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Message body
    pub payload: Vec<u8>,
    /// Settlement
    pub kind: AckKind,
}

pub(crate) enum AckHandle {
    Amqp(lapin::acker::Acker),
    Memory {
        log: Arc<Mutex<Vec<Acknowledgement>>>,
        requeue_to: WeakUnboundedSender<QueuedMessage>,
    },
}

/// One message received from a queue.
pub struct Delivery {
    payload: Vec<u8>,
    redelivered: bool,
    handle: AckHandle,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

impl Delivery {
    pub(crate) fn new(payload: Vec<u8>, redelivered: bool, handle: AckHandle) -> Self {
        Self {
            payload,
            redelivered,
            handle,
        }
    }

    /// Message body.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether the broker delivered this message before.
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Acknowledges the message.
    pub async fn ack(self) -> Result<(), BrokerClientError> {
        self.settle(AckKind::Ack).await
    }

    /// Drops the message without redelivery.
    pub async fn reject(self) -> Result<(), BrokerClientError> {
        self.settle(AckKind::Reject).await
    }

    /// Returns the message to its queue.
    pub async fn requeue(self) -> Result<(), BrokerClientError> {
        self.settle(AckKind::Requeue).await
    }

    async fn settle(self, kind: AckKind) -> Result<(), BrokerClientError> {
        match self.handle {
            AckHandle::Amqp(acker) => {
                let result = match kind {
                    AckKind::Ack => acker.ack(BasicAckOptions::default()).await,
                    AckKind::Reject => {
                        acker
                            .reject(BasicRejectOptions { requeue: false })
                            .await
                    }
                    AckKind::Requeue => {
                        acker
                            .nack(BasicNackOptions {
                                multiple: false,
                                requeue: true,
                            })
                            .await
                    }
                };
                result.map_err(|e| BrokerClientError::Ack(format!("{kind:?}: {e}")))
            }
            AckHandle::Memory { log, requeue_to } => {
                if kind == AckKind::Requeue {
                    // 큐가 닫힌 뒤의 requeue는 버려짐
                    if let Some(sender) = requeue_to.upgrade() {
                        let _ = sender.send(QueuedMessage {
                            payload: self.payload.clone(),
                            redelivered: true,
                        });
                    }
                }
                let mut log = log
                    .lock()
                    .map_err(|e| BrokerClientError::Ack(format!("ack log poisoned: {e}")))?;
                log.push(Acknowledgement {
                    payload: self.payload,
                    kind,
                });
                Ok(())
            }
        }
    }
}
