//! Message broker abstraction.
//!
//! Producers publish to a routing key on one topic exchange; consumers
//! subscribe to a durable queue bound to that key. Delivery is
//! at-least-once and unordered across messages.
//!
//! ```text
//!   crawler ──publish(images.scan)──▶ [exchange: dofinder] ──▶ queue: images ──▶ scanner
//!   fixture ──publish(images.test)──▶ [exchange: dofinder] ──▶ queue: test
//! ```

use std::future::Future;

use dofinder_core::config::BrokerConfig;

use crate::delivery::Delivery;
use crate::error::BrokerClientError;

/// A durable queue bound to a routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Queue name
    pub queue: String,
    /// Routing key the queue is bound with
    pub route_key: String,
}

/// Exchange and bindings declared at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Topic exchange name
    pub exchange: String,
    /// Queue bindings
    pub bindings: Vec<Binding>,
}

impl Topology {
    /// Discovery pair and test-fixture pair from the `[broker]` section.
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            exchange: config.exchange.clone(),
            bindings: vec![
                Binding {
                    queue: config.queue.clone(),
                    route_key: config.route_key.clone(),
                },
                Binding {
                    queue: config.test_queue.clone(),
                    route_key: config.test_route_key.clone(),
                },
            ],
        }
    }

    /// Queues receiving messages published with `route_key`.
    ///
    /// Bindings are exact keys; topic wildcards are not used.
    pub fn queues_for<'a>(&'a self, route_key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.bindings
            .iter()
            .filter(move |b| b.route_key == route_key)
            .map(|b| b.queue.as_str())
    }
}

/// Publishing and subscribing side of the broker.
pub trait MessageBroker: Send + Sync + 'static {
    /// Consumer handle returned by [`subscribe`](Self::subscribe).
    type Consumer: MessageConsumer;

    /// Publishes one persistent message with the given routing key.
    ///
    /// # Errors
    ///
    /// - `BrokerClientError::Publish`: the broker refused the message
    /// - `BrokerClientError::Connection`: the broker is unreachable
    fn publish(
        &self,
        route_key: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), BrokerClientError>> + Send;

    /// Starts consuming from a queue. Each consumer receives a disjoint
    /// subset of the queue's messages.
    fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> impl Future<Output = Result<Self::Consumer, BrokerClientError>> + Send;

    /// Closes the connection. Pending consumers end their streams.
    fn close(&self) -> impl Future<Output = Result<(), BrokerClientError>> + Send;
}

/// Receiving side of one subscription.
pub trait MessageConsumer: Send + 'static {
    /// Waits for the next delivery. `None` once the subscription ended.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Option<Result<Delivery, BrokerClientError>>> + Send;
}
