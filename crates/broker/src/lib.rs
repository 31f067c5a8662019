//! # dofinder-broker
//!
//! 크롤러와 스캐너를 분리하는 메시지 채널입니다.
//!
//! - [`MessageBroker`] / [`MessageConsumer`]: 발행/구독 추상화
//! - [`AmqpBroker`]: `lapin` 기반 AMQP 구현 (토픽 익스체인지 + durable 큐)
//! - [`InMemoryBroker`]: tokio 채널 기반 구현 (테스트, 단일 프로세스 실행)
//! - [`Delivery`]: 수신 메시지와 ack/reject/requeue 핸들
//! - [`codec`]: `{"name": "<repository>"}` 메시지 코덱
//! - [`fixture`]: 테스트 픽스처 파일 저장/로딩

pub mod amqp;
pub mod broker;
pub mod codec;
pub mod delivery;
pub mod error;
pub mod fixture;
pub mod memory;

pub use amqp::{AmqpBroker, AmqpConsumer};
pub use broker::{Binding, MessageBroker, MessageConsumer, Topology};
pub use codec::{decode_image, encode_image};
pub use delivery::{AckKind, Acknowledgement, Delivery};
pub use error::BrokerClientError;
pub use fixture::{load_fixture, save_fixture};
pub use memory::{InMemoryBroker, InMemoryConsumer};
