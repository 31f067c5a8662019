//! 브로커 에러 타입
//!
//! [`BrokerClientError`]는 메시지 발행, 구독, 확인 응답, 픽스처 파일 처리에서
//! 발생하는 에러를 표현합니다.

use dofinder_core::error::{BrokerError, ConfigError, DofinderError};

/// 브로커 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum BrokerClientError {
    /// 브로커 연결 실패
    #[error("broker connection error: {0}")]
    Connection(String),

    /// 채널 생성 또는 토폴로지 선언 실패
    #[error("broker channel error: {0}")]
    Channel(String),

    /// 메시지 발행 실패
    #[error("publish to '{route}' failed: {reason}")]
    Publish {
        /// 라우팅 키
        route: String,
        /// 실패 사유
        reason: String,
    },

    /// 구독 스트림 에러
    #[error("consume error: {0}")]
    Consume(String),

    /// ack/nack/reject 전송 실패
    #[error("acknowledgement failed: {0}")]
    Ack(String),

    /// 바인딩되지 않은 큐
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// 디스커버리 메시지 디코딩 실패
    #[error("malformed discovery message: {0}")]
    Decode(String),

    /// 픽스처 파일 처리 실패
    #[error("fixture error: {path}: {reason}")]
    Fixture {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },
}

impl BrokerClientError {
    /// 브로커에 더 이상 도달할 수 없는 상태인지 여부
    ///
    /// 치명적 에러가 발생하면 생산자/소비자는 재시도하지 않고 정지해야 합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Channel(_) | Self::Consume(_) | Self::Ack(_)
        )
    }
}

impl From<BrokerClientError> for DofinderError {
    fn from(err: BrokerClientError) -> Self {
        match err {
            BrokerClientError::Publish { .. } => {
                DofinderError::Broker(BrokerError::Publish(err.to_string()))
            }
            BrokerClientError::Decode(msg) => DofinderError::Broker(BrokerError::Decode(msg)),
            BrokerClientError::Fixture { path, reason } => {
                DofinderError::Config(ConfigError::InvalidValue {
                    field: "fixture.path".to_owned(),
                    reason: format!("{path}: {reason}"),
                })
            }
            other => DofinderError::Broker(BrokerError::Unavailable(other.to_string())),
        }
    }
}
