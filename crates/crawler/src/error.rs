//! 크롤러 에러 타입

use dofinder_broker::BrokerClientError;
use dofinder_core::error::{DofinderError, RegistryError};
use dofinder_registry::RegistryClientError;

/// 크롤러 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    /// 연속된 페이지 읽기 실패로 크롤링 중단
    #[error("registry unavailable after {failures} consecutive page failures (last page {page}): {reason}")]
    RegistryUnavailable {
        /// 연속 실패 횟수
        failures: u32,
        /// 마지막으로 실패한 페이지
        page: u32,
        /// 마지막 실패 사유
        reason: String,
    },

    /// 레지스트리 호출 실패
    #[error(transparent)]
    Registry(#[from] RegistryClientError),

    /// 발행 실패
    #[error(transparent)]
    Broker(#[from] BrokerClientError),
}

impl From<CrawlerError> for DofinderError {
    fn from(err: CrawlerError) -> Self {
        match err {
            unavailable @ CrawlerError::RegistryUnavailable { .. } => {
                DofinderError::Registry(RegistryError::Unavailable(unavailable.to_string()))
            }
            CrawlerError::Registry(e) => e.into(),
            CrawlerError::Broker(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_unavailable_maps_to_core() {
        let err: DofinderError = CrawlerError::RegistryUnavailable {
            failures: 3,
            page: 7,
            reason: "timeout".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            DofinderError::Registry(RegistryError::Unavailable(_))
        ));
        assert!(err.to_string().contains("page 7"));
    }
}
