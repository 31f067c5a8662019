//! 스캐너 설정
//!
//! [`ScanPoolConfig`]는 core의 [`DofinderConfig`]에서 스캐너 워커 풀에 필요한
//! 값만 모은 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use dofinder_core::config::DofinderConfig;
//! use dofinder_scanner::config::ScanPoolConfig;
//!
//! let config = ScanPoolConfig::from_core(&DofinderConfig::default());
//! config.validate()?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dofinder_core::config::DofinderConfig;
use dofinder_core::types::DEFAULT_CANONICAL_TAG;

use crate::error::ScannerError;

/// 스캐너 워커 풀 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPoolConfig {
    /// 동시 워커 수
    pub workers: usize,
    /// 소비할 큐
    pub queue: String,
    /// 검사할 대표 태그
    pub canonical_tag: String,
    /// 스캔 후 로컬 이미지 삭제 여부
    pub remove_images: bool,
    /// 프로브 하나의 대기 상한 (초)
    pub probe_timeout_secs: u64,

    // --- 확장 설정 (core에 없는 필드) ---
    /// 스캔 이벤트 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for ScanPoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue: "images".to_owned(),
            canonical_tag: DEFAULT_CANONICAL_TAG.to_owned(),
            remove_images: true,
            probe_timeout_secs: 30,
            event_channel_capacity: 256,
        }
    }
}

/// 설정 상한값 상수
const MAX_WORKERS: usize = 64;
const MAX_PROBE_TIMEOUT_SECS: u64 = 3600;
const MAX_EVENT_CHANNEL_CAPACITY: usize = 65_536;

impl ScanPoolConfig {
    /// core 설정에서 생성합니다.
    pub fn from_core(core: &DofinderConfig) -> Self {
        Self {
            workers: core.scanner.workers,
            queue: core.broker.queue.clone(),
            canonical_tag: core.registry.canonical_tag.clone(),
            remove_images: core.scanner.remove_images,
            probe_timeout_secs: core.scanner.probe_timeout_secs,
            ..Self::default()
        }
    }

    /// 픽스처 재생용 테스트 큐를 소비하는 설정으로 바꿉니다.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// 프로브 대기 상한
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ScannerError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ScannerError::Config {
                field: "workers".to_owned(),
                reason: format!("must be 1-{MAX_WORKERS}"),
            });
        }

        if self.probe_timeout_secs == 0 || self.probe_timeout_secs > MAX_PROBE_TIMEOUT_SECS {
            return Err(ScannerError::Config {
                field: "probe_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_PROBE_TIMEOUT_SECS}"),
            });
        }

        if self.event_channel_capacity == 0
            || self.event_channel_capacity > MAX_EVENT_CHANNEL_CAPACITY
        {
            return Err(ScannerError::Config {
                field: "event_channel_capacity".to_owned(),
                reason: format!("must be 1-{MAX_EVENT_CHANNEL_CAPACITY}"),
            });
        }

        if self.queue.is_empty() {
            return Err(ScannerError::Config {
                field: "queue".to_owned(),
                reason: "queue must not be empty".to_owned(),
            });
        }

        if self.canonical_tag.is_empty() {
            return Err(ScannerError::Config {
                field: "canonical_tag".to_owned(),
                reason: "canonical_tag must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}
