//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `dofinder_`
//! - 모듈명: `crawler_`, `scanner_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (created, updated, discarded, failed / found, not_found, error)
pub const LABEL_RESULT: &str = "result";

/// 스캔 판단 레이블 키 (new, needs_rescan, up_to_date)
pub const LABEL_DECISION: &str = "decision";

/// 프로브 종류 레이블 키 (system, software)
pub const LABEL_PROBE_KIND: &str = "kind";

// ─── Crawler 메트릭 ────────────────────────────────────────────────

/// Crawler: 발행된 이미지 수 (counter)
pub const CRAWLER_IMAGES_PUBLISHED_TOTAL: &str = "dofinder_crawler_images_published_total";

/// Crawler: 필터에서 제외된 저장소 수 (counter)
pub const CRAWLER_REPOSITORIES_REJECTED_TOTAL: &str =
    "dofinder_crawler_repositories_rejected_total";

/// Crawler: 읽기에 실패해 건너뛴 페이지 수 (counter)
pub const CRAWLER_PAGE_FAILURES_TOTAL: &str = "dofinder_crawler_page_failures_total";

/// Crawler: 태그 목록 조회 실패로 건너뛴 저장소 수 (counter)
pub const CRAWLER_TAG_FAILURES_TOTAL: &str = "dofinder_crawler_tag_failures_total";

// ─── Scanner 메트릭 ────────────────────────────────────────────────

/// Scanner: 처리한 메시지 수 (counter, label: result)
pub const SCANNER_MESSAGES_TOTAL: &str = "dofinder_scanner_messages_total";

/// Scanner: 스캔 판단 수 (counter, label: decision)
pub const SCANNER_DECISIONS_TOTAL: &str = "dofinder_scanner_decisions_total";

/// Scanner: 실행한 프로브 수 (counter, labels: kind, result)
pub const SCANNER_PROBES_TOTAL: &str = "dofinder_scanner_probes_total";

/// Scanner: 프로브 타임아웃 수 (counter)
pub const SCANNER_PROBE_TIMEOUTS_TOTAL: &str = "dofinder_scanner_probe_timeouts_total";

/// Scanner: 삭제한 프로브 컨테이너 수 (counter)
pub const SCANNER_CONTAINERS_REMOVED_TOTAL: &str = "dofinder_scanner_containers_removed_total";

/// Scanner: 이미지 하나의 스캔 소요 시간 (histogram, 초)
pub const SCANNER_SCAN_DURATION_SECONDS: &str = "dofinder_scanner_scan_duration_seconds";

/// Scanner: 실행 중인 워커 수 (gauge)
pub const SCANNER_ACTIVE_WORKERS: &str = "dofinder_scanner_active_workers";

/// 모든 메트릭의 설명을 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Crawler
    describe_counter!(
        CRAWLER_IMAGES_PUBLISHED_TOTAL,
        "Total number of eligible images published to the discovery topic"
    );
    describe_counter!(
        CRAWLER_REPOSITORIES_REJECTED_TOTAL,
        "Repositories skipped because the canonical tag is missing or empty"
    );
    describe_counter!(
        CRAWLER_PAGE_FAILURES_TOTAL,
        "Registry listing pages that could not be read and were skipped"
    );
    describe_counter!(
        CRAWLER_TAG_FAILURES_TOTAL,
        "Repositories skipped because their tag listing could not be read"
    );

    // Scanner
    describe_counter!(
        SCANNER_MESSAGES_TOTAL,
        "Discovery messages handled, by terminal result"
    );
    describe_counter!(
        SCANNER_DECISIONS_TOTAL,
        "Catalog scan decisions, by decision"
    );
    describe_counter!(
        SCANNER_PROBES_TOTAL,
        "Probe containers executed, by probe kind and result"
    );
    describe_counter!(
        SCANNER_PROBE_TIMEOUTS_TOTAL,
        "Probe containers force-removed after exceeding the wait timeout"
    );
    describe_counter!(
        SCANNER_CONTAINERS_REMOVED_TOTAL,
        "Probe containers removed after execution"
    );
    describe_histogram!(
        SCANNER_SCAN_DURATION_SECONDS,
        "Time from pull to last probe for one image in seconds"
    );
    describe_gauge!(SCANNER_ACTIVE_WORKERS, "Scanner workers currently consuming");
}
