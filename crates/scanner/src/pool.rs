//! 스캔 워커 풀
//!
//! N개의 워커가 같은 큐를 각자 구독하고, 메시지 하나를 끝까지 처리한 뒤에야
//! 다음 메시지를 받습니다. 워커 사이에 공유하는 가변 상태는 카운터뿐입니다.
//!
//! # 확인 정책
//!
//! | 처리 결과 | 브로커 처리 | 이벤트 |
//! |-----------|-------------|--------|
//! | Reported / Discard | ack | Created, Updated, Discarded |
//! | 잘못된 메시지, 단일 항목 실패 | reject (재전달 없음) | Failed |
//! | 치명적 실패 (런타임 소켓, 브로커) | requeue 후 풀 중단 | Failed |
//!
//! 같은 저장소를 두 워커가 동시에 스캔하면 나중에 쓴 쪽이 남습니다.
//!
//! # 중단
//!
//! 취소되면 워커는 새 메시지를 받지 않습니다. 진행 중인 스캔은 끝까지 실행되어
//! 프로브 컨테이너가 남지 않습니다.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dofinder_broker::{Delivery, MessageBroker, MessageConsumer, decode_image};
use dofinder_core::error::{DofinderError, PipelineError};
use dofinder_core::event::{ScanEvent, ScanOutcome};
use dofinder_core::metrics as m;
use dofinder_core::pipeline::{HealthStatus, Pipeline};

use crate::config::ScanPoolConfig;
use crate::error::ScannerError;
use crate::scanner::ScanHandler;

/// 잘못된 메시지의 이벤트에 쓰는 저장소 이름
const MALFORMED_REPOSITORY: &str = "<malformed>";

/// 워커 풀 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Initialized,
    Running,
    Stopped,
}

/// 워커 하나가 메시지를 처리한 뒤 계속할지 여부
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// 워커들이 공유하는 핸들
struct WorkerContext<H> {
    handler: Arc<H>,
    event_tx: mpsc::Sender<ScanEvent>,
    cancel: CancellationToken,
    fatal: Arc<OnceLock<String>>,
    active: Arc<AtomicUsize>,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl<H> Clone for WorkerContext<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            event_tx: self.event_tx.clone(),
            cancel: self.cancel.clone(),
            fatal: Arc::clone(&self.fatal),
            active: Arc::clone(&self.active),
            processed: Arc::clone(&self.processed),
            failed: Arc::clone(&self.failed),
        }
    }
}

impl<H> WorkerContext<H> {
    /// 첫 번째 치명적 에러를 기록하고 풀 전체를 멈춥니다.
    fn abort(&self, reason: String) {
        if self.fatal.set(reason.clone()).is_ok() {
            error!(reason = %reason, "fatal failure, stopping scan workers");
        }
        self.cancel.cancel();
    }

    async fn emit(&self, event: ScanEvent) {
        metrics::counter!(m::SCANNER_MESSAGES_TOTAL, m::LABEL_RESULT => event.outcome.label())
            .increment(1);
        if event.is_failure() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(e) = self.event_tx.send(event).await {
            debug!(error = %e, "scan event receiver dropped");
        }
    }
}

/// 스캔 워커 풀
///
/// # 사용 예시
/// ```ignore
/// let (mut pool, event_rx) = ScanWorkerPoolBuilder::new()
///     .config(ScanPoolConfig::from_core(&config))
///     .broker(broker)
///     .handler(scanner)
///     .build()?;
///
/// pool.start().await?;
/// ```
pub struct ScanWorkerPool<B: MessageBroker, H: ScanHandler> {
    config: ScanPoolConfig,
    state: PoolState,
    broker: Arc<B>,
    ctx: WorkerContext<H>,
    tasks: Vec<JoinHandle<()>>,
}

impl<B: MessageBroker, H: ScanHandler> ScanWorkerPool<B, H> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PoolState::Initialized => "initialized",
            PoolState::Running => "running",
            PoolState::Stopped => "stopped",
        }
    }

    /// 처리를 마친 메시지 수
    pub fn messages_processed(&self) -> u64 {
        self.ctx.processed.load(Ordering::Relaxed)
    }

    /// Failed로 끝난 메시지 수
    pub fn messages_failed(&self) -> u64 {
        self.ctx.failed.load(Ordering::Relaxed)
    }

    /// 구독 중인 워커 수
    pub fn active_workers(&self) -> usize {
        self.ctx.active.load(Ordering::Relaxed)
    }

    /// 풀을 멈추게 한 치명적 에러
    pub fn fatal_error(&self) -> Option<&str> {
        self.ctx.fatal.get().map(String::as_str)
    }

    /// 풀 중단 토큰
    ///
    /// 치명적 실패로 풀이 스스로 멈추면 취소 상태가 됩니다.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// 풀 설정
    pub fn config(&self) -> &ScanPoolConfig {
        &self.config
    }
}

impl<B: MessageBroker, H: ScanHandler> Pipeline for ScanWorkerPool<B, H> {
    async fn start(&mut self) -> Result<(), DofinderError> {
        match self.state {
            PoolState::Running => return Err(PipelineError::AlreadyRunning.into()),
            PoolState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "scan worker pool was stopped; build a new pool to restart".to_owned(),
                )
                .into());
            }
            PoolState::Initialized => {}
        }

        info!(
            workers = self.config.workers,
            queue = %self.config.queue,
            "starting scan worker pool"
        );

        for worker in 0..self.config.workers {
            let consumer_tag = format!("dofinder-scanner-{worker}");
            let consumer = match self.broker.subscribe(&self.config.queue, &consumer_tag).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    // 이미 시작한 워커 정리
                    self.ctx.cancel.cancel();
                    for task in self.tasks.drain(..) {
                        let _ = task.await;
                    }
                    self.state = PoolState::Stopped;
                    return Err(ScannerError::from(e).into());
                }
            };
            let ctx = self.ctx.clone();
            self.tasks
                .push(tokio::spawn(run_worker(worker, consumer, ctx)));
        }

        self.state = PoolState::Running;
        info!("scan worker pool started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DofinderError> {
        if self.state != PoolState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping scan worker pool, waiting for in-flight scans");
        self.ctx.cancel.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "scan worker task ended abnormally");
            }
        }

        self.state = PoolState::Stopped;
        info!(
            processed = self.messages_processed(),
            failed = self.messages_failed(),
            "scan worker pool stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PoolState::Running => {
                if let Some(reason) = self.fatal_error() {
                    return HealthStatus::Unhealthy(reason.to_owned());
                }
                let active = self.active_workers();
                if active == self.config.workers {
                    HealthStatus::Healthy
                } else if active == 0 {
                    HealthStatus::Unhealthy("no scan worker is consuming".to_owned())
                } else {
                    HealthStatus::Degraded(format!(
                        "{active}/{} scan workers consuming",
                        self.config.workers
                    ))
                }
            }
            PoolState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PoolState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

async fn run_worker<C: MessageConsumer, H: ScanHandler>(
    worker: usize,
    mut consumer: C,
    ctx: WorkerContext<H>,
) {
    ctx.active.fetch_add(1, Ordering::Relaxed);
    metrics::gauge!(m::SCANNER_ACTIVE_WORKERS).increment(1.0);
    debug!(worker, "scan worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            next = consumer.recv() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) if e.is_fatal() => {
                ctx.abort(format!("worker {worker}: {e}"));
                break;
            }
            Some(Err(e)) => {
                warn!(worker, error = %e, "delivery failed, waiting for next message");
                continue;
            }
            None => {
                if !ctx.cancel.is_cancelled() {
                    ctx.abort(format!("worker {worker}: subscription closed by broker"));
                }
                break;
            }
        };

        if handle_delivery(worker, delivery, &ctx).await == Flow::Stop {
            break;
        }
    }

    ctx.active.fetch_sub(1, Ordering::Relaxed);
    metrics::gauge!(m::SCANNER_ACTIVE_WORKERS).decrement(1.0);
    debug!(worker, "scan worker stopped");
}

async fn handle_delivery<H: ScanHandler>(
    worker: usize,
    delivery: Delivery,
    ctx: &WorkerContext<H>,
) -> Flow {
    ctx.processed.fetch_add(1, Ordering::Relaxed);

    let image = match decode_image(delivery.payload()) {
        Ok(image) => image,
        Err(e) => {
            warn!(worker, error = %e, "malformed discovery message rejected");
            let flow = settle(worker, delivery.reject().await, ctx);
            ctx.emit(ScanEvent::new(
                MALFORMED_REPOSITORY,
                ScanOutcome::Failed(e.to_string()),
            ))
            .await;
            return flow;
        }
    };

    let trace_id = uuid::Uuid::new_v4().to_string();
    debug!(
        worker,
        repository = %image,
        trace_id = %trace_id,
        redelivered = delivery.redelivered(),
        "discovery message received"
    );

    match ctx.handler.handle(&image).await {
        Ok(outcome) => {
            let flow = settle(worker, delivery.ack().await, ctx);
            ctx.emit(ScanEvent::with_trace(image.repository, outcome, trace_id))
                .await;
            flow
        }
        Err(e) if e.is_fatal() => {
            // 재전달되도록 되돌린 뒤 중단
            if let Err(requeue_err) = delivery.requeue().await {
                warn!(worker, error = %requeue_err, "requeue failed");
            }
            ctx.abort(format!("worker {worker}: {e}"));
            ctx.emit(ScanEvent::with_trace(
                image.repository,
                ScanOutcome::Failed(e.to_string()),
                trace_id,
            ))
            .await;
            Flow::Stop
        }
        Err(e) => {
            warn!(worker, repository = %image, error = %e, "scan failed, message rejected");
            let flow = settle(worker, delivery.reject().await, ctx);
            ctx.emit(ScanEvent::with_trace(
                image.repository,
                ScanOutcome::Failed(e.to_string()),
                trace_id,
            ))
            .await;
            flow
        }
    }
}

fn settle<H>(
    worker: usize,
    result: Result<(), dofinder_broker::BrokerClientError>,
    ctx: &WorkerContext<H>,
) -> Flow {
    match result {
        Ok(()) => Flow::Continue,
        Err(e) if e.is_fatal() => {
            ctx.abort(format!("worker {worker}: {e}"));
            Flow::Stop
        }
        Err(e) => {
            warn!(worker, error = %e, "message settlement failed");
            Flow::Continue
        }
    }
}

/// 스캔 워커 풀 빌더
pub struct ScanWorkerPoolBuilder<B: MessageBroker, H: ScanHandler> {
    config: ScanPoolConfig,
    broker: Option<Arc<B>>,
    handler: Option<Arc<H>>,
    event_tx: Option<mpsc::Sender<ScanEvent>>,
    cancel: Option<CancellationToken>,
}

impl<B: MessageBroker, H: ScanHandler> ScanWorkerPoolBuilder<B, H> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ScanPoolConfig::default(),
            broker: None,
            handler: None,
            event_tx: None,
            cancel: None,
        }
    }

    /// 풀 설정을 지정합니다.
    pub fn config(mut self, config: ScanPoolConfig) -> Self {
        self.config = config;
        self
    }

    /// 메시지 브로커를 설정합니다.
    pub fn broker(mut self, broker: Arc<B>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// 메시지 처리기를 설정합니다.
    pub fn handler(mut self, handler: Arc<H>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// 외부 이벤트 전송 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 새 채널을 생성합니다.
    pub fn event_sender(mut self, tx: mpsc::Sender<ScanEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 상위 종료 토큰에 연결합니다.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 풀을 빌드합니다.
    ///
    /// # Returns
    /// - `ScanWorkerPool`: 풀 인스턴스
    /// - `Option<mpsc::Receiver<ScanEvent>>`: 이벤트 수신 채널
    ///   (외부 event_sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(ScanWorkerPool<B, H>, Option<mpsc::Receiver<ScanEvent>>), ScannerError> {
        self.config.validate()?;

        let broker = self.broker.ok_or_else(|| ScannerError::Config {
            field: "broker".to_owned(),
            reason: "message broker must be provided".to_owned(),
        })?;
        let handler = self.handler.ok_or_else(|| ScannerError::Config {
            field: "handler".to_owned(),
            reason: "scan handler must be provided".to_owned(),
        })?;

        let (event_tx, event_rx) = if let Some(tx) = self.event_tx {
            (tx, None)
        } else {
            let (tx, rx) = mpsc::channel(self.config.event_channel_capacity);
            (tx, Some(rx))
        };

        let cancel = self
            .cancel
            .map(|parent| parent.child_token())
            .unwrap_or_default();

        let pool = ScanWorkerPool {
            config: self.config,
            state: PoolState::Initialized,
            broker,
            ctx: WorkerContext {
                handler,
                event_tx,
                cancel,
                fatal: Arc::new(OnceLock::new()),
                active: Arc::new(AtomicUsize::new(0)),
                processed: Arc::new(AtomicU64::new(0)),
                failed: Arc::new(AtomicU64::new(0)),
            },
            tasks: Vec::new(),
        };

        Ok((pool, event_rx))
    }
}

impl<B: MessageBroker, H: ScanHandler> Default for ScanWorkerPoolBuilder<B, H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use dofinder_broker::{AckKind, InMemoryBroker, Topology, encode_image};
    use dofinder_core::config::BrokerConfig;
    use dofinder_core::event::DiscardReason;
    use dofinder_core::types::ImageReference;

    use super::*;

    /// 저장소 이름별로 정해진 결과를 돌려주는 처리기
    #[derive(Default)]
    struct ScriptedHandler {
        results: HashMap<String, Script>,
    }

    #[derive(Clone, Copy)]
    enum Script {
        Discard,
        Fail,
        Fatal,
    }

    impl ScriptedHandler {
        fn with(mut self, repository: &str, script: Script) -> Self {
            self.results.insert(repository.to_owned(), script);
            self
        }
    }

    impl ScanHandler for ScriptedHandler {
        async fn handle(&self, image: &ImageReference) -> Result<ScanOutcome, ScannerError> {
            match self.results.get(&image.repository).copied() {
                Some(Script::Fail) => Err(ScannerError::DockerApi("pull denied".to_owned())),
                Some(Script::Fatal) => Err(ScannerError::DockerConnection(
                    "socket unreachable".to_owned(),
                )),
                Some(Script::Discard) | None => {
                    Ok(ScanOutcome::Discarded(DiscardReason::UpToDate))
                }
            }
        }
    }

    fn broker() -> Arc<InMemoryBroker> {
        Arc::new(InMemoryBroker::new(Topology::from_config(
            &BrokerConfig::default(),
        )))
    }

    async fn publish(broker: &InMemoryBroker, repository: &str) {
        let payload = encode_image(&ImageReference::new(repository)).unwrap();
        broker.publish("images.scan", &payload).await.unwrap();
    }

    fn pool(
        broker: Arc<InMemoryBroker>,
        handler: ScriptedHandler,
        workers: usize,
    ) -> (
        ScanWorkerPool<InMemoryBroker, ScriptedHandler>,
        mpsc::Receiver<ScanEvent>,
    ) {
        let (pool, rx) = ScanWorkerPoolBuilder::new()
            .config(ScanPoolConfig {
                workers,
                ..Default::default()
            })
            .broker(broker)
            .handler(Arc::new(handler))
            .build()
            .unwrap();
        (pool, rx.unwrap())
    }

    async fn next_event(rx: &mut mpsc::Receiver<ScanEvent>) -> ScanEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn build_without_broker_fails() {
        let result = ScanWorkerPoolBuilder::<InMemoryBroker, ScriptedHandler>::new()
            .handler(Arc::new(ScriptedHandler::default()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn build_with_external_sender_returns_no_receiver() {
        let (tx, _rx) = mpsc::channel(4);
        let (_pool, rx) = ScanWorkerPoolBuilder::new()
            .broker(broker())
            .handler(Arc::new(ScriptedHandler::default()))
            .event_sender(tx)
            .build()
            .unwrap();
        assert!(rx.is_none());
    }

    #[tokio::test]
    async fn lifecycle_start_stop() {
        let (mut pool, _rx) = pool(broker(), ScriptedHandler::default(), 2);
        assert_eq!(pool.state_name(), "initialized");
        assert!(!pool.health_check().await.is_healthy());

        pool.start().await.unwrap();
        assert_eq!(pool.state_name(), "running");
        assert!(pool.start().await.is_err());

        pool.stop().await.unwrap();
        assert_eq!(pool.state_name(), "stopped");
        assert!(pool.stop().await.is_err());
        assert!(pool.start().await.is_err());
    }

    #[tokio::test]
    async fn terminal_outcomes_are_acked() {
        let broker = broker();
        let (mut pool, mut rx) = pool(Arc::clone(&broker), ScriptedHandler::default(), 1);
        pool.start().await.unwrap();
        publish(&broker, "acme/tool").await;

        let event = next_event(&mut rx).await;
        assert_eq!(event.repository, "acme/tool");
        assert_eq!(event.outcome, ScanOutcome::Discarded(DiscardReason::UpToDate));

        pool.stop().await.unwrap();
        let acks = broker.acknowledgements();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].kind, AckKind::Ack);
    }

    #[tokio::test]
    async fn malformed_message_is_rejected() {
        let broker = broker();
        let (mut pool, mut rx) = pool(Arc::clone(&broker), ScriptedHandler::default(), 1);
        pool.start().await.unwrap();
        broker.publish("images.scan", b"not json").await.unwrap();

        let event = next_event(&mut rx).await;
        assert!(event.is_failure());
        assert_eq!(event.repository, MALFORMED_REPOSITORY);

        pool.stop().await.unwrap();
        assert_eq!(broker.acknowledgements()[0].kind, AckKind::Reject);
        assert_eq!(pool.messages_failed(), 1);
    }

    #[tokio::test]
    async fn contained_failure_is_rejected_and_pool_keeps_running() {
        let broker = broker();
        let handler = ScriptedHandler::default().with("acme/broken", Script::Fail);
        let (mut pool, mut rx) = pool(Arc::clone(&broker), handler, 1);
        pool.start().await.unwrap();

        publish(&broker, "acme/broken").await;
        publish(&broker, "acme/tool").await;

        let first = next_event(&mut rx).await;
        let second = next_event(&mut rx).await;
        assert!(first.is_failure());
        assert!(!second.is_failure());
        assert!(pool.health_check().await.is_healthy());

        pool.stop().await.unwrap();
        let kinds: Vec<AckKind> = broker
            .acknowledgements()
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(kinds, vec![AckKind::Reject, AckKind::Ack]);
    }

    #[tokio::test]
    async fn fatal_failure_requeues_and_stops_pool() {
        let broker = broker();
        let handler = ScriptedHandler::default().with("acme/tool", Script::Fatal);
        let (mut pool, mut rx) = pool(Arc::clone(&broker), handler, 1);
        let token = pool.shutdown_token();
        pool.start().await.unwrap();

        publish(&broker, "acme/tool").await;
        let event = next_event(&mut rx).await;
        assert!(event.is_failure());

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
        assert!(pool.fatal_error().is_some());
        assert!(!pool.health_check().await.is_healthy());

        pool.stop().await.unwrap();
        assert_eq!(broker.acknowledgements()[0].kind, AckKind::Requeue);
        // 되돌린 메시지는 큐에 남아 있음
        assert_eq!(broker.drain("images").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn parent_token_stops_workers() {
        let parent = CancellationToken::new();
        let (mut pool, _rx) = ScanWorkerPoolBuilder::new()
            .broker(broker())
            .handler(Arc::new(ScriptedHandler::default()))
            .cancellation(parent.clone())
            .build()
            .unwrap();
        pool.start().await.unwrap();

        parent.cancel();
        pool.stop().await.unwrap();
        assert_eq!(pool.active_workers(), 0);
        assert!(pool.fatal_error().is_none());
    }
}
