//! 배치 작성기 -- 레코드를 모아 개수/크기/시간 조건으로 싱크에 커밋합니다.
//!
//! # 내부 아키텍처
//! ```text
//! Listener --WriterHandle::add--> mpsc(queue_capacity) --> Worker task (Batch 소유)
//!                                                           |  count >= bulk_actions
//!                                                           |  bytes >= bulk_size
//!                                                           |  flush_interval tick
//!                                                           v
//!                                          Semaphore(concurrent_requests) -> JoinSet<commit>
//! ```
//!
//! # 백프레셔
//! 동시 플러시 슬롯이 모두 차 있으면 작업 태스크가 슬롯을 기다리며 멈춥니다.
//! 그 동안 작업 큐가 차고, 리스너의 `add().await`가 대기하게 됩니다.
//! `concurrent_requests = 0`이면 작업 태스크가 직접 커밋을 기다립니다.
//!
//! # 종료
//! [`BatchWriter::close`]는 큐를 닫고 남은 요청을 모두 배치에 넣은 뒤
//! 마지막 플러시를 수행하고, 진행 중인 플러시가 끝날 때까지 기다립니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ironlog_core::metrics as m;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::batch::Batch;
use crate::config::SyslogConfig;
use crate::error::SyslogError;
use crate::sink::{BulkRequest, DocumentSink, IndexRequest};

/// 플러시 주기의 하한. 이보다 짧은 주기는 이 값으로 올려 잡습니다.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// 배치 작성기 설정
#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub bulk_actions: usize,
    pub bulk_size_bytes: u64,
    pub flush_interval: Duration,
    /// 동시 진행 플러시 수 (0이면 인라인 커밋)
    pub concurrent_requests: usize,
    pub queue_capacity: usize,
}

impl WriterSettings {
    pub fn from_config(config: &SyslogConfig) -> Self {
        Self {
            bulk_actions: config.bulk_actions,
            bulk_size_bytes: config.bulk_size_bytes,
            flush_interval: config.flush_interval,
            concurrent_requests: config.concurrent_requests,
            queue_capacity: config.queue_capacity,
        }
    }
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self::from_config(&SyslogConfig::default())
    }
}

/// 배치 작성기 통계
#[derive(Debug, Default)]
pub struct WriterStats {
    records_queued: AtomicU64,
    records_flushed: AtomicU64,
    bulks_succeeded: AtomicU64,
    bulks_failed: AtomicU64,
    items_failed: AtomicU64,
}

impl WriterStats {
    /// 큐에 들어간 레코드 수
    pub fn records_queued(&self) -> u64 {
        self.records_queued.load(Ordering::Relaxed)
    }

    /// 싱크가 응답한 배치에 포함된 레코드 수 (부분 실패 포함)
    pub fn records_flushed(&self) -> u64 {
        self.records_flushed.load(Ordering::Relaxed)
    }

    pub fn bulks_succeeded(&self) -> u64 {
        self.bulks_succeeded.load(Ordering::Relaxed)
    }

    /// 배치 전체가 실패한 횟수
    pub fn bulks_failed(&self) -> u64 {
        self.bulks_failed.load(Ordering::Relaxed)
    }

    /// 부분 실패로 보고된 항목 수
    pub fn items_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }
}

/// 리스너가 요청을 넘기는 핸들
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<IndexRequest>,
    stats: Arc<WriterStats>,
}

impl WriterHandle {
    /// 요청을 작업 큐에 넣습니다. 큐가 가득 차면 자리가 날 때까지 기다립니다.
    pub async fn add(&self, request: IndexRequest) -> Result<(), SyslogError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| SyslogError::Channel("batch writer is closed".to_owned()))?;
        self.stats.records_queued.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::SYSLOG_RECORDS_QUEUED_TOTAL).increment(1);
        Ok(())
    }

    /// 작성기가 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 배치 작성기
pub struct BatchWriter {
    handle: WriterHandle,
    stats: Arc<WriterStats>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl BatchWriter {
    /// 작업 태스크를 스폰합니다. tokio 런타임 안에서 호출해야 합니다.
    pub fn spawn<S: DocumentSink>(mut settings: WriterSettings, sink: Arc<S>) -> Self {
        if settings.flush_interval < MIN_FLUSH_INTERVAL {
            warn!(
                flush_interval_ms = u64::try_from(settings.flush_interval.as_millis()).unwrap_or(u64::MAX),
                "flush interval below minimum, using 1ms"
            );
            settings.flush_interval = MIN_FLUSH_INTERVAL;
        }
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let stats = Arc::new(WriterStats::default());
        let cancel = CancellationToken::new();

        info!(
            bulk_actions = settings.bulk_actions,
            bulk_size_bytes = settings.bulk_size_bytes,
            flush_interval_ms = u64::try_from(settings.flush_interval.as_millis()).unwrap_or(u64::MAX),
            concurrent_requests = settings.concurrent_requests,
            "starting batch writer"
        );

        let gate = (settings.concurrent_requests > 0)
            .then(|| Arc::new(Semaphore::new(settings.concurrent_requests)));
        let worker = Worker {
            settings,
            sink,
            batch: Batch::new(),
            next_execution_id: 0,
            gate,
            in_flight: JoinSet::new(),
            stats: Arc::clone(&stats),
        };
        let task = tokio::spawn(worker.run(rx, cancel.clone()));

        Self {
            handle: WriterHandle {
                tx,
                stats: Arc::clone(&stats),
            },
            stats,
            cancel,
            task,
        }
    }

    /// 요청 핸들을 반환합니다.
    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    /// 큐를 비우고 마지막 플러시와 진행 중인 플러시가 끝날 때까지 기다립니다.
    pub async fn close(self) -> Result<(), SyslogError> {
        self.cancel.cancel();
        drop(self.handle);
        self.task
            .await
            .map_err(|e| SyslogError::Channel(format!("batch writer task failed: {e}")))
    }
}

struct Worker<S> {
    settings: WriterSettings,
    sink: Arc<S>,
    batch: Batch,
    next_execution_id: u64,
    gate: Option<Arc<Semaphore>>,
    in_flight: JoinSet<()>,
    stats: Arc<WriterStats>,
}

impl<S: DocumentSink> Worker<S> {
    async fn run(mut self, mut rx: mpsc::Receiver<IndexRequest>, cancel: CancellationToken) {
        let period = self.settings.flush_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(request) => {
                        if self.push(request).await {
                            ticker.reset();
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    }
                }
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "bulk flush task failed");
                    }
                }
            }
        }

        // 남은 요청 드레인 후 마지막 플러시
        rx.close();
        while let Some(request) = rx.recv().await {
            self.push(request).await;
        }
        if !self.batch.is_empty() {
            self.flush().await;
        }
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "bulk flush task failed");
            }
        }
        info!(
            flushed = self.stats.records_flushed(),
            bulks_failed = self.stats.bulks_failed(),
            "batch writer closed"
        );
    }

    /// 요청을 배치에 넣고, 임계값에 도달하면 플러시합니다. 플러시했으면 `true`.
    async fn push(&mut self, request: IndexRequest) -> bool {
        self.batch.push(request);
        if self
            .batch
            .should_flush(self.settings.bulk_actions, self.settings.bulk_size_bytes)
        {
            self.flush().await;
            return true;
        }
        false
    }

    async fn flush(&mut self) {
        self.next_execution_id += 1;
        let request = self.batch.take(self.next_execution_id);

        let Some(gate) = &self.gate else {
            execute(self.sink.as_ref(), request, &self.stats).await;
            return;
        };

        let permit = match Arc::clone(gate).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                debug!("flush gate closed, committing inline");
                execute(self.sink.as_ref(), request, &self.stats).await;
                return;
            }
        };
        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        self.in_flight.spawn(async move {
            execute(sink.as_ref(), request, &stats).await;
            drop(permit);
        });
    }
}

/// 벌크 요청 하나를 커밋하고 결과를 기록합니다. 재시도하지 않습니다.
async fn execute<S: DocumentSink>(sink: &S, request: BulkRequest, stats: &WriterStats) {
    let execution_id = request.execution_id;
    let actions = request.len();
    let size_bytes = request.estimated_size_bytes;
    trace!(execution_id, actions, size_bytes, "executing bulk request");

    metrics::gauge!(m::SYSLOG_BULK_IN_FLIGHT).increment(1.0);
    let started = Instant::now();
    let result = sink.commit(request).await;
    metrics::histogram!(m::SYSLOG_BULK_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    metrics::gauge!(m::SYSLOG_BULK_IN_FLIGHT).decrement(1.0);

    match result {
        Ok(response) => {
            trace!(
                execution_id,
                actions,
                took_ms = u64::try_from(response.took.as_millis()).unwrap_or(u64::MAX),
                "bulk request executed"
            );
            stats
                .records_flushed
                .fetch_add(actions as u64, Ordering::Relaxed);
            stats.bulks_succeeded.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::SYSLOG_BULK_REQUESTS_TOTAL, m::LABEL_RESULT => "success")
                .increment(1);

            if response.has_failures() {
                let failed = response.failure_count() as u64;
                stats.items_failed.fetch_add(failed, Ordering::Relaxed);
                metrics::counter!(m::SYSLOG_BULK_ITEMS_FAILED_TOTAL).increment(failed);
                warn!(
                    execution_id,
                    failed,
                    "{}",
                    response.failure_message()
                );
            }
        }
        Err(e) => {
            stats.bulks_failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::SYSLOG_BULK_REQUESTS_TOTAL, m::LABEL_RESULT => "failure")
                .increment(1);
            warn!(execution_id, actions, error = %e, "bulk request failed");
        }
    }
}
