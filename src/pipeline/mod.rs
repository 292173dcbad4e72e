use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::common::client::fetcher::PageFetcher;
use crate::downloader::DownloadWorkerPool;
use crate::downloader::archive::{ArchiveOutcome, FileArchiver};
use crate::downloader::models::DownloadTask;
use crate::downloader::progress::ProgressSink;
use crate::downloader::remux::StreamFetcher;
use crate::parser::models::{DiscoveredItem, ExtractionTask, ItemKind, ScanCounts};
use crate::parser::parser_trait::ContentScanner;
use crate::parser::resolver::ResolverHandle;
use config::PipelineConfig;
use error::PipelineError;
use queue::TaskQueue;

pub mod config;
pub mod error;
pub mod queue;

/// 课程文件保存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTally {
    pub saved: usize,
    pub existing: usize,
    pub failed: usize,
}

/// 一轮流水线的结果统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub discovered: ScanCounts,
    pub files: FileTally,
    pub extraction_enqueued: usize,
    pub resolved: usize,
    pub extraction_failed: usize,
    pub downloads_enqueued: usize,
    pub finished: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// 本轮运行用到的队列和停止信号
struct RunContext {
    extraction: Arc<TaskQueue<ExtractionTask>>,
    downloads: Arc<TaskQueue<DownloadTask>>,
    abort: CancellationToken,
    session_lost: CancellationToken,
}

/// 流水线控制器：启动解析线程和下载线程池，转发扫描结果，扫描结束后分两阶段收尾
pub struct PipelineController {
    config: PipelineConfig,
    fetcher: Arc<dyn PageFetcher>,
    stream_fetcher: Arc<dyn StreamFetcher>,
    sink: Arc<dyn ProgressSink>,
    archiver: Option<Arc<dyn FileArchiver>>,
}

/// 扫描过程中的累计结果
#[derive(Default)]
struct ScanTally {
    discovered: ScanCounts,
    files: FileTally,
}

impl PipelineController {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn PageFetcher>,
        stream_fetcher: Arc<dyn StreamFetcher>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            fetcher,
            stream_fetcher,
            sink,
            archiver: None,
        }
    }

    /// 扫描到的课程文件交给 `archiver` 保存；不设置时只计数
    pub fn with_archiver(mut self, archiver: Arc<dyn FileArchiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 跑完整的一轮：扫描、解析、下载，全部完成后返回
    ///
    /// 返回 [`PipelineError::SessionLost`] 时，解析线程和下载线程已经全部停止，
    /// 队列里剩余的任务被丢弃，由调用方决定是否重新登录后重跑。
    pub async fn run(&self, scanner: &dyn ContentScanner) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id, scanner)
            .instrument(info_span!("pipeline", %run_id))
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        scanner: &dyn ContentScanner,
    ) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let ctx = RunContext {
            extraction: Arc::new(TaskQueue::with_capacity(
                "extraction",
                self.config.extraction_capacity,
            )),
            downloads: Arc::new(TaskQueue::with_capacity(
                "download",
                self.config.download_capacity,
            )),
            abort: CancellationToken::new(),
            session_lost: CancellationToken::new(),
        };

        // 先启动消费端，扫描与解析、下载同时进行
        let resolver = ResolverHandle::spawn(
            self.config.resolver_config(),
            Arc::clone(&self.fetcher),
            Arc::clone(&ctx.extraction),
            Arc::clone(&ctx.downloads),
            Arc::clone(&self.sink),
            &ctx.abort,
            ctx.session_lost.clone(),
        );
        let pool = DownloadWorkerPool::spawn(
            self.config.pool_config(),
            Arc::clone(&ctx.downloads),
            Arc::clone(&self.stream_fetcher),
            Arc::clone(&self.sink),
            &ctx.abort,
        );
        let resolver_stats = resolver.stats();
        let download_stats = pool.stats();
        info!("流水线启动: 1 个解析线程, {} 个下载线程", pool.size());

        let mut tally = ScanTally::default();
        match self.scan(scanner, &ctx, &mut tally).await {
            Ok(()) => {
                self.sink.log("扫描完成，等待解析和下载...");
                self.drain(&ctx, resolver, pool).await?;
            }
            Err(e) => {
                warn!("扫描中止: {}", e);
                self.shutdown(&ctx, resolver, pool).await;
                return Err(e);
            }
        }

        let report = RunReport {
            run_id,
            discovered: tally.discovered,
            files: tally.files,
            extraction_enqueued: ctx.extraction.total_pushed() as usize,
            resolved: resolver_stats.resolved(),
            extraction_failed: resolver_stats.failed(),
            downloads_enqueued: ctx.downloads.total_pushed() as usize,
            finished: download_stats.finished(),
            skipped: download_stats.skipped(),
            failed: download_stats.failed(),
            elapsed: started.elapsed(),
        };
        info!(
            "流水线完成: 视频 {} 个, 解析成功 {}, 下载完成 {}, 跳过 {}, 失败 {}",
            report.extraction_enqueued,
            report.resolved,
            report.finished,
            report.skipped,
            report.failed + report.extraction_failed
        );
        Ok(report)
    }

    /// 运行扫描器，把视频条目边扫边送入解析队列，课程文件当场保存
    async fn scan(
        &self,
        scanner: &dyn ContentScanner,
        ctx: &RunContext,
        tally: &mut ScanTally,
    ) -> Result<(), PipelineError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scan = scanner.scan(tx);
        tokio::pin!(scan);
        let mut finished = None;

        loop {
            tokio::select! {
                biased;
                _ = ctx.session_lost.cancelled() => {
                    return Err(PipelineError::SessionLost("解析视频时会话失效".to_string()));
                }
                item = rx.recv() => match item {
                    Some(item) => self.forward(item, ctx, tally).await?,
                    None => break,
                },
                result = &mut scan, if finished.is_none() => {
                    finished = Some(result);
                }
            }
        }

        let result = match finished {
            Some(result) => result,
            None => scan.await,
        };
        let summary = result?;
        debug!("扫描汇总: {:?}", summary);
        Ok(())
    }

    async fn forward(
        &self,
        item: DiscoveredItem,
        ctx: &RunContext,
        tally: &mut ScanTally,
    ) -> Result<(), PipelineError> {
        tally.discovered.record(item.kind);
        self.sink.report_scan_progress(tally.discovered);

        if item.kind == ItemKind::File {
            if let Some(archiver) = &self.archiver {
                self.archive(archiver.as_ref(), &item, &mut tally.files).await?;
            }
            return Ok(());
        }

        if let Some(task) = item.into_extraction_task() {
            self.sink.log(&format!("Queued video: {}", task.title));
            ctx.extraction.push(task).await;
            self.sink
                .report_queue_depths(ctx.extraction.len(), ctx.downloads.len());
        }
        Ok(())
    }

    async fn archive(
        &self,
        archiver: &dyn FileArchiver,
        item: &DiscoveredItem,
        files: &mut FileTally,
    ) -> Result<(), PipelineError> {
        self.sink.log(&format!("Downloading file: {}", item.title));
        match archiver.archive(item).await {
            Ok(ArchiveOutcome::Saved(_)) => {
                self.sink.log(&format!("Saved: {}", item.title));
                files.saved += 1;
            }
            Ok(ArchiveOutcome::Exists(path)) => {
                debug!("文件已存在，跳过 {:?}", path);
                files.existing += 1;
            }
            // 和课程页一样，会话失效需要整体重启
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(e) => {
                warn!("文件下载失败 {}: {}", item.title, e);
                self.sink.log(&format!("文件下载失败 {}: {}", item.title, e));
                files.failed += 1;
            }
        }
        Ok(())
    }

    /// 两阶段收尾：先等解析队列清空并停止解析线程，再等下载队列清空并停止下载线程
    async fn drain(
        &self,
        ctx: &RunContext,
        resolver: ResolverHandle,
        pool: DownloadWorkerPool,
    ) -> Result<(), PipelineError> {
        // 第一阶段
        let mut ticker = tokio::time::interval(self.config.drain_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = ctx.session_lost.cancelled() => {}
            }
            self.sink
                .report_queue_depths(ctx.extraction.len(), ctx.downloads.len());
            if ctx.session_lost.is_cancelled() {
                self.shutdown(ctx, resolver, pool).await;
                return Err(PipelineError::SessionLost("解析视频时会话失效".to_string()));
            }
            if ctx.extraction.is_drained() && !resolver.is_busy() {
                break;
            }
        }
        resolver.stop();
        // 解析线程退出后不会再有新的下载任务
        resolver.join().await;
        debug!("解析阶段结束");

        if ctx.session_lost.is_cancelled() {
            ctx.abort.cancel();
            pool.join().await;
            return Err(PipelineError::SessionLost("解析视频时会话失效".to_string()));
        }

        // 第二阶段
        loop {
            ticker.tick().await;
            self.sink
                .report_queue_depths(ctx.extraction.len(), ctx.downloads.len());
            if ctx.downloads.is_drained() && !pool.is_busy() {
                break;
            }
        }
        pool.stop();
        pool.join().await;
        debug!("下载阶段结束");
        Ok(())
    }

    /// 立即停止：各线程处理完手头任务后退出，队列中剩余任务丢弃
    async fn shutdown(&self, ctx: &RunContext, resolver: ResolverHandle, pool: DownloadWorkerPool) {
        ctx.abort.cancel();
        let dropped = ctx.extraction.len() + ctx.downloads.len();
        if dropped > 0 {
            warn!("流水线中止，丢弃 {} 个排队任务", dropped);
        }
        resolver.join().await;
        pool.join().await;
    }
}
