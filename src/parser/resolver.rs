use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Local;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::ParseError;
use super::models::{ExtractionTask, ResolverState, ResolverStatus};
use super::stream_locator::find_stream_locator;
use crate::common::client::fetcher::{FetchOutcome, PageFetcher};
use crate::common::utils::sanitize_filename;
use crate::downloader::models::DownloadTask;
use crate::downloader::progress::{ProgressSink, Stage};
use crate::pipeline::config::SessionLossPolicy;
use crate::pipeline::queue::TaskQueue;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub poll_interval: Duration,
    pub rewrite_viewer_url: bool,
    pub diagnostics_dir: Option<PathBuf>,
    pub session_loss_policy: SessionLossPolicy,
}

/// 解析结果计数
#[derive(Debug, Default)]
pub struct ResolverStats {
    pub resolved: AtomicUsize,
    pub failed: AtomicUsize,
    pub session_lost: AtomicUsize,
}

impl ResolverStats {
    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn session_lost(&self) -> usize {
        self.session_lost.load(Ordering::SeqCst)
    }
}

/// 视频页面地址改写为播放器页面
pub fn viewer_url(url: &str) -> String {
    url.replacen("/view.php", "/viewer.php", 1)
}

struct Resolver {
    config: ResolverConfig,
    fetcher: Arc<dyn PageFetcher>,
    extraction: Arc<TaskQueue<ExtractionTask>>,
    downloads: Arc<TaskQueue<DownloadTask>>,
    sink: Arc<dyn ProgressSink>,
    state: watch::Sender<ResolverState>,
    stats: Arc<ResolverStats>,
    stop: CancellationToken,
    abort: CancellationToken,
    session_lost: CancellationToken,
}

impl Resolver {
    async fn run(self) {
        debug!("解析线程启动");
        loop {
            if self.abort.is_cancelled() {
                break;
            }
            if self.stop.is_cancelled() && self.extraction.is_empty() {
                break;
            }
            self.sink
                .report_queue_depths(self.extraction.len(), self.downloads.len());

            let task = tokio::select! {
                biased;
                task = self.extraction.pop_timeout(self.config.poll_interval) => task,
                _ = self.stop.cancelled() => None,
            };
            let Some(task) = task else {
                self.set_status(ResolverStatus::Idle, None);
                continue;
            };

            self.set_status(ResolverStatus::Resolving, Some(&task.title));
            self.handle(task).await;
            self.extraction.task_done();
            self.set_status(ResolverStatus::Idle, None);
        }
        debug!("解析线程退出");
    }

    async fn handle(&self, task: ExtractionTask) {
        // 页面获取或解析中的 panic 只影响当前任务
        let result = match AssertUnwindSafe(self.resolve(&task)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!("解析线程处理 {} 时 panic", task.title);
                self.sink
                    .log(&format!("Error resolving {}: 解析过程异常退出", task.title));
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        match result {
            Ok(download) => {
                info!("解析成功: {}", task.title);
                self.sink.log(&format!("Resolved: {}", task.title));
                tokio::select! {
                    _ = self.downloads.push(download) => {
                        self.stats.resolved.fetch_add(1, Ordering::SeqCst);
                    }
                    _ = self.abort.cancelled() => {
                        warn!("流水线已中止，丢弃下载任务: {}", task.title);
                    }
                }
            }
            Err(ParseError::SessionLost(reason)) => {
                // 默认只丢弃当前任务，不向上报告
                warn!("解析时会话失效，跳过 {}: {}", task.title, reason);
                self.sink.log(&format!("会话失效，跳过视频: {}", task.title));
                self.stats.session_lost.fetch_add(1, Ordering::SeqCst);
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                if self.config.session_loss_policy == SessionLossPolicy::Escalate {
                    self.session_lost.cancel();
                }
            }
            Err(ParseError::LocatorNotFound(title)) => {
                warn!("未找到 m3u8 地址: {}", title);
                self.sink.log(&format!("Could not find m3u8 for {}", title));
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!("解析失败 {}: {}", task.title, e);
                self.sink.log(&format!("Error resolving {}: {}", task.title, e));
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    async fn resolve(&self, task: &ExtractionTask) -> Result<DownloadTask, ParseError> {
        let url = if self.config.rewrite_viewer_url {
            viewer_url(&task.source_url)
        } else {
            task.source_url.clone()
        };

        let html = match self.fetcher.fetch(&url, task.referer_url.as_deref()).await? {
            FetchOutcome::Content(html) => html,
            FetchOutcome::SessionLost { final_url } => {
                return Err(ParseError::SessionLost(format!(
                    "视频页面被重定向到登录页: {}",
                    final_url
                )));
            }
        };

        match find_stream_locator(&html) {
            Some(locator) => {
                debug!("{} 命中 {:?}: {}", task.title, locator.strategy, locator.url);
                Ok(DownloadTask::new(
                    locator.url,
                    task.destination_folder.clone(),
                    task.title.clone(),
                ))
            }
            None => {
                self.dump_page(task, &html).await;
                Err(ParseError::LocatorNotFound(task.title.clone()))
            }
        }
    }

    // 保存原始页面，方便排查页面结构变化
    async fn dump_page(&self, task: &ExtractionTask, html: &str) {
        let Some(dir) = &self.config.diagnostics_dir else {
            return;
        };
        let file = dir.join(format!(
            "debug_video_dump_{}_{}.html",
            sanitize_filename(&task.title),
            Local::now().format("%Y%m%d%H%M%S")
        ));
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&file, html).await
        };
        match written.await {
            Ok(()) => debug!("原始页面已保存: {:?}", file),
            Err(e) => warn!("保存原始页面失败 {:?}: {}", file, e),
        }
    }

    fn set_status(&self, status: ResolverStatus, title: Option<&str>) {
        self.state.send_replace(ResolverState {
            status,
            current_title: title.map(str::to_string),
        });
        self.sink.report_resolver_status(status, title);
    }
}

/// 解析线程句柄
pub struct ResolverHandle {
    handle: JoinHandle<()>,
    state: watch::Receiver<ResolverState>,
    stats: Arc<ResolverStats>,
    stop: CancellationToken,
    sink: Arc<dyn ProgressSink>,
}

impl ResolverHandle {
    /// 启动唯一的解析线程
    ///
    /// `session_lost` 只在 [`SessionLossPolicy::Escalate`] 下被取消
    pub fn spawn(
        config: ResolverConfig,
        fetcher: Arc<dyn PageFetcher>,
        extraction: Arc<TaskQueue<ExtractionTask>>,
        downloads: Arc<TaskQueue<DownloadTask>>,
        sink: Arc<dyn ProgressSink>,
        abort: &CancellationToken,
        session_lost: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ResolverState::default());
        let stats = Arc::new(ResolverStats::default());
        let stop = abort.child_token();

        let resolver = Resolver {
            config,
            fetcher,
            extraction,
            downloads,
            sink: Arc::clone(&sink),
            state: state_tx,
            stats: Arc::clone(&stats),
            stop: stop.clone(),
            abort: abort.clone(),
            session_lost,
        };

        Self {
            handle: tokio::spawn(resolver.run()),
            state: state_rx,
            stats,
            stop,
            sink,
        }
    }

    /// 通知解析线程清空队列后退出
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn state(&self) -> ResolverState {
        self.state.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().status == ResolverStatus::Resolving
    }

    pub fn stats(&self) -> Arc<ResolverStats> {
        Arc::clone(&self.stats)
    }

    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("解析线程异常退出: {}", e);
        }
        self.sink.report_stage_stopped(Stage::Resolver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_url_rewrite() {
        assert_eq!(
            viewer_url("https://ys.learnus.org/mod/vod/view.php?id=101"),
            "https://ys.learnus.org/mod/vod/viewer.php?id=101"
        );
        assert_eq!(
            viewer_url("https://ys.learnus.org/mod/vod/viewer.php?id=101"),
            "https://ys.learnus.org/mod/vod/viewer.php?id=101"
        );
    }
}
