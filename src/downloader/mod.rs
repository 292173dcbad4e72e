use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::pipeline::queue::TaskQueue;
use models::{DownloadTask, WorkerState, WorkerStatus};
use progress::{ProgressSink, Stage};
use remux::StreamFetcher;

pub mod archive;
pub mod error;
pub mod models;
pub mod progress;
pub mod remux;

/// 下载线程池配置
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub media_extension: String,
}

/// 下载结果计数
#[derive(Debug, Default)]
pub struct DownloadStats {
    pub finished: AtomicUsize,
    pub skipped: AtomicUsize,
    pub failed: AtomicUsize,
}

impl DownloadStats {
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

struct DownloadWorker {
    id: usize,
    queue: Arc<TaskQueue<DownloadTask>>,
    fetcher: Arc<dyn StreamFetcher>,
    sink: Arc<dyn ProgressSink>,
    states: Arc<DashMap<usize, WorkerState>>,
    stats: Arc<DownloadStats>,
    poll_interval: Duration,
    extension: String,
    stop: CancellationToken,
    abort: CancellationToken,
}

impl DownloadWorker {
    async fn run(self) {
        debug!("下载线程 #{} 启动", self.id);
        loop {
            if self.abort.is_cancelled() {
                break;
            }
            if self.stop.is_cancelled() && self.queue.is_empty() {
                break;
            }

            let task = tokio::select! {
                biased;
                task = self.queue.pop_timeout(self.poll_interval) => task,
                _ = self.stop.cancelled() => None,
            };

            let Some(task) = task else {
                self.update(WorkerStatus::Idle, "-", "");
                continue;
            };

            self.process(task).await;
            self.queue.task_done();
        }
        debug!("下载线程 #{} 退出", self.id);
    }

    async fn process(&self, task: DownloadTask) {
        let path = task.destination_path(&self.extension);
        let file_name = task.file_name(&self.extension);
        self.update(WorkerStatus::Starting, &task.title, "");

        match tokio::fs::try_exists(&path).await {
            Ok(true) => {
                self.sink.log(&format!("已存在，跳过: {}", file_name));
                self.update(WorkerStatus::Skipped, &task.title, "Exists");
                self.stats.skipped.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("无法检查文件 {:?}: {}", path, e),
        }

        if let Err(e) = tokio::fs::create_dir_all(task.folder()).await {
            self.fail(&task, &format!("创建目录失败: {}", e));
            return;
        }

        self.update(WorkerStatus::Downloading, &task.title, "FFmpeg");
        let started = Instant::now();
        // 拉流工具内部 panic 也只影响当前任务
        let result = AssertUnwindSafe(self.fetcher.fetch(&task.stream_locator, &path))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) => {
                let elapsed = format!("{:.1}s", started.elapsed().as_secs_f64());
                self.sink.log(&format!("已下载: {} ({})", file_name, elapsed));
                self.update(WorkerStatus::Finished, &task.title, &elapsed);
                self.stats.finished.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => self.fail(&task, &e.to_string()),
            Err(_) => self.fail(&task, "拉流进程异常退出"),
        }
    }

    // 不重试，也不清理可能残留的半成品文件
    fn fail(&self, task: &DownloadTask, detail: &str) {
        error!("下载失败 {}: {}", task.title, detail);
        self.sink.log(&format!("下载失败 {}: {}", task.title, detail));
        self.update(WorkerStatus::Error, &task.title, detail);
        self.stats.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn update(&self, status: WorkerStatus, title: &str, info: &str) {
        self.states.insert(
            self.id,
            WorkerState {
                id: self.id,
                status,
                current_title: title.to_string(),
                info: info.to_string(),
            },
        );
        self.sink.report_worker_status(self.id, status, title, info);
    }
}

/// N 个常驻下载线程，共同消费下载队列
pub struct DownloadWorkerPool {
    handles: Vec<JoinHandle<()>>,
    states: Arc<DashMap<usize, WorkerState>>,
    stats: Arc<DownloadStats>,
    stop: CancellationToken,
    sink: Arc<dyn ProgressSink>,
}

impl DownloadWorkerPool {
    /// `abort` 被取消时 worker 处理完手头任务立即退出，不再清空队列
    pub fn spawn(
        config: PoolConfig,
        queue: Arc<TaskQueue<DownloadTask>>,
        fetcher: Arc<dyn StreamFetcher>,
        sink: Arc<dyn ProgressSink>,
        abort: &CancellationToken,
    ) -> Self {
        let workers = config.workers.max(1);
        let states = Arc::new(DashMap::new());
        let stats = Arc::new(DownloadStats::default());
        let stop = abort.child_token();

        let handles = (0..workers)
            .map(|id| {
                states.insert(id, WorkerState::idle(id));
                let worker = DownloadWorker {
                    id,
                    queue: Arc::clone(&queue),
                    fetcher: Arc::clone(&fetcher),
                    sink: Arc::clone(&sink),
                    states: Arc::clone(&states),
                    stats: Arc::clone(&stats),
                    poll_interval: config.poll_interval,
                    extension: config.media_extension.clone(),
                    stop: stop.clone(),
                    abort: abort.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self {
            handles,
            states,
            stats,
            stop,
            sink,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// 通知所有 worker 清空队列后退出
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn stats(&self) -> Arc<DownloadStats> {
        Arc::clone(&self.stats)
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        let mut states: Vec<WorkerState> = self.states.iter().map(|e| e.value().clone()).collect();
        states.sort_by_key(|s| s.id);
        states
    }

    pub fn is_busy(&self) -> bool {
        self.states.iter().any(|e| e.value().status.is_busy())
    }

    /// 等待所有 worker 退出
    pub async fn join(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!("下载线程异常退出: {}", e);
            }
        }
        self.sink.report_stage_stopped(Stage::DownloadPool);
    }
}
