use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, info};

use super::models::WorkerStatus;
use crate::common::utils::truncate_title;
use crate::parser::models::{ResolverStatus, ScanCounts};

const TITLE_WIDTH: usize = 40;

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolver,
    DownloadPool,
}

/// 进度事件接收方，调用方不等待处理结果
pub trait ProgressSink: Send + Sync {
    fn report_queue_depths(&self, extraction: usize, download: usize);

    fn report_resolver_status(&self, status: ResolverStatus, title: Option<&str>);

    fn report_worker_status(&self, id: usize, status: WorkerStatus, title: &str, info: &str);

    fn log(&self, message: &str);

    fn report_scan_progress(&self, _counts: ScanCounts) {}

    /// 某个阶段的所有任务都已退出
    fn report_stage_stopped(&self, _stage: Stage) {}
}

/// 只输出 tracing 日志，用于非交互终端
#[derive(Debug, Default, Clone)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report_queue_depths(&self, extraction: usize, download: usize) {
        debug!(extraction, download, "队列深度");
    }

    fn report_resolver_status(&self, status: ResolverStatus, title: Option<&str>) {
        debug!(%status, title = title.unwrap_or("-"), "解析器状态");
    }

    fn report_worker_status(&self, id: usize, status: WorkerStatus, title: &str, info: &str) {
        match status {
            WorkerStatus::Idle => {}
            _ => info!(worker = id, %status, info, "{}", title),
        }
    }

    fn log(&self, message: &str) {
        info!("{}", message);
    }

    fn report_scan_progress(&self, counts: ScanCounts) {
        debug!(
            files = counts.files,
            assignments = counts.assignments,
            videos = counts.videos,
            "扫描进度"
        );
    }

    fn report_stage_stopped(&self, stage: Stage) {
        info!("阶段已停止: {:?}", stage);
    }
}

#[derive(Debug)]
struct HeaderState {
    extraction: usize,
    download: usize,
    resolver: String,
}

/// 终端面板：队列状态、扫描统计、每个下载线程一行
pub struct DashboardProgress {
    multi: MultiProgress,
    header: ProgressBar,
    scan: ProgressBar,
    workers: Vec<ProgressBar>,
    state: Mutex<HeaderState>,
}

impl DashboardProgress {
    pub fn new(workers: usize) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let header = multi.add(ProgressBar::new_spinner());
        header.set_style(style.clone());
        header.set_prefix("队列");
        header.enable_steady_tick(Duration::from_millis(200));

        let scan = multi.add(ProgressBar::new_spinner());
        scan.set_style(style.clone());
        scan.set_prefix("扫描");

        let workers = (0..workers)
            .map(|id| {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(style.clone());
                pb.set_prefix(format!("#{:<2}", id));
                pb.set_message("Idle");
                pb
            })
            .collect();

        let dashboard = Self {
            multi,
            header,
            scan,
            workers,
            state: Mutex::new(HeaderState {
                extraction: 0,
                download: 0,
                resolver: ResolverStatus::Idle.to_string(),
            }),
        };
        dashboard.redraw_header();
        dashboard
    }

    fn redraw_header(&self) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.header.set_message(format!(
            "解析队列 {} | 下载队列 {} | 解析器 {}",
            state.extraction, state.download, state.resolver
        ));
    }

    /// 结束面板绘制
    pub fn finish(&self) {
        self.header.finish_and_clear();
        self.scan.finish();
        for pb in &self.workers {
            pb.finish_and_clear();
        }
    }
}

impl ProgressSink for DashboardProgress {
    fn report_queue_depths(&self, extraction: usize, download: usize) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.extraction = extraction;
            state.download = download;
        }
        self.redraw_header();
    }

    fn report_resolver_status(&self, status: ResolverStatus, title: Option<&str>) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.resolver = match title {
                Some(title) => format!("{}: {}", status, truncate_title(title, 30)),
                None => status.to_string(),
            };
        }
        self.redraw_header();
    }

    fn report_worker_status(&self, id: usize, status: WorkerStatus, title: &str, info: &str) {
        let Some(pb) = self.workers.get(id) else {
            return;
        };
        let line = if status == WorkerStatus::Idle {
            "Idle".to_string()
        } else {
            format!("{:<11} {} {}", status, truncate_title(title, TITLE_WIDTH), info)
        };
        pb.set_message(line);
        pb.tick();
    }

    fn log(&self, message: &str) {
        // 打印在进度条上方，不打乱面板
        if self.multi.println(message).is_err() {
            info!("{}", message);
        }
    }

    fn report_scan_progress(&self, counts: ScanCounts) {
        self.scan.set_message(format!(
            "文件 {} | 作业 {} | 视频 {}",
            counts.files, counts.assignments, counts.videos
        ));
    }

    fn report_stage_stopped(&self, stage: Stage) {
        let message = match stage {
            Stage::Resolver => "解析阶段完成，等待下载...",
            Stage::DownloadPool => "下载阶段完成",
        };
        self.log(message);
    }
}
