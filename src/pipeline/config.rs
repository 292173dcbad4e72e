use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::downloader::PoolConfig;
use crate::parser::resolver::ResolverConfig;

/// 解析阶段遇到会话失效时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SessionLossPolicy {
    /// 记录日志并丢弃该任务，流水线继续
    #[default]
    DropTask,
    /// 中止本轮流水线，交给调用方重新登录后重启
    Escalate,
}

/// 流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 下载线程数
    pub workers: usize,
    /// 各阶段从队列取任务的等待时间
    pub poll_interval: Duration,
    /// 收尾阶段检查队列的间隔
    pub drain_interval: Duration,
    /// None 表示无界队列
    pub extraction_capacity: Option<usize>,
    pub download_capacity: Option<usize>,
    pub media_extension: String,
    pub session_loss_policy: SessionLossPolicy,
    /// 找不到视频地址时保存原始页面的目录，None 表示不保存
    pub diagnostics_dir: Option<PathBuf>,
    /// 把 `view.php` 改写为 `viewer.php` 再请求
    pub rewrite_viewer_url: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            poll_interval: Duration::from_secs(1),
            drain_interval: Duration::from_secs(1),
            extraction_capacity: None,
            download_capacity: None,
            media_extension: "mp4".to_string(),
            session_loss_policy: SessionLossPolicy::DropTask,
            diagnostics_dir: Some(PathBuf::from(".")),
            rewrite_viewer_url: true,
        }
    }
}

impl PipelineConfig {
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            poll_interval: self.poll_interval,
            rewrite_viewer_url: self.rewrite_viewer_url,
            diagnostics_dir: self.diagnostics_dir.clone(),
            session_loss_policy: self.session_loss_policy,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            poll_interval: self.poll_interval,
            media_extension: self.media_extension.clone(),
        }
    }
}
