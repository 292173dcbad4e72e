use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

use crate::common::client::client::ClientConfig;
use crate::common::utils::sanitize_filename;
use crate::parser::CourseTarget;
use crate::pipeline::config::{PipelineConfig, SessionLossPolicy};

/// 课程视频备份工具
#[derive(Parser, Debug)]
#[command(name = "vodl")]
#[command(version = "0.1")]
#[command(about = "把课程页面中的视频批量保存为本地 mp4", long_about = None)]
pub struct Cli {
    /// 课程主页地址，可重复指定
    #[arg(long = "course", value_name = "URL")]
    #[arg(required_unless_present = "manifest")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub courses: Vec<String>,

    /// 条目清单 (JSON)，代替在线扫描课程页面
    #[arg(long, value_name = "FILE", conflicts_with = "courses")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub manifest: Option<PathBuf>,

    /// 站点地址，cookie 按该地址写入
    #[arg(long, value_name = "URL", default_value = "https://ys.learnus.org/")]
    pub base_url: String,

    /// cookie 文件 (浏览器导出的 JSON)
    #[arg(long, value_name = "FILE", default_value = "cookies.json")]
    pub cookies: PathBuf,

    /// 保存目录
    #[arg(long, value_name = "DIR", default_value = "Archive")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// 学期目录名，如 2025-2
    #[arg(long, value_name = "SEMESTER")]
    pub semester: Option<String>,

    /// 并行下载线程数
    #[arg(long, default_value_t = 8)]
    pub threads: usize,

    /// 输出文件扩展名
    #[arg(long, default_value = "mp4")]
    pub extension: String,

    /// 解析队列容量，不指定为无界
    #[arg(long, value_name = "N")]
    pub extraction_queue_capacity: Option<usize>,

    /// 下载队列容量，不指定为无界
    #[arg(long, value_name = "N")]
    pub download_queue_capacity: Option<usize>,

    /// 页面请求超时（秒）
    #[arg(long, value_name = "SECS")]
    pub page_timeout: Option<u64>,

    /// 单个视频下载超时（秒）
    #[arg(long, value_name = "SECS")]
    pub fetch_timeout: Option<u64>,

    /// 解析视频时会话失效的处理方式
    #[arg(long, value_enum, default_value_t = SessionLossPolicy::DropTask)]
    pub session_loss: SessionLossPolicy,

    /// 会话失效后最多重启几次
    #[arg(long, default_value_t = 0)]
    pub max_restarts: u32,

    /// 重启前等待用户更新 cookie 文件并按 Enter
    #[arg(long)]
    pub wait_for_login: bool,

    /// 找不到视频地址时保存原始页面的目录
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub diagnostics_dir: PathBuf,

    /// 不保存原始页面
    #[arg(long)]
    pub no_diagnostics: bool,

    /// 直接请求 view.php，不改写为 viewer.php
    #[arg(long)]
    pub no_viewer_rewrite: bool,

    /// 不显示终端面板，只输出日志
    #[arg(long)]
    pub no_dashboard: bool,

    /// 只下载视频，不保存课程文件
    #[arg(long)]
    pub skip_files: bool,

    /// 输出调试日志（会关闭终端面板）
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            workers: self.threads.max(1),
            extraction_capacity: self.extraction_queue_capacity,
            download_capacity: self.download_queue_capacity,
            media_extension: self.extension.clone(),
            session_loss_policy: self.session_loss,
            diagnostics_dir: (!self.no_diagnostics).then(|| self.diagnostics_dir.clone()),
            rewrite_viewer_url: !self.no_viewer_rewrite,
            ..PipelineConfig::default()
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: self.page_timeout.map(Duration::from_secs),
            ..ClientConfig::default()
        }
    }

    /// 终端面板只在交互终端上启用，调试日志会打乱面板所以 -v 时关闭
    pub fn dashboard_enabled(&self, stderr_is_terminal: bool) -> bool {
        stderr_is_terminal && !self.no_dashboard && !self.verbose
    }

    /// 面板开启时 tracing 只输出警告以上，进度信息走面板
    pub fn log_level(&self, dashboard: bool) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if dashboard {
            Level::WARN
        } else {
            Level::INFO
        }
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout.map(Duration::from_secs)
    }

    /// 保存根目录: <output_dir>/<semester>
    pub fn archive_root(&self) -> PathBuf {
        match &self.semester {
            Some(semester) => self.output_dir.join(sanitize_filename(semester)),
            None => self.output_dir.clone(),
        }
    }

    pub fn course_targets(&self) -> Vec<CourseTarget> {
        self.courses
            .iter()
            .map(|url| CourseTarget {
                url: url.clone(),
                name: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from([
            "vodl",
            "--course",
            "https://ys.learnus.org/course/view.php?id=1",
        ])
        .unwrap();
        let config = cli.pipeline_config();
        assert_eq!(config.workers, 8);
        assert_eq!(config.media_extension, "mp4");
        assert_eq!(config.extraction_capacity, None);
        assert_eq!(config.session_loss_policy, SessionLossPolicy::DropTask);
        assert!(config.rewrite_viewer_url);
        assert_eq!(cli.client_config().timeout, None);
        assert_eq!(cli.archive_root(), PathBuf::from("Archive"));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "vodl",
            "--course",
            "https://ys.learnus.org/course/view.php?id=1",
            "--course",
            "https://ys.learnus.org/course/view.php?id=2",
            "--semester",
            "2025/2",
            "--threads",
            "2",
            "--download-queue-capacity",
            "16",
            "--session-loss",
            "escalate",
            "--page-timeout",
            "30",
            "--no-diagnostics",
        ])
        .unwrap();
        let config = cli.pipeline_config();
        assert_eq!(config.workers, 2);
        assert_eq!(config.download_capacity, Some(16));
        assert_eq!(config.session_loss_policy, SessionLossPolicy::Escalate);
        assert_eq!(config.diagnostics_dir, None);
        assert_eq!(cli.client_config().timeout, Some(Duration::from_secs(30)));
        assert_eq!(cli.archive_root(), PathBuf::from("Archive").join("20252"));
        assert_eq!(cli.course_targets().len(), 2);
    }

    #[test]
    fn test_dashboard_quiets_tracing() {
        let quiet = Cli::try_parse_from(["vodl", "--manifest", "items.json"]).unwrap();
        assert!(quiet.dashboard_enabled(true));
        assert!(!quiet.dashboard_enabled(false));
        assert_eq!(quiet.log_level(true), Level::WARN);
        assert_eq!(quiet.log_level(false), Level::INFO);

        let verbose = Cli::try_parse_from(["vodl", "--manifest", "items.json", "-v"]).unwrap();
        assert!(!verbose.dashboard_enabled(true));
        assert_eq!(verbose.log_level(false), Level::DEBUG);

        let plain =
            Cli::try_parse_from(["vodl", "--manifest", "items.json", "--no-dashboard"]).unwrap();
        assert!(!plain.dashboard_enabled(true));
    }

    #[test]
    fn test_course_or_manifest_required() {
        assert!(Cli::try_parse_from(["vodl"]).is_err());
        assert!(Cli::try_parse_from(["vodl", "--manifest", "items.json"]).is_ok());
    }
}
