use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use tracing::{debug, info, warn};

use course_vod_dl::auth::AuthManager;
use course_vod_dl::cli::Cli;
use course_vod_dl::common::client::client::LmsClient;
use course_vod_dl::common::client::fetcher::PageFetcher;
use course_vod_dl::common::logger::PrettyLogger;
use course_vod_dl::downloader::archive::FileArchiver;
use course_vod_dl::downloader::progress::{DashboardProgress, ProgressSink, TracingProgress};
use course_vod_dl::downloader::remux::FfmpegRemuxer;
use course_vod_dl::parser::{ContentScanner, CourseScanner, ManifestScanner};
use course_vod_dl::pipeline::error::PipelineError;
use course_vod_dl::pipeline::{PipelineController, RunReport};
use course_vod_dl::{log_error, log_success, log_warning};

/// 根据命令行参数创建扫描器：有清单文件用清单，否则在线扫描课程页
fn build_scanner(args: &Cli, client: Arc<LmsClient>) -> Box<dyn ContentScanner> {
    match &args.manifest {
        Some(path) => {
            info!("使用条目清单: {:?}", path);
            Box::new(ManifestScanner::new(path))
        }
        None => Box::new(CourseScanner::new(
            client,
            args.course_targets(),
            args.archive_root(),
        )),
    }
}

fn print_summary(report: &RunReport) {
    PrettyLogger::separator();
    PrettyLogger::completion_summary(vec![
        format!(
            "📂 发现条目: {} (文件 {}, 视频 {}, 作业 {} 未下载, 其他 {})",
            report.discovered.total(),
            report.discovered.files,
            report.discovered.videos,
            report.discovered.assignments,
            report.discovered.others
        ),
        format!(
            "📄 课程文件: {} 保存 / {} 已存在 / {} 失败",
            report.files.saved, report.files.existing, report.files.failed
        ),
        format!(
            "🔍 解析视频: {} 成功 / {} 失败",
            report.resolved, report.extraction_failed
        ),
        format!(
            "⬇️ 下载视频: {} 完成 / {} 已存在 / {} 失败",
            report.finished, report.skipped, report.failed
        ),
        format!("⏱️ 耗时: {:.1}s", report.elapsed.as_secs_f64()),
    ]);
    if report.files.failed > 0 {
        log_warning!("{} 个课程文件未能保存", report.files.failed);
    }
    if report.failed + report.extraction_failed > 0 {
        log_warning!(
            "{} 个视频未能保存，可查看日志后重新运行",
            report.failed + report.extraction_failed
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let use_dashboard = args.dashboard_enabled(std::io::stderr().is_terminal());

    // 日志写到 stderr，stdout 留给总结输出
    tracing_subscriber::fmt()
        .with_max_level(args.log_level(use_dashboard))
        .with_writer(std::io::stderr)
        .init();

    PrettyLogger::title("课程视频备份");

    let base_url = Url::parse(&args.base_url)
        .with_context(|| format!("无效的站点地址: {}", args.base_url))?;
    let mut auth = AuthManager::new(base_url, Some(args.cookies.clone()))
        .context("加载 cookie 文件失败")?;

    let remuxer = FfmpegRemuxer::from_env(args.fetch_timeout());
    if let Err(e) = remuxer.check_available().await {
        log_error!("未检测到 ffmpeg，请安装后重试或设置 FFMPEG_PATH");
        return Err(e.into());
    }

    let config = args.pipeline_config();
    debug!("流水线配置: {:?}", config);

    let mut restarts = 0;
    loop {
        let client = Arc::new(
            LmsClient::new(auth.session(), args.client_config()).context("创建 HTTP 客户端失败")?,
        );
        let scanner = build_scanner(&args, Arc::clone(&client));

        let dashboard = use_dashboard.then(|| Arc::new(DashboardProgress::new(config.workers)));
        let sink: Arc<dyn ProgressSink> = match &dashboard {
            Some(dashboard) => Arc::clone(dashboard) as Arc<dyn ProgressSink>,
            None => Arc::new(TracingProgress),
        };

        PrettyLogger::info(format!(
            "会话 {}，{} 个下载线程",
            auth.session_id(),
            config.workers
        ));
        let mut controller = PipelineController::new(
            config.clone(),
            Arc::clone(&client) as Arc<dyn PageFetcher>,
            Arc::new(remuxer.clone()),
            sink,
        );
        if !args.skip_files {
            controller = controller.with_archiver(client as Arc<dyn FileArchiver>);
        }
        let result = controller.run(scanner.as_ref()).await;
        if let Some(dashboard) = &dashboard {
            dashboard.finish();
        }

        match result {
            Ok(report) => {
                print_summary(&report);
                log_success!("全部完成");
                return Ok(());
            }
            Err(PipelineError::SessionLost(reason)) => {
                warn!("会话失效: {}", reason);
                if restarts >= args.max_restarts {
                    log_error!("会话失效且已达到最大重启次数 ({})", args.max_restarts);
                    return Err(PipelineError::SessionLost(reason).into());
                }
                restarts += 1;
                if args.wait_for_login {
                    auth.wait_for_relogin().await?;
                } else {
                    auth.relogin()?;
                }
                PrettyLogger::warning(format!(
                    "重新开始第 {}/{} 次，已存在的文件会被跳过",
                    restarts, args.max_restarts
                ));
            }
            Err(e) => {
                PrettyLogger::error(format!("流水线失败: {}", e));
                return Err(e.into());
            }
        }
    }
}
