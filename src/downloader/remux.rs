use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::error::DownloadError;

/// 外部拉流工具：把 m3u8 拉取并封装成单个文件
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    async fn fetch(&self, locator: &str, destination: &Path) -> Result<(), DownloadError>;
}

/// 调用系统 FFmpeg，音视频流直接复制不重新编码
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegRemuxer {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// 程序路径取自环境变量 FFMPEG_PATH，默认 `ffmpeg`
    pub fn from_env(timeout: Option<Duration>) -> Self {
        let program = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
        Self::new(program, timeout)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn build_args(locator: &str, destination: &Path) -> Vec<OsString> {
        vec![
            "-i".into(),
            locator.into(),
            "-c".into(),
            "copy".into(),
            "-bsf:a".into(),
            "aac_adtstoasc".into(),
            destination.as_os_str().to_os_string(),
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
        ]
    }

    /// 检查 ffmpeg 是否可用
    pub async fn check_available(&self) -> Result<(), DownloadError> {
        debug!("检查系统中是否安装了 ffmpeg: {:?}", self.program);
        let status = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(DownloadError::FfmpegNotFound(format!(
                "{:?} -version 返回 {}",
                self.program, status
            ))),
            Err(e) => {
                error!("❌ 未检测到 ffmpeg，请安装 ffmpeg 或设置环境变量 FFMPEG_PATH");
                Err(DownloadError::FfmpegNotFound(format!("{:?}: {}", self.program, e)))
            }
        }
    }
}

#[async_trait]
impl StreamFetcher for FfmpegRemuxer {
    async fn fetch(&self, locator: &str, destination: &Path) -> Result<(), DownloadError> {
        let output = Command::new(&self.program)
            .args(Self::build_args(locator, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // 超时后 future 被丢弃，子进程随之结束
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| DownloadError::Timeout(limit))??,
            None => output.await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("❌ ffmpeg 失败 {:?}: {}", destination, stderr);
            return Err(DownloadError::FfmpegFailed {
                code: output.status.code(),
                stderr,
            });
        }

        info!("✅ 已保存: {:?}", destination);
        Ok(())
    }
}
