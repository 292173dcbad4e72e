use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("未检测到 ffmpeg: {0}")]
    FfmpegNotFound(String),

    #[error("ffmpeg 退出码 {code:?}: {stderr}")]
    FfmpegFailed { code: Option<i32>, stderr: String },

    #[error("下载超时 ({0:?})")]
    Timeout(Duration),
}
