use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::utils::sanitize_filename;

/// 下载任务：已解析出的流地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub stream_locator: String,
    pub destination_folder: PathBuf,
    pub title: String,
}

impl DownloadTask {
    pub fn new(stream_locator: String, destination_folder: PathBuf, title: String) -> Self {
        Self {
            stream_locator,
            destination_folder,
            title,
        }
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", sanitize_filename(&self.title), extension)
    }

    /// 目标文件路径，文件存在即视为已完成
    pub fn destination_path(&self, extension: &str) -> PathBuf {
        self.destination_folder.join(self.file_name(extension))
    }

    pub fn folder(&self) -> &Path {
        &self.destination_folder
    }
}

// --------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Starting,
    Downloading,
    Finished,
    Skipped,
    Error,
}

impl WorkerStatus {
    /// 处于这些状态时 worker 正在处理任务
    pub fn is_busy(&self) -> bool {
        matches!(self, WorkerStatus::Starting | WorkerStatus::Downloading)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::Idle => "Idle",
            WorkerStatus::Starting => "Starting",
            WorkerStatus::Downloading => "Downloading",
            WorkerStatus::Finished => "Finished",
            WorkerStatus::Skipped => "Skipped",
            WorkerStatus::Error => "Error",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerState {
    pub id: usize,
    pub status: WorkerStatus,
    pub current_title: String,
    pub info: String,
}

impl WorkerState {
    pub fn idle(id: usize) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            current_title: "-".to_string(),
            info: String::new(),
        }
    }
}
