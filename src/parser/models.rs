use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::common::utils::title_or_id;

/// 扫描到的内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Assignment,
    Vod, // 流媒体视频，进入解析队列
    #[serde(other)]
    Other,
}

/// 内容扫描器产出的条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub kind: ItemKind,
    pub title: String,
    pub url: String,
    pub folder: PathBuf,
    #[serde(default)]
    pub referer: Option<String>,
}

impl DiscoveredItem {
    pub fn is_streaming_media(&self) -> bool {
        self.kind == ItemKind::Vod
    }

    /// 只有视频条目会被转换为解析任务
    pub fn into_extraction_task(self) -> Option<ExtractionTask> {
        if !self.is_streaming_media() {
            return None;
        }
        Some(ExtractionTask {
            title: title_or_id(&self.title, &self.url),
            source_url: self.url,
            destination_folder: self.folder,
            referer_url: self.referer,
        })
    }
}

/// 解析任务：一个待解析出 m3u8 地址的视频页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionTask {
    pub source_url: String,
    pub destination_folder: PathBuf,
    pub title: String,
    pub referer_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStatus {
    Idle,
    Resolving,
}

impl fmt::Display for ResolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverStatus::Idle => write!(f, "Idle"),
            ResolverStatus::Resolving => write!(f, "Resolving"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverState {
    pub status: ResolverStatus,
    pub current_title: Option<String>,
}

impl Default for ResolverState {
    fn default() -> Self {
        Self {
            status: ResolverStatus::Idle,
            current_title: None,
        }
    }
}

/// 扫描统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounts {
    pub files: usize,
    pub assignments: usize,
    pub videos: usize,
    pub others: usize,
}

impl ScanCounts {
    pub fn record(&mut self, kind: ItemKind) {
        match kind {
            ItemKind::File => self.files += 1,
            ItemKind::Assignment => self.assignments += 1,
            ItemKind::Vod => self.videos += 1,
            ItemKind::Other => self.others += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.files + self.assignments + self.videos + self.others
    }
}

/// 扫描器返回的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub sources: usize, // 扫描过的课程/清单数
    pub counts: ScanCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_vod_items_become_tasks() {
        let vod = DiscoveredItem {
            kind: ItemKind::Vod,
            title: "1강".to_string(),
            url: "https://ys.learnus.org/mod/vod/view.php?id=1".to_string(),
            folder: PathBuf::from("Archive/1주차"),
            referer: Some("https://ys.learnus.org/course/view.php?id=9".to_string()),
        };
        let task = vod.clone().into_extraction_task().unwrap();
        assert_eq!(task.source_url, vod.url);
        assert_eq!(task.referer_url, vod.referer);

        let file = DiscoveredItem {
            kind: ItemKind::File,
            ..vod
        };
        assert!(file.into_extraction_task().is_none());
    }

    #[test]
    fn test_unusable_titles_get_distinct_names() {
        let item = |id: u32| DiscoveredItem {
            kind: ItemKind::Vod,
            title: "???".to_string(),
            url: format!("https://ys.learnus.org/mod/vod/view.php?id={}", id),
            folder: PathBuf::from("Archive"),
            referer: None,
        };
        let first = item(1).into_extraction_task().unwrap();
        let second = item(2).into_extraction_task().unwrap();
        assert_eq!(first.title, "untitled-1");
        assert_eq!(second.title, "untitled-2");
    }

    #[test]
    fn test_unknown_kind_deserializes_as_other() {
        let item: DiscoveredItem =
            serde_json::from_str(r#"{"kind":"quiz","title":"q","url":"u","folder":"f"}"#).unwrap();
        assert_eq!(item.kind, ItemKind::Other);
        assert_eq!(item.referer, None);
    }
}
