use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use super::errors::ParseError;
use super::models::{DiscoveredItem, ScanSummary};
use super::parser_trait::ContentScanner;

/// 从 JSON 清单读取条目，不访问网络
///
/// 清单格式：`[{"kind": "vod", "title": "...", "url": "...", "folder": "...", "referer": "..."}]`
#[derive(Debug, Clone)]
pub struct ManifestScanner {
    path: PathBuf,
}

impl ManifestScanner {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub async fn load(&self) -> Result<Vec<DiscoveredItem>, ParseError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl ContentScanner for ManifestScanner {
    async fn scan(&self, items: UnboundedSender<DiscoveredItem>) -> Result<ScanSummary, ParseError> {
        let entries = self.load().await?;
        info!("清单 {:?} 共 {} 个条目", self.path, entries.len());

        let mut summary = ScanSummary {
            sources: 1,
            ..Default::default()
        };
        for item in entries {
            summary.counts.record(item.kind);
            if item.is_streaming_media() {
                tokio::fs::create_dir_all(&item.folder).await?;
            }
            if items.send(item).is_err() {
                debug!("接收端已关闭，停止读取清单");
                break;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::models::ItemKind;

    #[tokio::test]
    async fn test_manifest_scan_emits_all_items() {
        let dir = tempfile::tempdir().unwrap();
        let week = dir.path().join("1주차");
        let manifest = dir.path().join("items.json");
        let body = serde_json::json!([
            {"kind": "vod", "title": "1강", "url": "https://ys.learnus.org/mod/vod/view.php?id=1", "folder": week},
            {"kind": "file", "title": "slides.pdf", "url": "https://ys.learnus.org/mod/ubfile/view.php?id=2", "folder": week}
        ]);
        tokio::fs::write(&manifest, body.to_string()).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let summary = ManifestScanner::new(&manifest).scan(tx).await.unwrap();

        assert_eq!(summary.counts.videos, 1);
        assert_eq!(summary.counts.files, 1);
        assert!(week.is_dir());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ItemKind::Vod);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, ItemKind::File);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("items.json");
        tokio::fs::write(&manifest, "{").await.unwrap();

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = ManifestScanner::new(&manifest).scan(tx).await.unwrap_err();
        assert!(matches!(err, ParseError::InvalidManifest(_)));
    }
}
