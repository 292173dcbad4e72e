use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::errors::ParseError;
use super::models::{DiscoveredItem, ScanSummary};

// 内容扫描器：遍历课程页面，边扫描边把条目发送出去
// 课程级别的会话失效必须以 ParseError::SessionLost 返回，由调用方决定是否重启
#[async_trait]
pub trait ContentScanner: Send + Sync {
    async fn scan(&self, items: UnboundedSender<DiscoveredItem>) -> Result<ScanSummary, ParseError>;
}
