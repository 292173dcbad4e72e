use async_trait::async_trait;

use super::error::ApiError;

/// 一次页面请求的结果：会话失效与普通错误区分开
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Content(String),
    /// 被重定向到登录页，或者返回的是登录页面
    SessionLost { final_url: String },
}

impl FetchOutcome {
    pub fn is_session_lost(&self) -> bool {
        matches!(self, FetchOutcome::SessionLost { .. })
    }
}

/// 带认证的页面获取
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<FetchOutcome, ApiError>;
}
