use thiserror::Error;

use crate::common::client::error::ApiError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("会话已失效: {0}")]
    SessionLost(String),

    #[error("页面请求失败: {0}")]
    Api(#[from] ApiError),

    #[error("未找到视频地址: {0}")]
    LocatorNotFound(String),

    #[error("清单格式错误: {0}")]
    InvalidManifest(#[from] serde_json::Error),

    #[error("IO操作失败: {0}")]
    IoError(#[from] std::io::Error),
}

impl ParseError {
    pub fn is_session_lost(&self) -> bool {
        matches!(self, ParseError::SessionLost(_))
    }
}
