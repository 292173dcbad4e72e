use thiserror::Error;

use crate::auth::errors::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("网络请求失败: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("HTTP 状态异常 {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("无效的URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("会话状态错误: {0}")]
    Session(#[from] AuthError),

    #[error("客户端构建失败: {0}")]
    Build(String),
}
