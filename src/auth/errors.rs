use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("IO操作失败: {0}")]
    IoError(#[from] std::io::Error),

    #[error("cookie 文件格式错误: {0}")]
    CookieFormat(#[from] serde_json::Error),

    #[error("cookie 被拒绝 ({name}): {reason}")]
    CookieRejected { name: String, reason: String },

    #[error("会话加锁失败")]
    LockError,
}

pub type Result<T> = std::result::Result<T, AuthError>;
