use thiserror::Error;

use crate::parser::errors::ParseError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// 课程级别（或按配置上报的解析阶段）会话失效，需要重新登录后整体重启
    #[error("会话已失效: {0}")]
    SessionLost(String),

    #[error("内容扫描失败: {0}")]
    Scan(ParseError),
}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::SessionLost(reason) => PipelineError::SessionLost(reason),
            other => PipelineError::Scan(other),
        }
    }
}

impl PipelineError {
    pub fn is_session_lost(&self) -> bool {
        matches!(self, PipelineError::SessionLost(_))
    }
}
