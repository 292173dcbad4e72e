pub mod errors;
pub mod session;

use std::sync::Arc;

use colored::Colorize;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use uuid::Uuid;

pub use session::SessionStore;

use crate::common::logger::PrettyLogger;
use errors::Result;

// 认证状态管理：持有共享会话，负责会话失效后的重新加载
#[derive(Debug, Clone)]
pub struct AuthManager {
    session: Arc<SessionStore>,
    session_id: Uuid,
}

impl AuthManager {
    pub fn new(base_url: Url, cookie_file: Option<std::path::PathBuf>) -> Result<Self> {
        let session = SessionStore::load(base_url, cookie_file)?;
        let session_id = Uuid::new_v4();
        info!("{}: {}", "创建会话".green(), session_id);
        Ok(Self {
            session: Arc::new(session),
            session_id,
        })
    }

    pub fn session(&self) -> Arc<SessionStore> {
        Arc::clone(&self.session)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// 重新读取 cookie 文件，作为新的会话
    pub fn relogin(&mut self) -> Result<usize> {
        let loaded = self.session.refresh()?;
        self.session_id = Uuid::new_v4();
        info!("{}: {} ({} 个 cookie)", "会话已刷新".green(), self.session_id, loaded);
        Ok(loaded)
    }

    /// 提示用户更新 cookie 文件，等待回车后重新加载
    pub async fn wait_for_relogin(&mut self) -> Result<usize> {
        let file = self
            .session
            .cookie_file()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "cookie 文件".to_string());
        PrettyLogger::login_prompt(file);

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        self.relogin()
    }
}
