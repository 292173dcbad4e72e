use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, ClientBuilder, Response,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT},
};
use tracing::{debug, warn};

use super::error::ApiError;
use super::fetcher::{FetchOutcome, PageFetcher};
use crate::auth::SessionStore;

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 单次请求超时，None 表示不限制
    pub timeout: Option<Duration>,
    /// 最终 URL 中出现这些片段即视为会话失效
    pub login_url_markers: Vec<String>,
    /// 页面正文中出现这些文本即视为登录页
    pub login_text_markers: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            login_url_markers: vec!["login.php".to_string(), "sso".to_string()],
            login_text_markers: vec!["연세포털 로그인".to_string()],
        }
    }
}

// 携带会话 cookie 的页面客户端
#[derive(Debug, Clone)]
pub struct LmsClient {
    inner: Client,
    session: Arc<SessionStore>,
    config: ClientConfig,
}

impl LmsClient {
    pub fn new(session: Arc<SessionStore>, config: ClientConfig) -> Result<Self, ApiError> {
        let mut builder = ClientBuilder::new()
            .cookie_provider(session.cookie_store())
            .default_headers(Self::get_default_headers());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let inner = builder.build().map_err(|e| ApiError::Build(e.to_string()))?;

        Ok(Self {
            inner,
            session,
            config,
        })
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ko-KR,ko;q=0.9,en;q=0.8"));
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"));
        headers
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// 带会话发送 GET，返回原始响应，用于下载文件
    pub async fn get(&self, url: &str, referer: Option<&str>) -> Result<Response, ApiError> {
        // cookie 文件可能被外部更新过（重新登录），请求前同步一次
        if let Err(e) = self.session.refresh_if_changed() {
            warn!("重新加载 cookie 失败，继续使用现有会话: {}", e);
        }

        let mut request = self.inner.get(url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        let resp = request.send().await?;
        debug!("GET {} -> {} ({})", url, resp.url(), resp.status());
        Ok(resp)
    }

    /// 最终地址是否为登录页
    pub fn is_login_url(&self, url: &str) -> bool {
        self.config
            .login_url_markers
            .iter()
            .any(|marker| url.contains(marker.as_str()))
    }

    fn is_login_page(&self, body: &str) -> bool {
        self.config
            .login_text_markers
            .iter()
            .any(|marker| body.contains(marker.as_str()))
    }
}

#[async_trait]
impl PageFetcher for LmsClient {
    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<FetchOutcome, ApiError> {
        let resp = self.get(url, referer).await?;

        let final_url = resp.url().to_string();
        if self.is_login_url(&final_url) {
            return Ok(FetchOutcome::SessionLost { final_url });
        }

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let body = resp.text().await?;
        if self.is_login_page(&body) {
            return Ok(FetchOutcome::SessionLost { final_url });
        }
        Ok(FetchOutcome::Content(body))
    }
}
