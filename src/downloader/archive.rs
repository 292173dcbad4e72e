use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::common::client::client::LmsClient;
use crate::common::client::error::ApiError;
use crate::common::utils::{sanitize_filename, title_or_id};
use crate::parser::errors::ParseError;
use crate::parser::models::DiscoveredItem;

lazy_static! {
    static ref RFC5987_NAME: Regex =
        Regex::new(r"(?i)filename\*\s*=\s*UTF-8''([^;]+)").expect("静态正则");
    static ref PLAIN_NAME: Regex =
        Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).expect("静态正则");
}

/// 课程文件的保存结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Saved(PathBuf),
    /// 同名文件已存在，未重新下载
    Exists(PathBuf),
}

/// 课程文件（讲义等）下载
///
/// 会话失效返回 [`ParseError::SessionLost`]，和课程页一样交给调用方重启
#[async_trait]
pub trait FileArchiver: Send + Sync {
    async fn archive(&self, item: &DiscoveredItem) -> Result<ArchiveOutcome, ParseError>;
}

/// 从 Content-Disposition 中取文件名，优先 `filename*=UTF-8''...`
///
/// 服务器常把 UTF-8 字节原样写进 `filename="..."`，这里按 UTF-8 解读原始字节。
pub fn filename_from_disposition(raw: &[u8]) -> Option<String> {
    let header = String::from_utf8_lossy(raw);

    if let Some(encoded) = RFC5987_NAME.captures(&header).and_then(|c| c.get(1)) {
        if let Ok(decoded) = urlencoding::decode(encoded.as_str().trim()) {
            let name = decoded.trim().to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    let plain = PLAIN_NAME.captures(&header)?.get(1)?.as_str().trim().to_string();
    let name = match urlencoding::decode(&plain) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plain,
    };
    (!name.is_empty()).then_some(name)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

#[async_trait]
impl FileArchiver for LmsClient {
    async fn archive(&self, item: &DiscoveredItem) -> Result<ArchiveOutcome, ParseError> {
        let resp = self.get(&item.url, item.referer.as_deref()).await?;

        let final_url = resp.url().to_string();
        if self.is_login_url(&final_url) {
            return Err(ParseError::SessionLost(format!(
                "下载文件时被重定向到登录页: {}",
                final_url
            )));
        }
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            }
            .into());
        }

        let name = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| filename_from_disposition(value.as_bytes()))
            .unwrap_or_else(|| title_or_id(&item.title, &item.url));
        let path = item.folder.join(sanitize_filename(&name));
        if tokio::fs::try_exists(&path).await? {
            debug!("文件已存在: {:?}", path);
            return Ok(ArchiveOutcome::Exists(path));
        }

        tokio::fs::create_dir_all(&item.folder).await?;
        // 先写临时文件，完整下载后再改名，中断的下载不会被当成已完成
        let partial = partial_path(&path);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ApiError::from)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, &path).await?;

        info!("✅ 文件已保存: {:?}", path);
        Ok(ArchiveOutcome::Saved(path))
    }
}
