use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use cookie::Cookie;
use cookie_store::CookieStore;
use reqwest::Url;
use reqwest_cookie_store::CookieStoreMutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::errors::{AuthError, Result};

/// 浏览器插件导出的列表格式，或者简单的 name -> value 映射
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CookieFile {
    List(Vec<CookieEntry>),
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
struct CookieEntry {
    name: Option<String>,
    value: Option<String>,
    domain: Option<String>,
    path: Option<String>,
}

/// 会话状态：所有请求共享同一个 cookie 存储，读取和刷新都在存储锁内完成
#[derive(Debug)]
pub struct SessionStore {
    base_url: Url,
    cookie_file: Option<PathBuf>,
    cookie_store: Arc<CookieStoreMutex>,
    loaded_mtime: Mutex<Option<SystemTime>>,
}

impl SessionStore {
    /// 创建空会话
    pub fn new(base_url: Url, cookie_file: Option<PathBuf>) -> Self {
        Self {
            base_url,
            cookie_file,
            cookie_store: Arc::new(CookieStoreMutex::new(CookieStore::default())),
            loaded_mtime: Mutex::new(None),
        }
    }

    /// 创建会话并立即加载 cookie 文件
    pub fn load(base_url: Url, cookie_file: Option<PathBuf>) -> Result<Self> {
        let store = Self::new(base_url, cookie_file);
        store.refresh()?;
        Ok(store)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cookie_file(&self) -> Option<&Path> {
        self.cookie_file.as_deref()
    }

    /// 交给 reqwest 作为 cookie provider
    pub fn cookie_store(&self) -> Arc<CookieStoreMutex> {
        Arc::clone(&self.cookie_store)
    }

    /// 重新读取 cookie 文件，返回写入的 cookie 数量
    pub fn refresh(&self) -> Result<usize> {
        let Some(path) = self.cookie_file.as_deref() else {
            return Ok(0);
        };
        if !path.exists() {
            warn!("cookie 文件不存在: {:?}，需要登录的内容可能无法访问", path);
            return Ok(0);
        }

        let mtime = std::fs::metadata(path)?.modified().ok();
        let raw = std::fs::read_to_string(path)?;
        let parsed: CookieFile = serde_json::from_str(&raw)?;

        let cookies: Vec<Cookie<'static>> = match parsed {
            CookieFile::List(entries) => entries
                .into_iter()
                .filter_map(|entry| {
                    let name = entry.name.filter(|n| !n.is_empty())?;
                    let value = entry.value.filter(|v| !v.is_empty())?;
                    let mut cookie = Cookie::new(name, value);
                    if let Some(domain) = entry.domain {
                        cookie.set_domain(domain);
                    }
                    if let Some(path) = entry.path {
                        cookie.set_path(path);
                    }
                    Some(cookie)
                })
                .collect(),
            CookieFile::Map(map) => map
                .into_iter()
                .map(|(name, value)| Cookie::new(name, value))
                .collect(),
        };

        let mut loaded = 0;
        {
            let mut store = self.cookie_store.lock().map_err(|_| AuthError::LockError)?;
            for cookie in &cookies {
                match store.insert_raw(cookie, &self.base_url) {
                    Ok(_) => loaded += 1,
                    Err(e) => {
                        // 域名不匹配的 cookie 去掉域名后按当前站点重新写入
                        debug!("cookie {} 按原域名写入失败: {}", cookie.name(), e);
                        let host_only = Cookie::new(cookie.name().to_string(), cookie.value().to_string());
                        store
                            .insert_raw(&host_only, &self.base_url)
                            .map_err(|e| AuthError::CookieRejected {
                                name: cookie.name().to_string(),
                                reason: e.to_string(),
                            })?;
                        loaded += 1;
                    }
                }
            }
        }

        *self.loaded_mtime.lock().unwrap_or_else(PoisonError::into_inner) = mtime;
        info!("已从 {:?} 加载 {} 个 cookie", path, loaded);
        Ok(loaded)
    }

    /// cookie 文件被修改过才重新加载
    pub fn refresh_if_changed(&self) -> Result<bool> {
        let Some(path) = self.cookie_file.as_deref() else {
            return Ok(false);
        };
        let current = match std::fs::metadata(path) {
            Ok(meta) => meta.modified().ok(),
            Err(_) => return Ok(false),
        };
        let previous = *self.loaded_mtime.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() && current == previous {
            return Ok(false);
        }
        self.refresh()?;
        Ok(true)
    }

    /// 当前站点可用的 cookie 名称（快照）
    pub fn cookie_names(&self) -> Result<Vec<String>> {
        let store = self.cookie_store.lock().map_err(|_| AuthError::LockError)?;
        let mut names: Vec<String> = store
            .matches(&self.base_url)
            .into_iter()
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base() -> Url {
        Url::parse("https://ys.learnus.org/").unwrap()
    }

    #[test]
    fn test_load_list_format() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "MoodleSession", "value": "abc", "domain": ".learnus.org", "path": "/"}},
                {{"name": "empty", "value": ""}},
                {{"name": "foreign", "value": "x", "domain": "example.com"}}
            ]"#
        )
        .unwrap();

        let store = SessionStore::load(base(), Some(file.path().to_path_buf())).unwrap();
        assert_eq!(store.cookie_names().unwrap(), vec!["MoodleSession", "foreign"]);
    }

    #[test]
    fn test_load_map_format() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"MoodleSession": "abc", "lang": "ko"}}"#).unwrap();

        let store = SessionStore::load(base(), Some(file.path().to_path_buf())).unwrap();
        assert_eq!(store.cookie_names().unwrap(), vec!["MoodleSession", "lang"]);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(base(), Some(dir.path().join("cookies.json"))).unwrap();
        assert!(store.cookie_names().unwrap().is_empty());
        assert!(!store.refresh_if_changed().unwrap());
    }

    #[test]
    fn test_refresh_if_changed_skips_unchanged_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"MoodleSession": "abc"}}"#).unwrap();

        let store = SessionStore::load(base(), Some(file.path().to_path_buf())).unwrap();
        assert!(!store.refresh_if_changed().unwrap());
    }

    #[test]
    fn test_invalid_file_reports_format_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = SessionStore::load(base(), Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, AuthError::CookieFormat(_)));
    }
}
