use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

lazy_static! {
    static ref HLS_SOURCE: Selector =
        Selector::parse(r#"source[type="application/x-mpegURL"]"#).expect("静态选择器");
    static ref ANY_SOURCE: Selector = Selector::parse("source[src]").expect("静态选择器");
    static ref JSON_FILE: Regex =
        Regex::new(r#""file"\s*:\s*"(https?:[^"]+\.m3u8[^"]*)""#).expect("静态正则");
    static ref RAW_M3U8: Regex =
        Regex::new(r#"(https?://[^"'\s<>]+\.m3u8[^"'\s<>]*)"#).expect("静态正则");
}

/// 命中的提取策略，按优先级排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStrategy {
    /// `<source>` 元素
    SourceElement,
    /// 播放器配置里的 `"file":"..."` JSON 字面量
    JsonFileLiteral,
    /// 全文扫描 `.m3u8` 地址
    RawScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLocator {
    pub url: String,
    pub strategy: LocatorStrategy,
}

/// 从视频页面中找出 m3u8 地址，第一个命中的策略生效
pub fn find_stream_locator(html: &str) -> Option<StreamLocator> {
    from_source_element(html)
        .map(|url| (url, LocatorStrategy::SourceElement))
        .or_else(|| from_json_literal(html).map(|url| (url, LocatorStrategy::JsonFileLiteral)))
        .or_else(|| from_raw_scan(html).map(|url| (url, LocatorStrategy::RawScan)))
        .map(|(url, strategy)| StreamLocator { url, strategy })
}

fn from_source_element(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let typed = document
        .select(&HLS_SOURCE)
        .filter_map(|el| el.value().attr("src"))
        .find(|src| !src.trim().is_empty());
    if let Some(src) = typed {
        return Some(src.trim().to_string());
    }

    document
        .select(&ANY_SOURCE)
        .filter_map(|el| el.value().attr("src"))
        .find(|src| src.contains(".m3u8"))
        .map(|src| src.trim().to_string())
}

fn from_json_literal(html: &str) -> Option<String> {
    JSON_FILE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("\\/", "/"))
}

fn from_raw_scan(html: &str) -> Option<String> {
    RAW_M3U8
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_element_with_hls_type() {
        let html = r#"<video><source type="application/x-mpegURL" src="https://cdn.example.com/a/index.m3u8?token=1&amp;x=2"></video>"#;
        let locator = find_stream_locator(html).unwrap();
        assert_eq!(locator.strategy, LocatorStrategy::SourceElement);
        assert_eq!(locator.url, "https://cdn.example.com/a/index.m3u8?token=1&x=2");
    }

    #[test]
    fn test_source_element_by_extension() {
        let html = r#"<video><source src="/poster.mp4"><source src="https://cdn.example.com/b/playlist.m3u8"></video>"#;
        let locator = find_stream_locator(html).unwrap();
        assert_eq!(locator.strategy, LocatorStrategy::SourceElement);
        assert_eq!(locator.url, "https://cdn.example.com/b/playlist.m3u8");
    }

    #[test]
    fn test_escaped_json_literal() {
        let html = r#"<script>jwplayer("p").setup({"file":"https:\/\/cdn.example.com\/c\/master.m3u8?k=v","width":"100%"});</script>"#;
        let locator = find_stream_locator(html).unwrap();
        assert_eq!(locator.strategy, LocatorStrategy::JsonFileLiteral);
        assert_eq!(locator.url, "https://cdn.example.com/c/master.m3u8?k=v");
    }

    #[test]
    fn test_raw_scan_fallback() {
        let html = "<script>var src = 'https://cdn.example.com/d/index.m3u8?a=1&amp;b=2';</script>";
        let locator = find_stream_locator(html).unwrap();
        assert_eq!(locator.strategy, LocatorStrategy::RawScan);
        assert_eq!(locator.url, "https://cdn.example.com/d/index.m3u8?a=1&b=2");
    }

    #[test]
    fn test_source_element_wins_over_later_strategies() {
        let html = r#"
            <script>{"file":"https://cdn.example.com/json.m3u8"}</script>
            <source type="application/x-mpegURL" src="https://cdn.example.com/source.m3u8">
        "#;
        let locator = find_stream_locator(html).unwrap();
        assert_eq!(locator.strategy, LocatorStrategy::SourceElement);
        assert_eq!(locator.url, "https://cdn.example.com/source.m3u8");
    }

    #[test]
    fn test_no_locator() {
        assert_eq!(find_stream_locator("<html><body>강의 준비중</body></html>"), None);
    }
}
