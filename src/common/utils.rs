use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ILLEGAL_CHARS: Regex = Regex::new(r#"[\\/*?:"<>|]"#).expect("静态正则");
    static ref ID_PARAM: Regex = Regex::new(r"[?&]id=(\d+)").expect("静态正则");
}

const UNTITLED: &str = "untitled";

fn strip_illegal(name: &str) -> String {
    ILLEGAL_CHARS.replace_all(name, "").trim().to_string()
}

/// 去掉文件名中的非法字符，清理后为空时返回 `untitled`
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = strip_illegal(name);
    if cleaned.is_empty() {
        UNTITLED.to_string()
    } else {
        cleaned
    }
}

/// 标题清理后为空时用链接里的 id 命名，避免不同条目落到同一个文件
pub fn title_or_id(title: &str, url: &str) -> String {
    if !strip_illegal(title).is_empty() {
        return title.to_string();
    }
    match extract_id(url) {
        Some(id) => format!("{}-{}", UNTITLED, id),
        None => UNTITLED.to_string(),
    }
}

/// 按字符截断标题，用于状态展示
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    title.chars().take(max_chars).collect()
}

/// 从 URL 中提取 `id=` 参数
pub fn extract_id(url: &str) -> Option<String> {
    ID_PARAM
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename(" 1주차: 강의/소개? "), "1주차 강의소개");
        assert_eq!(sanitize_filename(r#"a\b*c"d<e>f|g"#), "abcdefg");
        assert_eq!(sanitize_filename("plain title"), "plain title");
        assert_eq!(sanitize_filename(" ??? "), "untitled");
    }

    #[test]
    fn test_title_or_id() {
        let url = "https://ys.learnus.org/mod/vod/view.php?id=42";
        assert_eq!(title_or_id("3강", url), "3강");
        assert_eq!(title_or_id("???", url), "untitled-42");
        assert_eq!(title_or_id("::", "https://ys.learnus.org/"), "untitled");
    }

    #[test]
    fn test_truncate_title_counts_chars() {
        assert_eq!(truncate_title("가나다라마", 3), "가나다");
        assert_eq!(truncate_title("ab", 40), "ab");
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(
            extract_id("https://ys.learnus.org/course/view.php?id=12345"),
            Some("12345".to_string())
        );
        assert_eq!(extract_id("https://ys.learnus.org/mod/vod/view.php?x=1&id=7"), Some("7".to_string()));
        assert_eq!(extract_id("https://ys.learnus.org/"), None);
    }
}
