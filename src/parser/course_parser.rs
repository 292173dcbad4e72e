use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::errors::ParseError;
use super::models::{DiscoveredItem, ItemKind, ScanCounts, ScanSummary};
use super::parser_trait::ContentScanner;
use crate::common::client::fetcher::{FetchOutcome, PageFetcher};
use crate::common::utils::{extract_id, sanitize_filename};

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("静态选择器");
    static ref SECTION: Selector = Selector::parse("li.section").expect("静态选择器");
    static ref SECTION_NAME: Selector = Selector::parse("h3.sectionname").expect("静态选择器");
    static ref ACTIVITY: Selector = Selector::parse("li.activity").expect("静态选择器");
    static ref INSTANCE_LINK: Selector =
        Selector::parse("div.activityinstance a").expect("静态选择器");
    static ref INSTANCE_NAME: Selector =
        Selector::parse("span.instancename").expect("静态选择器");
}

/// 要扫描的课程
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseTarget {
    pub url: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub kind: ItemKind,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub activities: Vec<Activity>,
}

/// 课程主页的解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoursePage {
    pub name: Option<String>,
    pub sections: Vec<Section>,
}

impl CoursePage {
    /// `base` 用于把相对链接补全为绝对地址
    pub fn parse(html: &str, base: Option<&Url>) -> Self {
        let document = Html::parse_document(html);

        let name = document
            .select(&TITLE)
            .next()
            .map(|t| t.text().collect::<String>())
            .map(|t| {
                let t = t.trim();
                t.strip_prefix("강좌:")
                    .or_else(|| t.strip_prefix("Course:"))
                    .unwrap_or(t)
                    .trim()
                    .to_string()
            })
            .filter(|t| !t.is_empty());

        let mut sections = Vec::new();
        for section in document.select(&SECTION) {
            let Some(section_name) = section
                .select(&SECTION_NAME)
                .next()
                .map(|h| h.text().collect::<String>().trim().to_string())
            else {
                continue;
            };

            let activities: Vec<Activity> = section
                .select(&ACTIVITY)
                .filter_map(|item| parse_activity(item, base))
                .collect();
            if !activities.is_empty() {
                sections.push(Section {
                    name: section_name,
                    activities,
                });
            }
        }

        Self { name, sections }
    }
}

fn parse_activity(item: ElementRef<'_>, base: Option<&Url>) -> Option<Activity> {
    let classes: Vec<&str> = item.value().classes().collect();
    let kind = if classes.contains(&"modtype_ubfile") {
        ItemKind::File
    } else if classes.contains(&"modtype_vod") {
        ItemKind::Vod
    } else if classes.contains(&"modtype_assign") {
        ItemKind::Assignment
    } else {
        return None;
    };

    let link = item.select(&INSTANCE_LINK).next()?;
    let href = link.value().attr("href")?.trim();
    let url = match base {
        Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    };

    let name = item
        .select(&INSTANCE_NAME)
        .next()
        .map(instance_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    Some(Activity { kind, name, url })
}

// 跳过屏幕阅读器用的 accesshide 文本（如 "동영상"）
fn instance_name(span: ElementRef<'_>) -> String {
    let mut name = String::new();
    for child in span.children() {
        if let Some(text) = child.value().as_text() {
            name.push_str(text);
        } else if let Some(el) = ElementRef::wrap(child) {
            let hidden =
                el.value().name() == "span" && el.value().classes().any(|c| c == "accesshide");
            if !hidden {
                name.extend(el.text());
            }
        }
    }
    name.trim().to_string()
}

/// 通过页面客户端逐个扫描课程
pub struct CourseScanner {
    fetcher: Arc<dyn PageFetcher>,
    courses: Vec<CourseTarget>,
    archive_root: PathBuf,
}

impl CourseScanner {
    pub fn new(fetcher: Arc<dyn PageFetcher>, courses: Vec<CourseTarget>, archive_root: PathBuf) -> Self {
        Self {
            fetcher,
            courses,
            archive_root,
        }
    }
}

#[async_trait]
impl ContentScanner for CourseScanner {
    async fn scan(&self, items: UnboundedSender<DiscoveredItem>) -> Result<ScanSummary, ParseError> {
        let mut counts = ScanCounts::default();
        let mut sources = 0;

        for (idx, course) in self.courses.iter().enumerate() {
            info!("扫描课程 {}/{}: {}", idx + 1, self.courses.len(), course.url);

            let html = match self.fetcher.fetch(&course.url, None).await {
                Ok(FetchOutcome::Content(html)) => html,
                Ok(FetchOutcome::SessionLost { final_url }) => {
                    return Err(ParseError::SessionLost(format!(
                        "课程页面被重定向到登录页: {}",
                        final_url
                    )));
                }
                Err(e) => {
                    warn!("课程页面获取失败，跳过 {}: {}", course.url, e);
                    continue;
                }
            };

            let base = Url::parse(&course.url).ok();
            let page = CoursePage::parse(&html, base.as_ref());
            let course_name = course
                .name
                .clone()
                .or(page.name)
                .unwrap_or_else(|| format!("course-{}", extract_id(&course.url).unwrap_or_default()));
            let course_dir = self.archive_root.join(sanitize_filename(&course_name));
            tokio::fs::create_dir_all(&course_dir).await?;
            sources += 1;

            for section in page.sections {
                let section_dir = course_dir.join(sanitize_filename(&section.name));
                tokio::fs::create_dir_all(&section_dir).await?;

                for activity in section.activities {
                    counts.record(activity.kind);
                    debug!("发现 {:?}: {}", activity.kind, activity.name);
                    let item = DiscoveredItem {
                        kind: activity.kind,
                        title: activity.name,
                        url: activity.url,
                        folder: section_dir.clone(),
                        referer: Some(course.url.clone()),
                    };
                    if items.send(item).is_err() {
                        warn!("接收端已关闭，停止扫描");
                        return Ok(ScanSummary { sources, counts });
                    }
                }
            }
        }

        Ok(ScanSummary { sources, counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COURSE_HTML: &str = r#"
        <html><head><title>강좌: 2025_20_CSI2100 자료구조</title></head>
        <body><ul class="weeks">
          <li class="section main">
            <h3 class="sectionname">1주차 [9월01일 - 9월07일]</h3>
            <ul class="section img-text">
              <li class="activity vod modtype_vod">
                <div class="activityinstance">
                  <a href="https://ys.learnus.org/mod/vod/view.php?id=101">
                    <span class="instancename">오리엔테이션<span class="accesshide "> 동영상</span></span>
                  </a>
                </div>
              </li>
              <li class="activity ubfile modtype_ubfile">
                <div class="activityinstance">
                  <a href="/mod/ubfile/view.php?id=102"><span class="instancename">강의자료.pdf</span></a>
                </div>
              </li>
              <li class="activity label modtype_label"><div>공지</div></li>
            </ul>
          </li>
          <li class="section main">
            <h3 class="sectionname">2주차</h3>
            <ul class="section img-text"></ul>
          </li>
          <li class="section main">
            <h3 class="sectionname">3주차</h3>
            <ul class="section img-text">
              <li class="activity assign modtype_assign">
                <div class="activityinstance">
                  <a href="https://ys.learnus.org/mod/assign/view.php?id=103"><span class="instancename">과제 1</span></a>
                </div>
              </li>
            </ul>
          </li>
        </ul></body></html>
    "#;

    #[test]
    fn test_parse_course_page() {
        let base = Url::parse("https://ys.learnus.org/course/view.php?id=9").unwrap();
        let page = CoursePage::parse(COURSE_HTML, Some(&base));

        assert_eq!(page.name.as_deref(), Some("2025_20_CSI2100 자료구조"));
        assert_eq!(page.sections.len(), 2);

        let week1 = &page.sections[0];
        assert_eq!(week1.name, "1주차 [9월01일 - 9월07일]");
        assert_eq!(
            week1.activities,
            vec![
                Activity {
                    kind: ItemKind::Vod,
                    name: "오리엔테이션".to_string(),
                    url: "https://ys.learnus.org/mod/vod/view.php?id=101".to_string(),
                },
                Activity {
                    kind: ItemKind::File,
                    name: "강의자료.pdf".to_string(),
                    url: "https://ys.learnus.org/mod/ubfile/view.php?id=102".to_string(),
                },
            ]
        );
        assert_eq!(page.sections[1].activities[0].kind, ItemKind::Assignment);
    }

    #[test]
    fn test_parse_empty_page() {
        let page = CoursePage::parse("<html><body></body></html>", None);
        assert_eq!(page.name, None);
        assert!(page.sections.is_empty());
    }
}
