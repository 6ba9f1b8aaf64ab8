//! 鉅亨網 (cnyes) 新聞 API。
//!
//! 無需認證。每個分類一次抓一頁清單,存摘要與封面圖連結;
//! 全文爬取不在範圍內。

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::BROWSER_USER_AGENT;
use crate::error::{DataError, Result};

const BASE_URL: &str = "https://api.cnyes.com";

/// 新聞分類 (API 代號, 顯示名稱)。
pub const CATEGORIES: [(&str, &str); 5] = [
    ("headline", "熱門頭條"),
    ("tw_stock", "台股新聞"),
    ("us_stock", "美股雷達"),
    ("tech", "科技產業"),
    ("intl_macro", "全球時事"),
];

/// 一則新聞。
#[derive(Debug, Clone)]
pub struct NewsItem {
    pub news_id: i64,
    pub title: String,
    pub summary: String,
    pub image_url: String,
    pub publish_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct NewsListResponse {
    items: NewsListItems,
}

#[derive(Debug, Deserialize)]
struct NewsListItems {
    #[serde(default)]
    data: Vec<RawNewsItem>,
}

#[derive(Debug, Deserialize)]
struct RawNewsItem {
    #[serde(rename = "newsId")]
    news_id: i64,
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(rename = "publishAt")]
    publish_at: i64,
    #[serde(rename = "coverSrc", default)]
    cover_src: Option<Value>,
}

impl RawNewsItem {
    /// 封面圖:依 xs → s → m 的順序取第一個存在的尺寸。
    fn image_url(&self) -> String {
        let Some(cover) = &self.cover_src else {
            return String::new();
        };
        ["xs", "s", "m"]
            .iter()
            .find_map(|size| {
                cover
                    .get(size)
                    .and_then(|v| v.get("src"))
                    .and_then(Value::as_str)
            })
            .unwrap_or_default()
            .to_string()
    }
}

/// 鉅亨網新聞用戶端。
#[derive(Clone)]
pub struct CnyesClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for CnyesClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CnyesClient {
    /// 建立用戶端。
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(BROWSER_USER_AGENT)
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("HTTP 用戶端建立失敗"),
            base_url: BASE_URL.to_string(),
        }
    }

    /// 指定端點位址 (測試用)。
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 抓取單一分類的新聞清單。
    pub async fn fetch_category(&self, category: &str, limit: usize) -> Result<Vec<NewsItem>> {
        let url = format!(
            "{}/media/api/v1/newslist/category/{}?limit={}",
            self.base_url, category, limit
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: NewsListResponse = response.json().await?;
        let items = body
            .items
            .data
            .into_iter()
            .filter_map(|raw| {
                let publish_at = Utc.timestamp_opt(raw.publish_at, 0).single()?;
                Some(NewsItem {
                    news_id: raw.news_id,
                    image_url: raw.image_url(),
                    title: raw.title,
                    summary: raw.summary,
                    publish_at,
                })
            })
            .collect();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_news_item_cover_fallback() {
        let raw: RawNewsItem = serde_json::from_value(json!({
            "newsId": 5432100,
            "title": "台積電法說會",
            "publishAt": 1708300800,
            "coverSrc": {"s": {"src": "https://img/s.jpg"}, "m": {"src": "https://img/m.jpg"}}
        }))
        .unwrap();
        // 沒有 xs 時退到 s
        assert_eq!(raw.image_url(), "https://img/s.jpg");
        assert_eq!(raw.summary, "");
    }

    #[test]
    fn test_raw_news_item_without_cover() {
        let raw: RawNewsItem = serde_json::from_value(json!({
            "newsId": 1,
            "title": "t",
            "publishAt": 1708300800
        }))
        .unwrap();
        assert_eq!(raw.image_url(), "");
    }
}
