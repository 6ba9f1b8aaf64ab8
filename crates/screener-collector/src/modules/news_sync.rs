//! 鉅亨網新聞同步模組。
//!
//! 每個分類抓一頁清單寫入 `news`。新聞以 `news_id` 為唯一鍵、
//! 內容不可變,重複抓取直接忽略;單一分類失敗不影響其他分類。

use sqlx::PgPool;
use tracing::{debug, info, warn};

use screener_data::provider::cnyes::{CnyesClient, NewsItem, CATEGORIES};

use crate::{Result, SyncStats};

/// 同步所有新聞分類。
pub async fn sync_news(pool: &PgPool, client: &CnyesClient, limit: usize) -> Result<SyncStats> {
    let started = std::time::Instant::now();
    let mut stats = SyncStats::new();
    info!("新聞同步開始");

    for (category_id, category_name) in CATEGORIES {
        stats.total += 1;
        match client.fetch_category(category_id, limit).await {
            Ok(items) if items.is_empty() => {
                stats.empty += 1;
            }
            Ok(items) => {
                let inserted = persist_news(pool, category_id, &items).await;
                stats.success += 1;
                stats.total_records += inserted;
                info!(
                    category = category_name,
                    fetched = items.len(),
                    new = inserted,
                    "分類同步完成"
                );
            }
            Err(e) => {
                stats.errors += 1;
                warn!(category = category_name, error = %e, "分類抓取失敗");
            }
        }
    }

    stats.elapsed = started.elapsed();
    Ok(stats)
}

/// 寫入新聞,回傳實際新增的則數 (既有的 `news_id` 不計)。
async fn persist_news(pool: &PgPool, category: &str, items: &[NewsItem]) -> usize {
    let mut inserted = 0;
    for item in items {
        let result = sqlx::query(
            r#"
            INSERT INTO news (news_id, category, title, summary, image_url, publish_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (news_id) DO NOTHING
            "#,
        )
        .bind(item.news_id)
        .bind(category)
        .bind(&item.title)
        .bind(&item.summary)
        .bind(&item.image_url)
        .bind(item.publish_at)
        .execute(pool)
        .await;
        match result {
            Ok(done) if done.rows_affected() > 0 => inserted += 1,
            Ok(_) => {}
            Err(e) => {
                debug!(news_id = item.news_id, error = %e, "news 寫入失敗");
            }
        }
    }
    inserted
}
