//! FinMindClient 的結果分類、token 輪替與冷卻重試整合測試。

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use screener_data::{Dataset, DatasetRequest, FetchOutcome, FinMindClient, TokenPool};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn client_with(tokens: &[&str], base_url: &str) -> (FinMindClient, Arc<TokenPool>) {
    let pool = Arc::new(TokenPool::new(
        tokens.iter().map(|t| t.to_string()).collect(),
    ));
    let client = FinMindClient::new(Arc::clone(&pool))
        .with_base_url(base_url.to_string())
        .with_cooldown(Duration::from_millis(20));
    (client, pool)
}

fn revenue_request() -> DatasetRequest<'static> {
    DatasetRequest::per_stock(Dataset::MonthRevenue, "2330", None)
}

const BODY: &str = r#"{"msg":"success","status":200,"data":[
    {"date":"2021-01-10","stock_id":"2330","revenue":205188000000,"revenue_month":1,"revenue_year":2021},
    {"date":"2021-02-10","stock_id":"2330","revenue":106534000000,"revenue_month":2,"revenue_year":2021}
]}"#;

#[tokio::test]
async fn test_fetch_classifies_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("dataset".into(), "TaiwanStockMonthRevenue".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(BODY)
        .create_async()
        .await;

    let (client, _) = client_with(&["t0"], &server.url());
    match client.fetch(&revenue_request()).await {
        FetchOutcome::Success(rows) => assert_eq!(rows.len(), 2),
        other => panic!("expected Success, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_classifies_empty() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"msg":"success","status":200,"data":[]}"#)
        .create_async()
        .await;

    let (client, _) = client_with(&["t0"], &server.url());
    assert!(matches!(
        client.fetch(&revenue_request()).await,
        FetchOutcome::Empty
    ));
}

#[tokio::test]
async fn test_fetch_transient_error_does_not_rotate() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let (client, pool) = client_with(&["t0", "t1"], &server.url());
    assert!(matches!(
        client.fetch(&revenue_request()).await,
        FetchOutcome::TransientError(_)
    ));
    // 暫時性錯誤不觸發輪替
    assert_eq!(pool.current_index(), 0);
    assert_eq!(pool.available(), 2);
}

/// 規格情境:token #1、#2 回 402,#3 回成功。單次 `fetch` 透明地
/// 輪替兩次並回傳成功結果,不向呼叫端暴露中間的失敗。
#[tokio::test]
async fn test_fetch_rotates_through_exhausted_tokens() {
    let mut server = mockito::Server::new_async().await;
    let quota_t0 = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "t0".into()))
        .with_status(402)
        .create_async()
        .await;
    let quota_t1 = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "t1".into()))
        .with_status(402)
        .create_async()
        .await;
    let ok_t2 = server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "t2".into()))
        .with_status(200)
        .with_body(BODY)
        .create_async()
        .await;

    let (client, pool) = client_with(&["t0", "t1", "t2"], &server.url());
    match client.fetch(&revenue_request()).await {
        FetchOutcome::Success(rows) => assert_eq!(rows.len(), 2),
        other => panic!("expected Success, got {:?}", other),
    }
    quota_t0.assert_async().await;
    quota_t1.assert_async().await;
    ok_t2.assert_async().await;
    assert_eq!(pool.current_index(), 2);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn test_fetch_rotates_on_rate_limit() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "t0".into()))
        .with_status(429)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("token".into(), "t1".into()))
        .with_status(200)
        .with_body(BODY)
        .create_async()
        .await;

    let (client, pool) = client_with(&["t0", "t1"], &server.url());
    assert!(matches!(
        client.fetch(&revenue_request()).await,
        FetchOutcome::Success(_)
    ));
    assert_eq!(pool.current_index(), 1);
}

/// 依序回應固定指令碼的極簡 HTTP 伺服器。mockito 無法表達
/// 「同一路徑先 402 後 200」的時序,改以逐連線指令碼驗證
/// 冷卻重置路徑。
async fn scripted_server(responses: Vec<(u16, &'static str)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let mut buf = vec![0u8; 8192];
            let mut filled = 0;
            loop {
                match socket.read(&mut buf[filled..]).await {
                    Ok(0) => break,
                    Ok(n) => {
                        filled += n;
                        if buf[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    Err(_) => return,
                }
            }
            let response = format!(
                "HTTP/1.1 {} MOCK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });
    format!("http://{}", addr)
}

/// 規格情境:整池耗盡 → 冷卻等待 → 重置 → 重試成功。
/// 指令碼只有三個回應,若發生第二輪冷卻重置會連不上而失敗,
/// 等價於「恰好一次重置」的斷言。
#[tokio::test]
async fn test_full_exhaustion_recovers_after_cooldown_reset() {
    let url = scripted_server(vec![(402, ""), (402, ""), (200, BODY)]).await;
    let (client, pool) = client_with(&["t0", "t1"], &url);

    match client.fetch(&revenue_request()).await {
        FetchOutcome::Success(rows) => assert_eq!(rows.len(), 2),
        other => panic!("expected Success after reset, got {:?}", other),
    }
    // 重置後耗盡標記全數清除,成功的那次呼叫不再標記任何 token
    assert_eq!(pool.available(), 2);
}

/// 冷卻重置後仍受限時,單次呼叫不再進入第二輪冷卻,
/// 把限額狀況交還呼叫端 (有界重試)。
#[tokio::test]
async fn test_fetch_gives_up_after_single_cooldown_cycle() {
    let url = scripted_server(vec![(402, ""), (402, "")]).await;
    let (client, _) = client_with(&["only"], &url);

    assert!(matches!(
        client.fetch(&revenue_request()).await,
        FetchOutcome::QuotaExhausted
    ));
}

/// 無 token 的匿名呼叫:429 時沒有可輪替的對象,
/// 走冷卻重置一次後回傳限額狀況。
#[tokio::test]
async fn test_unauthenticated_rate_limit_cooldown() {
    let url = scripted_server(vec![(429, ""), (429, "")]).await;
    let (client, pool) = client_with(&[], &url);
    assert!(pool.is_empty());

    assert!(matches!(
        client.fetch(&revenue_request()).await,
        FetchOutcome::RateLimited
    ));
}
