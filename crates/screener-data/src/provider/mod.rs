//! 遠端資料來源用戶端。
//!
//! - [`finmind`]: FinMind API (需 token,搭配輪替池)
//! - [`twse`]: 台灣證券交易所公開端點
//! - [`tpex`]: 櫃買中心公開端點 (民國紀年參數)
//! - [`cnyes`]: 鉅亨網新聞 API

pub mod cnyes;
pub mod finmind;
pub mod tpex;
pub mod twse;

use rust_decimal::Decimal;

/// 交易所端點使用的瀏覽器 User-Agent,避免被來源端擋下。
pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36";

/// 將來源端的數字字串正規化為 `Decimal`。
///
/// 缺值標記 (`"--"`、`"N/A"`、空字串、單獨的 `"-"`) 一律回傳 `None`
/// 而非 0,避免污染下游彙總;千分位逗號與引號先剝除。
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned = raw.replace([',', '"'], "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty()
        || cleaned == "--"
        || cleaned == "-"
        || cleaned.eq_ignore_ascii_case("n/a")
    {
        return None;
    }
    cleaned.parse::<Decimal>().ok()
}

/// 4~6 碼數字代號才視為股票 (排除權證、指數列)。
pub(crate) fn is_listed_symbol(symbol: &str) -> bool {
    (4..=6).contains(&symbol.len()) && symbol.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_parse_decimal_missing_markers() {
        assert_eq!(parse_decimal("--"), None);
        assert_eq!(parse_decimal("N/A"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("-"), None);
        assert_eq!(parse_decimal("  "), None);
    }

    #[test]
    fn test_parse_decimal_thousands_separator() {
        assert_eq!(parse_decimal("1,234.5"), Some(Decimal::new(12345, 1)));
        assert_eq!(parse_decimal("\"2,330\""), Some(Decimal::new(2330, 0)));
    }

    #[test]
    fn test_parse_decimal_signed() {
        assert_eq!(parse_decimal("-12.3"), Some(Decimal::new(-123, 1)));
        assert_eq!(parse_decimal("0"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_is_listed_symbol() {
        assert!(is_listed_symbol("2330"));
        assert!(is_listed_symbol("00631"));
        assert!(!is_listed_symbol("233"));
        assert!(!is_listed_symbol("2330A"));
        assert!(!is_listed_symbol("加權指數"));
    }
}
