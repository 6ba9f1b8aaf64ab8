//! FinMind 資料集定義。

use std::fmt;

/// FinMind 資料集 (封閉列舉)。
///
/// 每個資料集對應一張固定的資料表與固定的 upsert 語句;
/// 資料表與欄位名稱不由外部輸入拼接。列舉值同時作為
/// 進度表 (`fm_sync_progress.dataset`) 的鍵。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// 台股總覽 (全量)
    StockInfo,
    /// 交易日曆 (全量)
    TradingDate,
    /// 整體三大法人買賣金額 (全量)
    TotalInstitutional,
    /// 整體融資融券餘額 (全量)
    TotalMargin,
    /// 個股日成交價量
    Price,
    /// 個股本益比/淨值比/殖利率
    Per,
    /// 月營收
    MonthRevenue,
    /// 綜合損益表
    FinancialStatements,
    /// 資產負債表
    BalanceSheet,
    /// 現金流量表
    CashFlows,
    /// 股利政策
    Dividend,
    /// 個股三大法人買賣超
    Institutional,
    /// 個股融資融券
    MarginTrading,
    /// 個股新聞
    News,
}

impl Dataset {
    /// FinMind API 的資料集名稱。
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::StockInfo => "TaiwanStockInfo",
            Self::TradingDate => "TaiwanStockTradingDate",
            Self::TotalInstitutional => "TaiwanStockTotalInstitutionalInvestors",
            Self::TotalMargin => "TaiwanStockTotalMarginPurchaseShortSale",
            Self::Price => "TaiwanStockPrice",
            Self::Per => "TaiwanStockPER",
            Self::MonthRevenue => "TaiwanStockMonthRevenue",
            Self::FinancialStatements => "TaiwanStockFinancialStatements",
            Self::BalanceSheet => "TaiwanStockBalanceSheet",
            Self::CashFlows => "TaiwanStockCashFlowsStatement",
            Self::Dividend => "TaiwanStockDividend",
            Self::Institutional => "TaiwanStockInstitutionalInvestorsBuySell",
            Self::MarginTrading => "TaiwanStockMarginPurchaseShortSale",
            Self::News => "TaiwanStockNews",
        }
    }

    /// 是否需要逐股帶入 `data_id`。
    pub fn per_stock(&self) -> bool {
        !matches!(
            self,
            Self::StockInfo | Self::TradingDate | Self::TotalInstitutional | Self::TotalMargin
        )
    }

    /// 全量資料集的同步順序。總覽必須先行,逐股階段的選股依賴
    /// `stocks` 資料表的內容。
    pub const MARKET_ORDER: [Dataset; 4] = [
        Dataset::StockInfo,
        Dataset::TradingDate,
        Dataset::TotalInstitutional,
        Dataset::TotalMargin,
    ];

    /// 逐股資料集的固定優先順序。
    pub const PER_STOCK_ORDER: [Dataset; 10] = [
        Dataset::MonthRevenue,
        Dataset::FinancialStatements,
        Dataset::BalanceSheet,
        Dataset::CashFlows,
        Dataset::Dividend,
        Dataset::Per,
        Dataset::Price,
        Dataset::Institutional,
        Dataset::MarginTrading,
        Dataset::News,
    ];
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_names() {
        assert_eq!(Dataset::MonthRevenue.api_name(), "TaiwanStockMonthRevenue");
        assert_eq!(Dataset::Price.api_name(), "TaiwanStockPrice");
        assert_eq!(
            Dataset::Institutional.api_name(),
            "TaiwanStockInstitutionalInvestorsBuySell"
        );
    }

    #[test]
    fn test_per_stock_flags() {
        assert!(!Dataset::StockInfo.per_stock());
        assert!(!Dataset::TotalMargin.per_stock());
        assert!(Dataset::MonthRevenue.per_stock());
        assert!(Dataset::News.per_stock());
    }

    #[test]
    fn test_per_stock_order_is_fixed() {
        // 月營收 → 財報 → ... 的優先順序是對外承諾的一部分
        assert_eq!(Dataset::PER_STOCK_ORDER[0], Dataset::MonthRevenue);
        assert_eq!(Dataset::PER_STOCK_ORDER[1], Dataset::FinancialStatements);
        assert_eq!(Dataset::PER_STOCK_ORDER[4], Dataset::Dividend);
        assert!(Dataset::PER_STOCK_ORDER.iter().all(Dataset::per_stock));
    }
}
