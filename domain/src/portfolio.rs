use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::user::UserId;

pub type PortfolioId = i64;
pub type StockId = i64;

/// Maximum number of portfolios the backend returns per page
pub const MAX_PAGE_SIZE: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub symbol: String,
    pub shares: f64,
    pub average_price: f64,
    pub portfolio_id: PortfolioId,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Stock {
    /// Amount paid for the whole position
    #[must_use]
    pub fn cost_basis(&self) -> f64 {
        self.shares * self.average_price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub stocks: Vec<Stock>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Portfolio {
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.stocks.iter().map(Stock::cost_basis).sum()
    }
}

// The backend encodes an empty holdings list as `null`
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `POST /portfolios`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewPortfolio {
    #[validate(length(min = 1, max = 50, message = "Portfolio name must be 1 to 50 characters"))]
    pub name: String,
    pub stocks: Vec<NewStock>,
}

impl NewPortfolio {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stocks: Vec::new(),
        }
    }
}

/// Body of `PATCH /portfolios/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PortfolioUpdate {
    #[validate(length(min = 1, max = 50, message = "Portfolio name must be 1 to 50 characters"))]
    pub name: String,
}

/// Body of `POST /portfolios/{id}/stocks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewStock {
    #[validate(length(min = 1, max = 4, message = "Symbol must be 1 to 4 characters"))]
    pub symbol: String,
    #[validate(range(min = 0.01, message = "Shares must be at least 0.01"))]
    pub shares: f64,
    #[validate(range(min = 0.01, message = "Average price must be at least 0.01"))]
    pub average_price: f64,
}

/// Body of `PUT /portfolios/{id}/stocks/{symbol}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StockUpdate {
    #[validate(range(min = 0.01, message = "Shares must be at least 0.01"))]
    pub shares: f64,
    #[validate(range(min = 0.01, message = "Average price must be at least 0.01"))]
    pub average_price: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Paging parameters of `GET /portfolios`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PageQuery {
    #[validate(range(min = 1, max = 5, message = "Page size must be between 1 and 5"))]
    pub limit: u8,
    pub offset: u32,
    pub sort: SortOrder,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            limit: MAX_PAGE_SIZE,
            offset: 0,
            sort: SortOrder::Desc,
        }
    }
}

impl PageQuery {
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset.saturating_add(u32::from(self.limit)),
            ..*self
        }
    }

    /// Previous page, or `None` on the first one
    #[must_use]
    pub fn previous(&self) -> Option<Self> {
        (self.offset > 0).then(|| Self {
            offset: self.offset.saturating_sub(u32::from(self.limit)),
            ..*self
        })
    }
}

/// Renders a backend timestamp as `YYYY-MM-DD HH:MM`, verbatim if it is not RFC 3339
#[must_use]
pub fn display_timestamp(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_stocks_read_as_empty() {
        let portfolio: Portfolio =
            serde_json::from_str(r#"{"id": 1, "user_id": 2, "name": "Tech", "stocks": null}"#)
                .unwrap();
        assert!(portfolio.stocks.is_empty());

        let portfolio: Portfolio =
            serde_json::from_str(r#"{"id": 1, "user_id": 2, "name": "Tech"}"#).unwrap();
        assert!(portfolio.stocks.is_empty());
    }

    #[test]
    fn new_portfolio_body_carries_empty_stock_list() {
        let body = serde_json::to_value(NewPortfolio::named("Growth")).unwrap();
        assert_eq!(body, serde_json::json!({"name": "Growth", "stocks": []}));
    }

    #[test]
    fn paging_moves_by_limit() {
        let first = PageQuery::default();
        assert!(first.previous().is_none());

        let second = first.next();
        assert_eq!(second.offset, 5);
        assert_eq!(second.previous(), Some(first));
    }

    #[test]
    fn page_limit_is_bounded() {
        let mut page = PageQuery::default();
        assert!(page.validate().is_ok());
        page.limit = 0;
        assert!(page.validate().is_err());
        page.limit = 6;
        assert!(page.validate().is_err());
    }

    #[test]
    fn cost_basis_sums_positions() {
        let stock = |symbol: &str, shares, average_price| Stock {
            id: 0,
            symbol: symbol.into(),
            shares,
            average_price,
            portfolio_id: 1,
            created_at: None,
            updated_at: None,
        };
        let portfolio = Portfolio {
            id: 1,
            user_id: 1,
            name: "Mixed".into(),
            stocks: vec![stock("AAPL", 2.0, 100.0), stock("MSFT", 0.5, 300.0)],
            created_at: None,
            updated_at: None,
        };
        assert!((portfolio.total_cost() - 350.0).abs() < f64::EPSILON);
    }

    #[test]
    fn timestamps_render_when_parsable() {
        assert_eq!(display_timestamp("2024-03-01T10:15:00Z"), "2024-03-01 10:15");
        assert_eq!(display_timestamp("yesterday"), "yesterday");
    }
}
