use std::time::Duration;

use crate::{
    portfolio::{PageQuery, Portfolio, PortfolioId, Stock},
    token::AccessToken,
    user::User,
};

/// Shown on the registration screen once the backend accepted the account
pub const REGISTRATION_NOTICE: &str =
    "Registration successful! Check your email to activate your account.";

/// Delay before the registration screen hands over to the login screen
pub const REGISTRATION_REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Screen selected by the root shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    Register,
    Portfolios,
    PortfolioDetail(PortfolioId),
}

impl View {
    /// Screen shown when nothing in particular was asked for
    #[must_use]
    pub fn landing(signed_in: bool) -> Self {
        if signed_in {
            View::Portfolios
        } else {
            View::Login
        }
    }

    /// Screen actually shown for `requested`
    ///
    /// Anonymous users only ever see the login and registration screens, and a
    /// signed-in user has no use for them.
    #[must_use]
    pub fn resolve(requested: View, signed_in: bool) -> Self {
        match (requested, signed_in) {
            (view, false) if view.requires_session() => View::Login,
            (View::Login | View::Register, true) => View::Portfolios,
            (view, _) => view,
        }
    }

    #[must_use]
    pub fn requires_session(self) -> bool {
        matches!(self, View::Portfolios | View::PortfolioDetail(_))
    }

    #[must_use]
    pub fn path(self) -> String {
        match self {
            View::Login => "/login".to_string(),
            View::Register => "/register".to_string(),
            View::Portfolios => "/portfolios".to_string(),
            View::PortfolioDetail(id) => format!("/portfolios/{id}"),
        }
    }
}

/// Signed-in state: the bearer token and the account it belongs to
#[derive(Debug, Clone)]
pub struct Session {
    pub token: AccessToken,
    pub user: User,
}

/// State of the portfolio list screen
#[derive(Debug, Clone, Default)]
pub struct PortfolioList {
    pub portfolios: Vec<Portfolio>,
    pub page: PageQuery,
    pub search_term: String,
    pub search_results: Vec<Portfolio>,
}

impl PortfolioList {
    #[must_use]
    pub fn new(portfolios: Vec<Portfolio>, page: PageQuery) -> Self {
        Self {
            portfolios,
            page,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_searching(&self) -> bool {
        !self.search_term.is_empty()
    }

    /// Search results while a search term is set, the full list otherwise
    #[must_use]
    pub fn displayed(&self) -> &[Portfolio] {
        if self.is_searching() {
            &self.search_results
        } else {
            &self.portfolios
        }
    }

    pub fn clear_search(&mut self) {
        self.search_term.clear();
        self.search_results.clear();
    }

    /// Whether the backend may hold more portfolios past this page
    #[must_use]
    pub fn has_next_page(&self) -> bool {
        !self.is_searching() && self.portfolios.len() >= usize::from(self.page.limit)
    }
}

/// State of the portfolio detail screen
///
/// The holdings are tracked apart from `portfolio` so that local edits survive
/// a rename, whose response may not carry the stocks.
#[derive(Debug, Clone)]
pub struct PortfolioDetail {
    pub portfolio: Portfolio,
    pub stocks: Vec<Stock>,
}

impl PortfolioDetail {
    #[must_use]
    pub fn new(portfolio: Portfolio) -> Self {
        let stocks = portfolio.stocks.clone();
        Self { portfolio, stocks }
    }

    #[must_use]
    pub fn id(&self) -> PortfolioId {
        self.portfolio.id
    }

    /// Takes the renamed record, keeping the displayed holdings
    pub fn apply_update(&mut self, updated: Portfolio) {
        self.portfolio = updated;
        self.portfolio.stocks = self.stocks.clone();
    }

    pub fn push_stock(&mut self, stock: Stock) {
        self.stocks.push(stock.clone());
        self.portfolio.stocks.push(stock);
    }

    pub fn replace_stock(&mut self, updated: Stock) {
        for list in [&mut self.stocks, &mut self.portfolio.stocks] {
            if let Some(stock) = list.iter_mut().find(|stock| stock.symbol == updated.symbol) {
                *stock = updated.clone();
            }
        }
    }

    pub fn remove_stock(&mut self, symbol: &str) {
        self.stocks.retain(|stock| stock.symbol != symbol);
        self.portfolio.stocks.retain(|stock| stock.symbol != symbol);
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.stocks.iter().map(Stock::cost_basis).sum()
    }
}
