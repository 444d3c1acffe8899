use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use domain::{
    portfolio::{PageQuery, Portfolio, Stock, display_timestamp},
    view::{PortfolioDetail, PortfolioList, REGISTRATION_REDIRECT_DELAY, Session},
};
use tracing::error;

/// Renders a page, or a bare 500 when the template fails
pub fn render(template: &impl Template) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Template rendering failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Template, Default)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub email: String,
}

#[derive(Template, Default)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub error: Option<String>,
    pub notice: Option<String>,
    pub username: String,
    pub email: String,
}

impl RegisterTemplate {
    pub fn redirect_seconds(&self) -> u64 {
        REGISTRATION_REDIRECT_DELAY.as_secs()
    }
}

#[derive(Template)]
#[template(path = "confirm.html")]
pub struct ConfirmTemplate {
    pub token: String,
    pub alert: Option<String>,
}

#[derive(Template)]
#[template(path = "portfolios.html")]
pub struct PortfoliosTemplate {
    pub username: String,
    pub cards: Vec<PortfolioCard>,
    pub search_term: String,
    pub searching: bool,
    pub creating: bool,
    pub name: String,
    pub notice: Option<String>,
    pub limit: u8,
    pub sort: &'static str,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
}

impl PortfoliosTemplate {
    pub fn new(session: &Session, list: &PortfolioList) -> Self {
        Self {
            username: session.user.username.clone(),
            cards: list.displayed().iter().map(PortfolioCard::from_portfolio).collect(),
            search_term: list.search_term.clone(),
            searching: list.is_searching(),
            creating: false,
            name: String::new(),
            notice: None,
            limit: list.page.limit,
            sort: list.page.sort.as_str(),
            previous_href: list
                .page
                .previous()
                .filter(|_| !list.is_searching())
                .map(|page| page_href(&page)),
            next_href: list.has_next_page().then(|| page_href(&list.page.next())),
        }
    }
}

pub fn page_href(page: &PageQuery) -> String {
    format!(
        "/portfolios?limit={}&offset={}&sort={}",
        page.limit,
        page.offset,
        page.sort.as_str()
    )
}

#[derive(Template)]
#[template(path = "portfolio_detail.html")]
pub struct PortfolioDetailTemplate {
    pub username: String,
    pub id: i64,
    pub name: String,
    pub created: String,
    pub updated: String,
    pub stocks: Vec<StockRow>,
    pub total_cost: String,
    pub editing: bool,
    pub adding: bool,
    pub notice: Option<String>,
}

impl PortfolioDetailTemplate {
    pub fn new(session: &Session, detail: &PortfolioDetail) -> Self {
        let portfolio = &detail.portfolio;
        Self {
            username: session.user.username.clone(),
            id: portfolio.id,
            name: portfolio.name.clone(),
            created: timestamp(portfolio.created_at.as_deref()),
            updated: timestamp(portfolio.updated_at.as_deref()),
            stocks: detail.stocks.iter().map(StockRow::from_stock).collect(),
            total_cost: money(detail.total_cost()),
            editing: false,
            adding: false,
            notice: None,
        }
    }
}

// Struct for portfolio display in the list
#[derive(Clone)]
pub struct PortfolioCard {
    pub id: i64,
    pub name: String,
    pub stock_count: usize,
    pub total_cost: String,
    pub created: String,
}

impl PortfolioCard {
    pub fn from_portfolio(portfolio: &Portfolio) -> Self {
        Self {
            id: portfolio.id,
            name: portfolio.name.clone(),
            stock_count: portfolio.stocks.len(),
            total_cost: money(portfolio.total_cost()),
            created: timestamp(portfolio.created_at.as_deref()),
        }
    }
}

// Struct for holdings display in the detail screen
#[derive(Clone)]
pub struct StockRow {
    pub symbol: String,
    pub shares: String,
    pub average_price: String,
    pub cost_basis: String,
    pub updated: String,
}

impl StockRow {
    pub fn from_stock(stock: &Stock) -> Self {
        Self {
            symbol: stock.symbol.clone(),
            shares: stock.shares.to_string(),
            average_price: money(stock.average_price),
            cost_basis: money(stock.cost_basis()),
            updated: timestamp(stock.updated_at.as_deref()),
        }
    }
}

fn money(amount: f64) -> String {
    format!("{amount:.2}")
}

fn timestamp(raw: Option<&str>) -> String {
    raw.map(display_timestamp).unwrap_or_else(|| "-".to_string())
}
