use async_trait::async_trait;

use crate::{
    portfolio::{
        NewPortfolio, NewStock, PageQuery, Portfolio, PortfolioId, PortfolioUpdate, Stock,
        StockUpdate,
    },
    token::AccessToken,
    user::{Credentials, Registration, User, UserId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered with a non-success status
    Rejected { status: u16, message: Option<String> },
    /// The request never got an answer
    Network(String),
    /// The answer could not be read
    Decode(String),
}

impl BackendError {
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        BackendError::Rejected {
            status,
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Rejected { status: 401, .. })
    }

    /// Error text sent by the backend, if any
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            BackendError::Rejected { message, .. } => message.as_deref(),
            BackendError::Network(_) | BackendError::Decode(_) => None,
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Rejected {
                status,
                message: Some(message),
            } => write!(f, "Backend rejected the request ({status}): {message}"),
            BackendError::Rejected {
                status,
                message: None,
            } => write!(f, "Backend rejected the request ({status})"),
            BackendError::Network(msg) => write!(f, "Backend unreachable: {msg}"),
            BackendError::Decode(msg) => write!(f, "Unreadable backend response: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Port to the portfolio service.
///
/// Every call maps to exactly one HTTP request of the backend API; the methods
/// taking an `AccessToken` send it as a bearer credential.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /authentication/token`
    /// # Errors
    /// - `BackendError::Rejected` for unknown or inactive accounts and bad passwords
    async fn create_token(&self, credentials: &Credentials) -> Result<AccessToken, BackendError>;

    /// `POST /authentication/user`
    /// # Errors
    /// - `BackendError::Rejected` when the account data is refused
    async fn register_user(&self, registration: &Registration) -> Result<(), BackendError>;

    /// `PUT /users/activate/{token}`
    /// # Errors
    /// - `BackendError::Rejected` for unknown activation tokens
    async fn activate_user(&self, activation_token: &str) -> Result<(), BackendError>;

    /// `GET /users/{id}`
    /// # Errors
    /// - `BackendError::Rejected` when the token is no longer accepted
    async fn get_user(&self, token: &AccessToken, user_id: UserId) -> Result<User, BackendError>;

    /// `GET /portfolios`
    /// # Errors
    /// - `BackendError` if the request fails
    async fn list_portfolios(
        &self,
        token: &AccessToken,
        page: &PageQuery,
    ) -> Result<Vec<Portfolio>, BackendError>;

    /// `GET /portfolios/search?name=`
    /// # Errors
    /// - `BackendError` if the request fails
    async fn search_portfolios(
        &self,
        token: &AccessToken,
        name: &str,
    ) -> Result<Vec<Portfolio>, BackendError>;

    /// `GET /portfolios/{id}`
    /// # Errors
    /// - `BackendError::Rejected` when the portfolio does not exist or is not owned by the user
    async fn get_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
    ) -> Result<Portfolio, BackendError>;

    /// `POST /portfolios`
    /// # Errors
    /// - `BackendError` if the request fails
    async fn create_portfolio(
        &self,
        token: &AccessToken,
        portfolio: &NewPortfolio,
    ) -> Result<Portfolio, BackendError>;

    /// `PATCH /portfolios/{id}`
    /// # Errors
    /// - `BackendError` if the request fails
    async fn update_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        update: &PortfolioUpdate,
    ) -> Result<Portfolio, BackendError>;

    /// `DELETE /portfolios/{id}`
    /// # Errors
    /// - `BackendError` if the request fails
    async fn delete_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
    ) -> Result<(), BackendError>;

    /// `POST /portfolios/{id}/stocks`
    /// # Errors
    /// - `BackendError` if the request fails
    async fn add_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        stock: &NewStock,
    ) -> Result<Stock, BackendError>;

    /// `PUT /portfolios/{id}/stocks/{symbol}`
    /// # Errors
    /// - `BackendError` if the request fails
    async fn update_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        symbol: &str,
        update: &StockUpdate,
    ) -> Result<Stock, BackendError>;

    /// `DELETE /portfolios/{id}/stocks/{symbol}`
    /// # Errors
    /// - `BackendError` if the request fails
    async fn delete_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        symbol: &str,
    ) -> Result<(), BackendError>;
}
