use std::sync::Arc;

use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::{
    backend::{Backend, BackendError},
    forms::{FormError, HoldingForm, LoginForm, PortfolioForm, RegisterForm, StockForm},
    portfolio::{NewPortfolio, PageQuery, PortfolioId, PortfolioUpdate},
    token::{AccessToken, TokenError},
    view::{PortfolioDetail, PortfolioList, Session, View},
};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const LOGIN_FAILED: &str = "Login failed. Please try again.";
pub const REGISTRATION_FAILED: &str = "Registration failed";
pub const ACTIVATION_FAILED: &str = "Failed to confirm token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    Form(FormError),
    Backend(BackendError),
    Token(TokenError),
}

impl ClientError {
    /// Whether the stored token can no longer be used
    #[must_use]
    pub fn ends_session(&self) -> bool {
        match self {
            ClientError::Token(_) => true,
            ClientError::Backend(e) => e.is_unauthorized(),
            ClientError::Form(_) => false,
        }
    }

    /// Message for the form that triggered the action, `fallback` when the backend gave none
    #[must_use]
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Form(e) => e.to_string(),
            ClientError::Backend(e) => e.message().unwrap_or(fallback).to_string(),
            ClientError::Token(_) => fallback.to_string(),
        }
    }

    /// Message for the login screen
    #[must_use]
    pub fn login_message(&self) -> String {
        match self {
            ClientError::Backend(BackendError::Rejected { message, .. }) => message
                .clone()
                .unwrap_or_else(|| INVALID_CREDENTIALS.to_string()),
            ClientError::Form(e) => e.to_string(),
            ClientError::Backend(_) | ClientError::Token(_) => LOGIN_FAILED.to_string(),
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Form(e) => write!(f, "Invalid input: {e}"),
            ClientError::Backend(e) => write!(f, "{e}"),
            ClientError::Token(e) => write!(f, "Unusable session token: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<FormError> for ClientError {
    fn from(error: FormError) -> Self {
        ClientError::Form(error)
    }
}

impl From<BackendError> for ClientError {
    fn from(error: BackendError) -> Self {
        ClientError::Backend(error)
    }
}

impl From<TokenError> for ClientError {
    fn from(error: TokenError) -> Self {
        ClientError::Token(error)
    }
}

/// Every action the screens can trigger, run against a `Backend`
///
/// Operations that return `Ok(false)` were skipped because their form was
/// incomplete; no request was sent in that case.
#[derive(Clone)]
pub struct Forseer {
    backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for Forseer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forseer").finish_non_exhaustive()
    }
}

impl Forseer {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Exchanges credentials for a token, then loads the account it belongs to.
    /// # Errors
    /// - `ClientError::Backend` when the credentials are refused or the backend is down
    /// - `ClientError::Token` when the issued token cannot be read
    pub async fn login(&self, form: &LoginForm) -> Result<Session, ClientError> {
        info!("Login attempt for email: {}", form.email);
        let token = self
            .backend
            .create_token(&form.credentials())
            .await
            .inspect_err(|e| warn!("Login refused for email: {}, error: {e}", form.email))?;
        self.restore_session(token).await
    }

    /// Rebuilds the signed-in state from a stored token.
    /// # Errors
    /// - `ClientError::Token` when the token is expired or unreadable, without contacting the backend
    /// - `ClientError::Backend` when the backend no longer accepts it
    pub async fn restore_session(&self, token: AccessToken) -> Result<Session, ClientError> {
        let user_id = token.subject()?;
        let user = self.backend.get_user(&token, user_id).await?;
        debug!("Session restored for user {} ({})", user.username, user.id);
        Ok(Session { token, user })
    }

    /// Ends the session; the caller drops whatever it stored.
    #[must_use]
    pub fn logout(&self, session: Option<&Session>) -> View {
        if let Some(session) = session {
            info!("User {} logged out", session.user.username);
        }
        View::landing(false)
    }

    /// # Errors
    /// - `ClientError::Form` when a field is outside its limits, without contacting the backend
    /// - `ClientError::Backend` when the backend refuses the account
    pub async fn register(&self, form: &RegisterForm) -> Result<(), ClientError> {
        let registration = form.registration().inspect_err(|e| {
            warn!("Registration failed for email: {} - {e}", form.email);
        })?;
        info!("Registration attempt for email: {}", registration.email);
        self.backend
            .register_user(&registration)
            .await
            .inspect_err(|e| warn!("Registration refused for {}: {e}", registration.email))?;
        info!("Registration accepted for email: {}", registration.email);
        Ok(())
    }

    /// # Errors
    /// - `ClientError::Backend` when the activation token is unknown or the backend is down
    pub async fn activate(&self, activation_token: &str) -> Result<(), ClientError> {
        self.backend
            .activate_user(activation_token)
            .await
            .inspect_err(|e| error!("Account activation failed: {e}"))?;
        info!("Account activated");
        Ok(())
    }

    /// # Errors
    /// - `ClientError::Form` for a page size outside 1..=5
    /// - `ClientError::Backend` if the request fails
    pub async fn load_portfolios(
        &self,
        session: &Session,
        page: PageQuery,
    ) -> Result<PortfolioList, ClientError> {
        page.validate().map_err(FormError::from)?;
        let portfolios = self.backend.list_portfolios(&session.token, &page).await?;
        Ok(PortfolioList::new(portfolios, page))
    }

    /// Runs a name search; a blank term clears the search instead.
    /// # Errors
    /// - `ClientError::Backend` if the request fails
    pub async fn search(
        &self,
        session: &Session,
        list: &mut PortfolioList,
        term: &str,
    ) -> Result<(), ClientError> {
        let term = term.trim();
        if term.is_empty() {
            list.clear_search();
            return Ok(());
        }
        debug!("Searching portfolios of {} for {term:?}", session.user.username);
        list.search_term = term.to_string();
        list.search_results = self.backend.search_portfolios(&session.token, term).await?;
        Ok(())
    }

    /// Creates a portfolio and refreshes the list; a blank name is skipped.
    /// # Errors
    /// - `ClientError::Form` for names over 50 characters
    /// - `ClientError::Backend` if the creation request fails
    pub async fn create_portfolio(
        &self,
        session: &Session,
        list: &mut PortfolioList,
        form: &PortfolioForm,
    ) -> Result<bool, ClientError> {
        let Some(name) = form.name()? else {
            return Ok(false);
        };
        let created = self
            .backend
            .create_portfolio(&session.token, &NewPortfolio::named(name))
            .await?;
        info!(
            "Portfolio {} ({}) created by {}",
            created.name, created.id, session.user.username
        );
        match self.backend.list_portfolios(&session.token, &list.page).await {
            Ok(portfolios) => list.portfolios = portfolios,
            Err(e) => {
                warn!("Failed to refresh portfolios after creating {}: {e}", created.id);
                list.portfolios.push(created);
            }
        }
        Ok(true)
    }

    /// # Errors
    /// - `ClientError::Backend` when the portfolio is missing or not owned by the user
    pub async fn open_portfolio(
        &self,
        session: &Session,
        portfolio_id: PortfolioId,
    ) -> Result<PortfolioDetail, ClientError> {
        let portfolio = self
            .backend
            .get_portfolio(&session.token, portfolio_id)
            .await?;
        Ok(PortfolioDetail::new(portfolio))
    }

    /// # Errors
    /// - `ClientError::Form` for names over 50 characters
    /// - `ClientError::Backend` if the request fails
    pub async fn rename_portfolio(
        &self,
        session: &Session,
        detail: &mut PortfolioDetail,
        form: &PortfolioForm,
    ) -> Result<bool, ClientError> {
        let Some(name) = form.name()? else {
            return Ok(false);
        };
        let updated = self
            .backend
            .update_portfolio(&session.token, detail.id(), &PortfolioUpdate { name })
            .await?;
        info!("Portfolio {} renamed to {}", updated.id, updated.name);
        detail.apply_update(updated);
        Ok(true)
    }

    /// # Errors
    /// - `ClientError::Backend` if the request fails
    pub async fn delete_portfolio(
        &self,
        session: &Session,
        detail: PortfolioDetail,
    ) -> Result<View, ClientError> {
        self.backend
            .delete_portfolio(&session.token, detail.id())
            .await?;
        info!("Portfolio {} deleted", detail.id());
        Ok(View::Portfolios)
    }

    /// Adds a holding and appends it to the displayed list; incomplete forms are skipped.
    /// # Errors
    /// - `ClientError::Form` when an amount is not a number or out of range
    /// - `ClientError::Backend` if the request fails
    pub async fn add_stock(
        &self,
        session: &Session,
        detail: &mut PortfolioDetail,
        form: &StockForm,
    ) -> Result<bool, ClientError> {
        let Some(stock) = form.new_stock()? else {
            return Ok(false);
        };
        let added = self
            .backend
            .add_stock(&session.token, detail.id(), &stock)
            .await?;
        info!("{} added to portfolio {}", added.symbol, detail.id());
        detail.push_stock(added);
        Ok(true)
    }

    /// # Errors
    /// - `ClientError::Form` when an amount is not a number or out of range
    /// - `ClientError::Backend` if the request fails
    pub async fn update_stock(
        &self,
        session: &Session,
        detail: &mut PortfolioDetail,
        symbol: &str,
        form: &HoldingForm,
    ) -> Result<bool, ClientError> {
        let Some(update) = form.stock_update()? else {
            return Ok(false);
        };
        let updated = self
            .backend
            .update_stock(&session.token, detail.id(), symbol, &update)
            .await?;
        info!("{} updated in portfolio {}", updated.symbol, detail.id());
        detail.replace_stock(updated);
        Ok(true)
    }

    /// Removes a holding; only that symbol leaves the displayed list.
    /// # Errors
    /// - `ClientError::Backend` if the request fails, the list is then left untouched
    pub async fn delete_stock(
        &self,
        session: &Session,
        detail: &mut PortfolioDetail,
        symbol: &str,
    ) -> Result<(), ClientError> {
        self.backend
            .delete_stock(&session.token, detail.id(), symbol)
            .await?;
        info!("{symbol} removed from portfolio {}", detail.id());
        detail.remove_stock(symbol);
        Ok(())
    }
}
