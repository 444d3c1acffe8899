//! Process-local stand-in for the portfolio service.
//!
//! Behaves like the HTTP backend as seen through the `Backend` port: it issues
//! signed tokens, keeps accounts inactive until their activation token is
//! confirmed, scopes portfolios to their owner and answers with the same
//! statuses. Used by the tests and by the demo mode of the web UI.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::{
    Backend, BackendError,
    forms::FormError,
    portfolio::{
        NewPortfolio, NewStock, PageQuery, Portfolio, PortfolioId, PortfolioUpdate, SortOrder,
        Stock, StockUpdate,
    },
    token::AccessToken,
    user::{Credentials, Registration, User, UserId},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

const ISSUER: &str = "forseer";
const DEFAULT_SECRET: &[u8] = b"in-memory-backend-secret";

#[derive(Debug)]
pub struct InMemoryRepo<T, Id> {
    storage: HashMap<Id, T>,
}

impl<T, Id> Default for InMemoryRepo<T, Id> {
    fn default() -> Self {
        Self {
            storage: HashMap::new(),
        }
    }
}

impl<T, Id> InMemoryRepo<T, Id>
where
    Id: Clone + Eq + Hash,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: Id, item: T) {
        self.storage.insert(id, item);
    }

    pub fn get(&self, id: &Id) -> Option<&T> {
        self.storage.get(id)
    }

    pub fn get_mut(&mut self, id: &Id) -> Option<&mut T> {
        self.storage.get_mut(id)
    }

    pub fn remove(&mut self, id: &Id) -> Option<T> {
        self.storage.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &T)> {
        self.storage.iter()
    }
}

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password: String,
    active: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    users: InMemoryRepo<Account, UserId>,
    portfolios: InMemoryRepo<Portfolio, PortfolioId>,
    // activation token -> account waiting for it
    invitations: InMemoryRepo<UserId, String>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn owned_portfolio(
        &mut self,
        user_id: UserId,
        portfolio_id: PortfolioId,
    ) -> Result<&mut Portfolio, BackendError> {
        self.portfolios
            .get_mut(&portfolio_id)
            .filter(|portfolio| portfolio.user_id == user_id)
            .ok_or_else(not_found)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: UserId,
    exp: i64,
    iat: i64,
    nbf: i64,
    iss: String,
    aud: String,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn bad_request(message: impl Into<String>) -> BackendError {
    BackendError::rejected(400, message)
}

fn unauthorized() -> BackendError {
    BackendError::rejected(401, "unauthorized")
}

fn not_found() -> BackendError {
    BackendError::rejected(404, "not found")
}

fn conflict() -> BackendError {
    BackendError::rejected(409, "the server encountered a conflict")
}

fn validate(payload: &impl Validate) -> Result<(), BackendError> {
    payload
        .validate()
        .map_err(|errors| bad_request(FormError::from(errors).to_string()))
}

#[derive(Debug)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    secret: Vec<u8>,
    token_ttl: chrono::Duration,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            secret: DEFAULT_SECRET.to_vec(),
            token_ttl: chrono::Duration::hours(72),
        }
    }

    /// Backend holding an active `demo@forseer.dev` / `password123` account with two portfolios
    #[must_use]
    pub fn seeded() -> Self {
        let backend = Self::new();
        let user_id = backend.insert_active_user("demo", "demo@forseer.dev", "password123");
        backend.insert_portfolio(user_id, "Tech", &[("AAPL", 10.0, 150.25), ("MSFT", 5.0, 320.0)]);
        backend.insert_portfolio(user_id, "Dividends", &[("KO", 20.0, 58.5)]);
        backend
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an account that can log in right away
    pub fn insert_active_user(&self, username: &str, email: &str, password: &str) -> UserId {
        let mut state = self.state();
        let id = state.next_id();
        let timestamp = now();
        state.users.insert(
            id,
            Account {
                user: User {
                    id,
                    username: username.to_string(),
                    email: email.to_string(),
                    created_at: Some(timestamp.clone()),
                    updated_at: Some(timestamp),
                },
                password: password.to_string(),
                active: true,
            },
        );
        id
    }

    pub fn insert_portfolio(
        &self,
        user_id: UserId,
        name: &str,
        holdings: &[(&str, f64, f64)],
    ) -> PortfolioId {
        let mut state = self.state();
        let id = state.next_id();
        let mut stocks = Vec::with_capacity(holdings.len());
        for (symbol, shares, average_price) in holdings {
            let stock_id = state.next_id();
            stocks.push(Stock {
                id: stock_id,
                symbol: (*symbol).to_string(),
                shares: *shares,
                average_price: *average_price,
                portfolio_id: id,
                created_at: Some(now()),
                updated_at: Some(now()),
            });
        }
        state.portfolios.insert(
            id,
            Portfolio {
                id,
                user_id,
                name: name.to_string(),
                stocks,
                created_at: Some(now()),
                updated_at: Some(now()),
            },
        );
        id
    }

    /// The token that would have been emailed to `email` at registration
    #[must_use]
    pub fn activation_token(&self, email: &str) -> Option<String> {
        let state = self.state();
        state
            .invitations
            .iter()
            .find(|(_, user_id)| {
                state
                    .users
                    .get(user_id)
                    .is_some_and(|account| account.user.email == email)
            })
            .map(|(token, _)| token.clone())
    }

    #[must_use]
    pub fn is_active(&self, email: &str) -> bool {
        self.state()
            .users
            .iter()
            .any(|(_, account)| account.user.email == email && account.active)
    }

    /// Portfolios owned by `user_id`, oldest first
    #[must_use]
    pub fn portfolios_of(&self, user_id: UserId) -> Vec<Portfolio> {
        let mut portfolios: Vec<Portfolio> = self
            .state()
            .portfolios
            .iter()
            .filter(|(_, portfolio)| portfolio.user_id == user_id)
            .map(|(_, portfolio)| portfolio.clone())
            .collect();
        portfolios.sort_by_key(|portfolio| portfolio.id);
        portfolios
    }

    fn issue_token(&self, user_id: UserId) -> Result<AccessToken, BackendError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: (now + self.token_ttl).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            iss: ISSUER.to_string(),
            aud: ISSUER.to_string(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map(AccessToken::new)
            .map_err(|e| BackendError::rejected(500, format!("token signing failed: {e}")))
    }

    fn authenticate(&self, token: &AccessToken) -> Result<UserId, BackendError> {
        let mut validation = Validation::default();
        validation.set_audience(&[ISSUER]);
        validation.set_issuer(&[ISSUER]);
        let claims = decode::<Claims>(
            token.as_str(),
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(|_| unauthorized())?
        .claims;

        let state = self.state();
        match state.users.get(&claims.sub) {
            Some(account) if account.active => Ok(claims.sub),
            _ => Err(unauthorized()),
        }
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn create_token(&self, credentials: &Credentials) -> Result<AccessToken, BackendError> {
        if credentials.email.is_empty() {
            return Err(bad_request("email is required"));
        }
        if !(8..=16).contains(&credentials.password.chars().count()) {
            return Err(bad_request("password must be 8 to 16 characters"));
        }
        let user_id = {
            let state = self.state();
            state
                .users
                .iter()
                .find(|(_, account)| account.user.email == credentials.email && account.active)
                .filter(|(_, account)| account.password == credentials.password)
                .map(|(id, _)| *id)
                .ok_or_else(unauthorized)?
        };
        debug!("Issuing token for user {user_id}");
        self.issue_token(user_id)
    }

    async fn register_user(&self, registration: &Registration) -> Result<(), BackendError> {
        validate(registration)?;
        let mut state = self.state();
        for (_, account) in state.users.iter() {
            if account.user.email == registration.email {
                return Err(bad_request("a user with that email already exists"));
            }
            if account.user.username == registration.username {
                return Err(bad_request("a user with that username already exists"));
            }
        }

        let id = state.next_id();
        let timestamp = now();
        state.users.insert(
            id,
            Account {
                user: User {
                    id,
                    username: registration.username.clone(),
                    email: registration.email.clone(),
                    created_at: Some(timestamp.clone()),
                    updated_at: Some(timestamp),
                },
                password: registration.password.clone(),
                active: false,
            },
        );
        let activation_token = uuid::Uuid::new_v4().to_string();
        debug!("Invitation issued for user {id}");
        state.invitations.insert(activation_token, id);
        Ok(())
    }

    async fn activate_user(&self, activation_token: &str) -> Result<(), BackendError> {
        let mut state = self.state();
        let user_id = state
            .invitations
            .remove(&activation_token.to_string())
            .ok_or_else(not_found)?;
        let account = state.users.get_mut(&user_id).ok_or_else(not_found)?;
        account.active = true;
        account.user.updated_at = Some(now());
        Ok(())
    }

    async fn get_user(&self, token: &AccessToken, user_id: UserId) -> Result<User, BackendError> {
        self.authenticate(token)?;
        self.state()
            .users
            .get(&user_id)
            .map(|account| account.user.clone())
            .ok_or_else(not_found)
    }

    async fn list_portfolios(
        &self,
        token: &AccessToken,
        page: &PageQuery,
    ) -> Result<Vec<Portfolio>, BackendError> {
        let user_id = self.authenticate(token)?;
        validate(page)?;
        let mut portfolios = self.portfolios_of(user_id);
        if page.sort == SortOrder::Desc {
            portfolios.reverse();
        }
        Ok(portfolios
            .into_iter()
            .skip(page.offset as usize)
            .take(usize::from(page.limit))
            .collect())
    }

    async fn search_portfolios(
        &self,
        token: &AccessToken,
        name: &str,
    ) -> Result<Vec<Portfolio>, BackendError> {
        let user_id = self.authenticate(token)?;
        if name.is_empty() {
            return Err(bad_request("search query parameter is required"));
        }
        let needle = name.to_lowercase();
        Ok(self
            .portfolios_of(user_id)
            .into_iter()
            .filter(|portfolio| portfolio.name.to_lowercase().contains(&needle))
            .collect())
    }

    async fn get_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
    ) -> Result<Portfolio, BackendError> {
        let user_id = self.authenticate(token)?;
        let mut state = self.state();
        state
            .owned_portfolio(user_id, portfolio_id)
            .map(|portfolio| portfolio.clone())
    }

    async fn create_portfolio(
        &self,
        token: &AccessToken,
        portfolio: &NewPortfolio,
    ) -> Result<Portfolio, BackendError> {
        let user_id = self.authenticate(token)?;
        validate(portfolio)?;
        let holdings: Vec<(&str, f64, f64)> = portfolio
            .stocks
            .iter()
            .map(|stock| (stock.symbol.as_str(), stock.shares, stock.average_price))
            .collect();
        let id = self.insert_portfolio(user_id, &portfolio.name, &holdings);
        let mut state = self.state();
        state
            .owned_portfolio(user_id, id)
            .map(|portfolio| portfolio.clone())
    }

    async fn update_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        update: &PortfolioUpdate,
    ) -> Result<Portfolio, BackendError> {
        let user_id = self.authenticate(token)?;
        validate(update)?;
        let mut state = self.state();
        let portfolio = state.owned_portfolio(user_id, portfolio_id)?;
        portfolio.name = update.name.clone();
        portfolio.updated_at = Some(now());
        Ok(portfolio.clone())
    }

    async fn delete_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
    ) -> Result<(), BackendError> {
        let user_id = self.authenticate(token)?;
        let mut state = self.state();
        state.owned_portfolio(user_id, portfolio_id)?;
        state.portfolios.remove(&portfolio_id);
        Ok(())
    }

    async fn add_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        stock: &NewStock,
    ) -> Result<Stock, BackendError> {
        let user_id = self.authenticate(token)?;
        validate(stock)?;
        let mut state = self.state();
        let stock_id = state.next_id();
        let portfolio = state.owned_portfolio(user_id, portfolio_id)?;
        if portfolio.stocks.iter().any(|held| held.symbol == stock.symbol) {
            return Err(conflict());
        }
        let added = Stock {
            id: stock_id,
            symbol: stock.symbol.clone(),
            shares: stock.shares,
            average_price: stock.average_price,
            portfolio_id,
            created_at: Some(now()),
            updated_at: Some(now()),
        };
        portfolio.stocks.push(added.clone());
        Ok(added)
    }

    async fn update_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        symbol: &str,
        update: &StockUpdate,
    ) -> Result<Stock, BackendError> {
        let user_id = self.authenticate(token)?;
        validate(update)?;
        let mut state = self.state();
        let portfolio = state.owned_portfolio(user_id, portfolio_id)?;
        let stock = portfolio
            .stocks
            .iter_mut()
            .find(|held| held.symbol == symbol)
            .ok_or_else(not_found)?;
        stock.shares = update.shares;
        stock.average_price = update.average_price;
        stock.updated_at = Some(now());
        Ok(stock.clone())
    }

    async fn delete_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        symbol: &str,
    ) -> Result<(), BackendError> {
        let user_id = self.authenticate(token)?;
        let mut state = self.state();
        let portfolio = state.owned_portfolio(user_id, portfolio_id)?;
        let before = portfolio.stocks.len();
        portfolio.stocks.retain(|held| held.symbol != symbol);
        if portfolio.stocks.len() == before {
            return Err(not_found());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
