use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};

use crate::{
    backend::{Backend, BackendError},
    core::{Forseer, INVALID_CREDENTIALS, LOGIN_FAILED, REGISTRATION_FAILED},
    forms::{HoldingForm, LoginForm, PortfolioForm, RegisterForm, StockForm},
    portfolio::{
        NewPortfolio, NewStock, PageQuery, Portfolio, PortfolioId, PortfolioUpdate, Stock,
        StockUpdate,
    },
    token::AccessToken,
    user::{Credentials, Registration, User, UserId},
    view::{PortfolioList, View},
};

const USER_ID: UserId = 42;

fn signed_token(sub: UserId, exp_offset: i64) -> AccessToken {
    let claims = serde_json::json!({
        "sub": sub,
        "exp": chrono::Utc::now().timestamp() + exp_offset,
    });
    AccessToken::new(encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap())
}

fn stock(id: i64, symbol: &str) -> Stock {
    Stock {
        id,
        symbol: symbol.into(),
        shares: 2.0,
        average_price: 50.0,
        portfolio_id: 1,
        created_at: None,
        updated_at: None,
    }
}

/// Records every call and answers from a small in-process state
#[derive(Debug)]
pub struct MockBackend {
    calls: Mutex<Vec<String>>,
    portfolios: Mutex<Vec<Portfolio>>,
    failure: Option<BackendError>,
    list_failure: Option<BackendError>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            portfolios: Mutex::new(vec![Portfolio {
                id: 1,
                user_id: USER_ID,
                name: "Tech".into(),
                stocks: vec![stock(1, "AAPL"), stock(2, "MSFT"), stock(3, "NVDA")],
                created_at: None,
                updated_at: None,
            }]),
            failure: None,
            list_failure: None,
        }
    }

    /// Every call fails with `error`
    pub fn failing_with(mut self, error: BackendError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Only `list_portfolios` fails with `error`
    pub fn failing_list_with(mut self, error: BackendError) -> Self {
        self.list_failure = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call.into());
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn portfolio(&self, portfolio_id: PortfolioId) -> Result<Portfolio, BackendError> {
        self.portfolios
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == portfolio_id)
            .cloned()
            .ok_or_else(|| BackendError::rejected(404, "not found"))
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn create_token(&self, credentials: &Credentials) -> Result<AccessToken, BackendError> {
        self.record("create_token")?;
        if credentials.password == "correct-horse" {
            Ok(signed_token(USER_ID, 3600))
        } else {
            Err(BackendError::Rejected {
                status: 401,
                message: None,
            })
        }
    }

    async fn register_user(&self, registration: &Registration) -> Result<(), BackendError> {
        self.record(format!("register_user {}", registration.username))
    }

    async fn activate_user(&self, activation_token: &str) -> Result<(), BackendError> {
        self.record(format!("activate_user {activation_token}"))
    }

    async fn get_user(&self, _token: &AccessToken, user_id: UserId) -> Result<User, BackendError> {
        self.record(format!("get_user {user_id}"))?;
        Ok(User {
            id: user_id,
            username: "ada".into(),
            email: "ada@example.com".into(),
            created_at: None,
            updated_at: None,
        })
    }

    async fn list_portfolios(
        &self,
        _token: &AccessToken,
        _page: &PageQuery,
    ) -> Result<Vec<Portfolio>, BackendError> {
        self.record("list_portfolios")?;
        if let Some(error) = &self.list_failure {
            return Err(error.clone());
        }
        Ok(self.portfolios.lock().unwrap().clone())
    }

    async fn search_portfolios(
        &self,
        _token: &AccessToken,
        name: &str,
    ) -> Result<Vec<Portfolio>, BackendError> {
        self.record(format!("search_portfolios {name}"))?;
        let name = name.to_lowercase();
        Ok(self
            .portfolios
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&name))
            .cloned()
            .collect())
    }

    async fn get_portfolio(
        &self,
        _token: &AccessToken,
        portfolio_id: PortfolioId,
    ) -> Result<Portfolio, BackendError> {
        self.record(format!("get_portfolio {portfolio_id}"))?;
        self.portfolio(portfolio_id)
    }

    async fn create_portfolio(
        &self,
        _token: &AccessToken,
        portfolio: &NewPortfolio,
    ) -> Result<Portfolio, BackendError> {
        self.record(format!("create_portfolio {}", portfolio.name))?;
        let mut portfolios = self.portfolios.lock().unwrap();
        let created = Portfolio {
            id: portfolios.len() as i64 + 1,
            user_id: USER_ID,
            name: portfolio.name.clone(),
            stocks: Vec::new(),
            created_at: None,
            updated_at: None,
        };
        portfolios.push(created.clone());
        Ok(created)
    }

    async fn update_portfolio(
        &self,
        _token: &AccessToken,
        portfolio_id: PortfolioId,
        update: &PortfolioUpdate,
    ) -> Result<Portfolio, BackendError> {
        self.record(format!("update_portfolio {portfolio_id} {}", update.name))?;
        let mut portfolio = self.portfolio(portfolio_id)?;
        portfolio.name = update.name.clone();
        // Renames come back without holdings
        portfolio.stocks.clear();
        Ok(portfolio)
    }

    async fn delete_portfolio(
        &self,
        _token: &AccessToken,
        portfolio_id: PortfolioId,
    ) -> Result<(), BackendError> {
        self.record(format!("delete_portfolio {portfolio_id}"))
    }

    async fn add_stock(
        &self,
        _token: &AccessToken,
        portfolio_id: PortfolioId,
        stock: &NewStock,
    ) -> Result<Stock, BackendError> {
        self.record(format!("add_stock {portfolio_id} {}", stock.symbol))?;
        Ok(Stock {
            id: 99,
            symbol: stock.symbol.clone(),
            shares: stock.shares,
            average_price: stock.average_price,
            portfolio_id,
            created_at: None,
            updated_at: None,
        })
    }

    async fn update_stock(
        &self,
        _token: &AccessToken,
        portfolio_id: PortfolioId,
        symbol: &str,
        update: &StockUpdate,
    ) -> Result<Stock, BackendError> {
        self.record(format!("update_stock {portfolio_id} {symbol}"))?;
        Ok(Stock {
            shares: update.shares,
            average_price: update.average_price,
            ..stock(7, symbol)
        })
    }

    async fn delete_stock(
        &self,
        _token: &AccessToken,
        portfolio_id: PortfolioId,
        symbol: &str,
    ) -> Result<(), BackendError> {
        self.record(format!("delete_stock {portfolio_id} {symbol}"))
    }
}

fn setup() -> (Forseer, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new());
    (Forseer::new(backend.clone()), backend)
}

async fn signed_in(forseer: &Forseer) -> crate::view::Session {
    forseer
        .restore_session(signed_token(USER_ID, 3600))
        .await
        .unwrap()
}

fn login_form(password: &str) -> LoginForm {
    LoginForm {
        email: "ada@example.com".into(),
        password: password.into(),
    }
}

#[tokio::test]
async fn test_login_success_lands_on_portfolios() {
    let (forseer, backend) = setup();

    let session = forseer.login(&login_form("correct-horse")).await.unwrap();

    assert_eq!(session.user.id, USER_ID);
    assert_eq!(session.user.username, "ada");
    assert_eq!(View::landing(true), View::Portfolios);
    assert_eq!(backend.calls(), ["create_token", "get_user 42"]);
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let (forseer, backend) = setup();

    let error = forseer.login(&login_form("wrong")).await.unwrap_err();

    assert_eq!(error.login_message(), INVALID_CREDENTIALS);
    assert_eq!(backend.calls(), ["create_token"]);
}

#[tokio::test]
async fn test_login_shows_backend_text() {
    let backend = Arc::new(
        MockBackend::new().failing_with(BackendError::rejected(400, "password is too short")),
    );
    let forseer = Forseer::new(backend);

    let error = forseer.login(&login_form("x")).await.unwrap_err();
    assert_eq!(error.login_message(), "password is too short");
}

#[tokio::test]
async fn test_login_network_failure_is_generic() {
    let backend = Arc::new(
        MockBackend::new().failing_with(BackendError::Network("connection refused".into())),
    );
    let forseer = Forseer::new(backend);

    let error = forseer.login(&login_form("correct-horse")).await.unwrap_err();
    assert_eq!(error.login_message(), LOGIN_FAILED);
}

#[tokio::test]
async fn test_expired_token_never_reaches_backend() {
    let (forseer, backend) = setup();

    let error = forseer
        .restore_session(signed_token(USER_ID, -3600))
        .await
        .unwrap_err();

    assert!(error.ends_session());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_token_ends_session() {
    let backend = Arc::new(MockBackend::new().failing_with(BackendError::Rejected {
        status: 401,
        message: Some("unauthorized".into()),
    }));
    let forseer = Forseer::new(backend);

    let error = forseer
        .restore_session(signed_token(USER_ID, 3600))
        .await
        .unwrap_err();
    assert!(error.ends_session());
}

#[tokio::test]
async fn test_logout_returns_to_login() {
    let (forseer, _) = setup();
    let session = signed_in(&forseer).await;

    assert_eq!(forseer.logout(Some(&session)), View::Login);
    assert_eq!(forseer.logout(None), View::Login);
}

#[tokio::test]
async fn test_register_success() {
    let (forseer, backend) = setup();
    let form = RegisterForm {
        username: "ada".into(),
        email: "ada@example.com".into(),
        password: "longenough".into(),
    };

    forseer.register(&form).await.unwrap();
    assert_eq!(backend.calls(), ["register_user ada"]);
}

#[tokio::test]
async fn test_register_invalid_form_skips_backend() {
    let (forseer, backend) = setup();
    let form = RegisterForm {
        username: "ada".into(),
        email: "ada@example.com".into(),
        password: "short".into(),
    };

    let error = forseer.register(&form).await.unwrap_err();
    assert_eq!(
        error.user_message(REGISTRATION_FAILED),
        "Password must be 8 to 16 characters"
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_register_failure_message() {
    let form = RegisterForm {
        username: "ada".into(),
        email: "ada@example.com".into(),
        password: "longenough".into(),
    };

    let backend = Arc::new(MockBackend::new().failing_with(BackendError::rejected(
        400,
        "a user with that email already exists",
    )));
    let error = Forseer::new(backend).register(&form).await.unwrap_err();
    assert_eq!(
        error.user_message(REGISTRATION_FAILED),
        "a user with that email already exists"
    );

    let backend =
        Arc::new(MockBackend::new().failing_with(BackendError::Network("timeout".into())));
    let error = Forseer::new(backend).register(&form).await.unwrap_err();
    assert_eq!(error.user_message(REGISTRATION_FAILED), REGISTRATION_FAILED);
}

#[tokio::test]
async fn test_activation() {
    let (forseer, backend) = setup();
    forseer.activate("abc-123").await.unwrap();
    assert_eq!(backend.calls(), ["activate_user abc-123"]);

    let backend = Arc::new(MockBackend::new().failing_with(BackendError::rejected(404, "not found")));
    let error = Forseer::new(backend).activate("nope").await.unwrap_err();
    assert!(!error.ends_session());
    assert_eq!(error.to_string(), "Backend rejected the request (404): not found");
}

#[tokio::test]
async fn test_create_portfolio_with_blank_name_is_noop() {
    let (forseer, backend) = setup();
    let session = signed_in(&forseer).await;
    let mut list = forseer
        .load_portfolios(&session, PageQuery::default())
        .await
        .unwrap();
    let calls_before = backend.calls().len();

    let created = forseer
        .create_portfolio(&session, &mut list, &PortfolioForm { name: "  ".into() })
        .await
        .unwrap();

    assert!(!created);
    assert_eq!(backend.calls().len(), calls_before);
    assert_eq!(list.portfolios.len(), 1);
}

#[tokio::test]
async fn test_create_portfolio_refreshes_list() {
    let (forseer, backend) = setup();
    let session = signed_in(&forseer).await;
    let mut list = PortfolioList::default();

    let created = forseer
        .create_portfolio(
            &session,
            &mut list,
            &PortfolioForm {
                name: "Dividends".into(),
            },
        )
        .await
        .unwrap();

    assert!(created);
    assert_eq!(list.portfolios.len(), 2);
    assert!(backend.calls().ends_with(&[
        "create_portfolio Dividends".to_string(),
        "list_portfolios".to_string()
    ]));
}

#[tokio::test]
async fn test_create_portfolio_survives_failed_refresh() {
    let backend = Arc::new(
        MockBackend::new().failing_list_with(BackendError::Network("connection reset".into())),
    );
    let forseer = Forseer::new(backend.clone());
    let session = signed_in(&forseer).await;
    let mut list = PortfolioList::default();

    let created = forseer
        .create_portfolio(
            &session,
            &mut list,
            &PortfolioForm {
                name: "Growth".into(),
            },
        )
        .await
        .unwrap();

    assert!(created);
    assert_eq!(list.portfolios.len(), 1);
    assert_eq!(list.portfolios[0].name, "Growth");
    assert!(backend.calls().ends_with(&[
        "create_portfolio Growth".to_string(),
        "list_portfolios".to_string()
    ]));
}

#[tokio::test]
async fn test_search_blank_term_clears_without_request() {
    let (forseer, backend) = setup();
    let session = signed_in(&forseer).await;
    let mut list = forseer
        .load_portfolios(&session, PageQuery::default())
        .await
        .unwrap();

    forseer.search(&session, &mut list, "te").await.unwrap();
    assert_eq!(list.displayed().len(), 1);
    assert_eq!(backend.calls().last().unwrap(), "search_portfolios te");

    let calls_before = backend.calls().len();
    forseer.search(&session, &mut list, "   ").await.unwrap();
    assert!(!list.is_searching());
    assert_eq!(backend.calls().len(), calls_before);
}

#[tokio::test]
async fn test_invalid_page_is_refused() {
    let (forseer, backend) = setup();
    let session = signed_in(&forseer).await;
    let page = PageQuery {
        limit: 9,
        ..PageQuery::default()
    };

    assert!(forseer.load_portfolios(&session, page).await.is_err());
    assert_eq!(backend.calls(), ["get_user 42"]);
}

#[tokio::test]
async fn test_delete_stock_removes_exactly_that_symbol() {
    let (forseer, _) = setup();
    let session = signed_in(&forseer).await;
    let mut detail = forseer.open_portfolio(&session, 1).await.unwrap();

    forseer
        .delete_stock(&session, &mut detail, "MSFT")
        .await
        .unwrap();

    let symbols: Vec<_> = detail.stocks.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, ["AAPL", "NVDA"]);
}

#[tokio::test]
async fn test_failed_stock_delete_keeps_list() {
    let (forseer, _) = setup();
    let session = signed_in(&forseer).await;
    let mut detail = forseer.open_portfolio(&session, 1).await.unwrap();

    let failing = Forseer::new(Arc::new(
        MockBackend::new().failing_with(BackendError::Network("down".into())),
    ));
    assert!(
        failing
            .delete_stock(&session, &mut detail, "MSFT")
            .await
            .is_err()
    );
    assert_eq!(detail.stocks.len(), 3);
}

#[tokio::test]
async fn test_rename_keeps_holdings() {
    let (forseer, backend) = setup();
    let session = signed_in(&forseer).await;
    let mut detail = forseer.open_portfolio(&session, 1).await.unwrap();

    let skipped = forseer
        .rename_portfolio(&session, &mut detail, &PortfolioForm::default())
        .await
        .unwrap();
    assert!(!skipped);
    assert_eq!(backend.calls().last().unwrap(), "get_portfolio 1");

    forseer
        .rename_portfolio(
            &session,
            &mut detail,
            &PortfolioForm {
                name: "Big Tech".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(detail.portfolio.name, "Big Tech");
    assert_eq!(detail.stocks.len(), 3);
}

#[tokio::test]
async fn test_add_and_update_stock() {
    let (forseer, backend) = setup();
    let session = signed_in(&forseer).await;
    let mut detail = forseer.open_portfolio(&session, 1).await.unwrap();

    let incomplete = StockForm {
        symbol: "amd".into(),
        ..StockForm::default()
    };
    assert!(!forseer.add_stock(&session, &mut detail, &incomplete).await.unwrap());
    assert_eq!(backend.calls().last().unwrap(), "get_portfolio 1");

    let form = StockForm {
        symbol: "amd".into(),
        shares: "4".into(),
        average_price: "110.5".into(),
    };
    assert!(forseer.add_stock(&session, &mut detail, &form).await.unwrap());
    assert_eq!(detail.stocks.last().unwrap().symbol, "AMD");
    assert_eq!(backend.calls().last().unwrap(), "add_stock 1 AMD");

    let holding = HoldingForm {
        shares: "10".into(),
        average_price: "20".into(),
    };
    assert!(
        forseer
            .update_stock(&session, &mut detail, "AAPL", &holding)
            .await
            .unwrap()
    );
    let aapl = detail.stocks.iter().find(|s| s.symbol == "AAPL").unwrap();
    assert!((aapl.shares - 10.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_delete_portfolio_returns_to_list() {
    let (forseer, backend) = setup();
    let session = signed_in(&forseer).await;
    let detail = forseer.open_portfolio(&session, 1).await.unwrap();

    let view = forseer.delete_portfolio(&session, detail).await.unwrap();
    assert_eq!(view, View::Portfolios);
    assert_eq!(backend.calls().last().unwrap(), "delete_portfolio 1");
}
