//! `Backend` implementation over the Forseer REST API.
//!
//! Success bodies are accepted bare or wrapped in `{"data": ...}`, error bodies
//! as `{"error": "..."}` or plain text. Every authenticated call carries the
//! session token as a bearer credential.

use async_trait::async_trait;
use domain::{
    Backend, BackendError,
    portfolio::{
        NewPortfolio, NewStock, PageQuery, Portfolio, PortfolioId, PortfolioUpdate, Stock,
        StockUpdate,
    },
    token::AccessToken,
    user::{Credentials, Registration, User, UserId},
};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, error, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBaseUrl(pub String);

impl std::fmt::Display for InvalidBaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid backend base URL: {}", self.0)
    }
}

impl std::error::Error for InvalidBaseUrl {}

#[derive(Deserialize)]
#[serde(untagged)]
enum Body<T> {
    Enveloped { data: T },
    Bare(T),
}

impl<T> Body<T> {
    fn into_inner(self) -> T {
        match self {
            Body::Enveloped { data } | Body::Bare(data) => data,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    serde_json::from_str::<Body<T>>(body)
        .map(Body::into_inner)
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// Error text of a failed response: the `error` field of a JSON body, or the body itself
fn error_message(body: &str) -> Option<String> {
    let text = body.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(fields)) => fields
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        Ok(serde_json::Value::String(message)) => Some(message),
        Ok(_) => None,
        Err(_) => Some(text.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: Url,
    client: Client,
}

impl HttpBackend {
    /// # Errors
    /// Fails when `base_url` is not an absolute http(s) URL
    pub fn new(base_url: &str) -> Result<Self, InvalidBaseUrl> {
        Self::with_client(base_url, Client::new())
    }

    /// Same as `new`, sharing an existing connection pool
    /// # Errors
    /// Fails when `base_url` is not an absolute http(s) URL
    pub fn with_client(base_url: &str, client: Client) -> Result<Self, InvalidBaseUrl> {
        let base_url =
            Url::parse(base_url).map_err(|e| InvalidBaseUrl(format!("{base_url} ({e})")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self { base_url, client })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL extended with `segments`, each one percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        debug!("{method} {url}");
        self.client.request(method, url)
    }

    fn authorized(&self, method: Method, segments: &[&str], token: &AccessToken) -> RequestBuilder {
        self.request(method, segments).bearer_auth(token.as_str())
    }

    /// Sends the request and returns the body of a successful response
    async fn execute(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await.map_err(|e| {
            error!("Backend request failed: {e}");
            BackendError::Network(e.to_string())
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("Failed to read backend response: {e}");
            BackendError::Network(e.to_string())
        })?;

        if status.is_success() {
            Ok(body)
        } else {
            warn!("Backend answered {status}: {}", body.trim());
            Err(BackendError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            })
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let body = self.execute(request).await?;
        decode(&body).inspect_err(|e| error!("{e}"))
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Vec<T>, BackendError> {
        Ok(self
            .fetch::<Option<Vec<T>>>(request)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_token(&self, credentials: &Credentials) -> Result<AccessToken, BackendError> {
        let request = self
            .request(Method::POST, &["authentication", "token"])
            .json(credentials);
        let response: TokenResponse = self.fetch(request).await?;
        Ok(AccessToken::new(response.token))
    }

    async fn register_user(&self, registration: &Registration) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, &["authentication", "user"])
            .json(registration);
        self.execute(request).await.map(drop)
    }

    async fn activate_user(&self, activation_token: &str) -> Result<(), BackendError> {
        let request = self.request(Method::PUT, &["users", "activate", activation_token]);
        self.execute(request).await.map(drop)
    }

    async fn get_user(&self, token: &AccessToken, user_id: UserId) -> Result<User, BackendError> {
        let id = user_id.to_string();
        self.fetch(self.authorized(Method::GET, &["users", &id], token))
            .await
    }

    async fn list_portfolios(
        &self,
        token: &AccessToken,
        page: &PageQuery,
    ) -> Result<Vec<Portfolio>, BackendError> {
        let request = self
            .authorized(Method::GET, &["portfolios"], token)
            .query(&[
                ("limit", page.limit.to_string()),
                ("offset", page.offset.to_string()),
                ("sort", page.sort.as_str().to_string()),
            ]);
        self.fetch_list(request).await
    }

    async fn search_portfolios(
        &self,
        token: &AccessToken,
        name: &str,
    ) -> Result<Vec<Portfolio>, BackendError> {
        let request = self
            .authorized(Method::GET, &["portfolios", "search"], token)
            .query(&[("name", name)]);
        self.fetch_list(request).await
    }

    async fn get_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
    ) -> Result<Portfolio, BackendError> {
        let id = portfolio_id.to_string();
        self.fetch(self.authorized(Method::GET, &["portfolios", &id], token))
            .await
    }

    async fn create_portfolio(
        &self,
        token: &AccessToken,
        portfolio: &NewPortfolio,
    ) -> Result<Portfolio, BackendError> {
        let request = self
            .authorized(Method::POST, &["portfolios"], token)
            .json(portfolio);
        self.fetch(request).await
    }

    async fn update_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        update: &PortfolioUpdate,
    ) -> Result<Portfolio, BackendError> {
        let id = portfolio_id.to_string();
        let request = self
            .authorized(Method::PATCH, &["portfolios", &id], token)
            .json(update);
        self.fetch(request).await
    }

    async fn delete_portfolio(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
    ) -> Result<(), BackendError> {
        let id = portfolio_id.to_string();
        self.execute(self.authorized(Method::DELETE, &["portfolios", &id], token))
            .await
            .map(drop)
    }

    async fn add_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        stock: &NewStock,
    ) -> Result<Stock, BackendError> {
        let id = portfolio_id.to_string();
        let request = self
            .authorized(Method::POST, &["portfolios", &id, "stocks"], token)
            .json(stock);
        self.fetch(request).await
    }

    async fn update_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        symbol: &str,
        update: &StockUpdate,
    ) -> Result<Stock, BackendError> {
        let id = portfolio_id.to_string();
        let request = self
            .authorized(Method::PUT, &["portfolios", &id, "stocks", symbol], token)
            .json(update);
        self.fetch(request).await
    }

    async fn delete_stock(
        &self,
        token: &AccessToken,
        portfolio_id: PortfolioId,
        symbol: &str,
    ) -> Result<(), BackendError> {
        let id = portfolio_id.to_string();
        self.execute(self.authorized(
            Method::DELETE,
            &["portfolios", &id, "stocks", symbol],
            token,
        ))
        .await
        .map(drop)
    }
}
