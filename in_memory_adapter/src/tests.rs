use domain::{
    Backend,
    portfolio::{NewPortfolio, NewStock, PageQuery, PortfolioUpdate, SortOrder},
    token::AccessToken,
    user::{Credentials, Registration},
};

use crate::InMemoryBackend;

async fn login(backend: &InMemoryBackend, email: &str, password: &str) -> AccessToken {
    backend
        .create_token(&Credentials::new(email, password))
        .await
        .unwrap()
}

fn registration(username: &str, email: &str) -> Registration {
    Registration {
        username: username.into(),
        email: email.into(),
        password: "password123".into(),
    }
}

#[tokio::test]
async fn test_registration_requires_activation() {
    let backend = InMemoryBackend::new();
    backend
        .register_user(&registration("ada", "ada@example.com"))
        .await
        .unwrap();

    let refused = backend
        .create_token(&Credentials::new("ada@example.com", "password123"))
        .await
        .unwrap_err();
    assert!(refused.is_unauthorized());

    let activation = backend.activation_token("ada@example.com").unwrap();
    backend.activate_user(&activation).await.unwrap();
    assert!(backend.is_active("ada@example.com"));

    let token = login(&backend, "ada@example.com", "password123").await;
    let user_id = token.subject().unwrap();
    let user = backend.get_user(&token, user_id).await.unwrap();
    assert_eq!(user.username, "ada");

    // Activation tokens are single use
    let reused = backend.activate_user(&activation).await.unwrap_err();
    assert_eq!(reused.message(), Some("not found"));
}

#[tokio::test]
async fn test_duplicate_registration() {
    let backend = InMemoryBackend::new();
    backend
        .register_user(&registration("ada", "ada@example.com"))
        .await
        .unwrap();

    let error = backend
        .register_user(&registration("other", "ada@example.com"))
        .await
        .unwrap_err();
    assert_eq!(error.message(), Some("a user with that email already exists"));

    let error = backend
        .register_user(&registration("ada", "other@example.com"))
        .await
        .unwrap_err();
    assert_eq!(
        error.message(),
        Some("a user with that username already exists")
    );
}

#[tokio::test]
async fn test_wrong_password_and_foreign_token() {
    let backend = InMemoryBackend::seeded();
    let refused = backend
        .create_token(&Credentials::new("demo@forseer.dev", "password124"))
        .await
        .unwrap_err();
    assert!(refused.is_unauthorized());

    let forged = AccessToken::new("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOjF9.c2ln");
    let error = backend
        .list_portfolios(&forged, &PageQuery::default())
        .await
        .unwrap_err();
    assert!(error.is_unauthorized());
}

#[tokio::test]
async fn test_paging_and_sorting() {
    let backend = InMemoryBackend::new();
    let user_id = backend.insert_active_user("ada", "ada@example.com", "password123");
    for name in ["One", "Two", "Three", "Four", "Five", "Six"] {
        backend.insert_portfolio(user_id, name, &[]);
    }
    let token = login(&backend, "ada@example.com", "password123").await;

    let newest = backend
        .list_portfolios(&token, &PageQuery::default())
        .await
        .unwrap();
    assert_eq!(newest.len(), 5);
    assert_eq!(newest[0].name, "Six");

    let oldest = PageQuery {
        sort: SortOrder::Asc,
        ..PageQuery::default()
    };
    let page = backend.list_portfolios(&token, &oldest.next()).await.unwrap();
    let names: Vec<_> = page.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Six"]);
}

#[tokio::test]
async fn test_portfolios_are_scoped_to_owner() {
    let backend = InMemoryBackend::seeded();
    backend.insert_active_user("eve", "eve@example.com", "password123");
    let demo = login(&backend, "demo@forseer.dev", "password123").await;
    let eve = login(&backend, "eve@example.com", "password123").await;

    let demo_portfolio = backend
        .list_portfolios(&demo, &PageQuery::default())
        .await
        .unwrap()
        .remove(0);

    let error = backend
        .get_portfolio(&eve, demo_portfolio.id)
        .await
        .unwrap_err();
    assert_eq!(error.message(), Some("not found"));
    assert!(
        backend
            .search_portfolios(&eve, "tech")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_portfolio_lifecycle() {
    let backend = InMemoryBackend::seeded();
    let token = login(&backend, "demo@forseer.dev", "password123").await;

    let created = backend
        .create_portfolio(&token, &NewPortfolio::named("Energy"))
        .await
        .unwrap();
    assert!(created.stocks.is_empty());

    let renamed = backend
        .update_portfolio(
            &token,
            created.id,
            &PortfolioUpdate {
                name: "Clean Energy".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Clean Energy");

    let stock = NewStock {
        symbol: "ENPH".into(),
        shares: 3.0,
        average_price: 101.0,
    };
    backend.add_stock(&token, created.id, &stock).await.unwrap();
    let duplicate = backend.add_stock(&token, created.id, &stock).await.unwrap_err();
    assert!(matches!(
        duplicate,
        domain::BackendError::Rejected { status: 409, .. }
    ));

    let found = backend.search_portfolios(&token, "clean").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].stocks[0].symbol, "ENPH");

    backend
        .delete_stock(&token, created.id, "ENPH")
        .await
        .unwrap();
    assert!(backend.delete_stock(&token, created.id, "ENPH").await.is_err());

    backend.delete_portfolio(&token, created.id).await.unwrap();
    assert!(backend.get_portfolio(&token, created.id).await.is_err());
}

#[tokio::test]
async fn test_blank_search_and_invalid_payloads() {
    let backend = InMemoryBackend::seeded();
    let token = login(&backend, "demo@forseer.dev", "password123").await;

    let error = backend.search_portfolios(&token, "").await.unwrap_err();
    assert_eq!(error.message(), Some("search query parameter is required"));

    let error = backend
        .create_portfolio(&token, &NewPortfolio::named(""))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        domain::BackendError::Rejected { status: 400, .. }
    ));
}

#[test]
fn test_repo_default_holds_records_without_default() {
    #[derive(Debug, PartialEq)]
    struct Record(&'static str);

    let mut repo: crate::InMemoryRepo<Record, u32> = crate::InMemoryRepo::default();
    assert_eq!(repo.iter().count(), 0);
    repo.insert(7, Record("kept"));
    assert_eq!(repo.get(&7), Some(&Record("kept")));
    assert_eq!(repo.remove(&7), Some(Record("kept")));
    assert!(repo.get(&7).is_none());
}
