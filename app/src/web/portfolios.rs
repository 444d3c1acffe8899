use axum::{
    extract::{Extension, Form, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use domain::{
    ClientError,
    forms::{HoldingForm, PortfolioForm, StockForm},
    portfolio::{PageQuery, PortfolioId, SortOrder},
    view::{PortfolioDetail, PortfolioList, Session, View},
};
use serde::Deserialize;
use tracing::warn;

use crate::web::{
    AppState, session,
    templates::{PortfolioDetailTemplate, PortfoliosTemplate, render},
};

const ACTION_FAILED: &str = "Request failed. Please try again.";
const PORTFOLIO_UNAVAILABLE: &str = "Portfolio not found";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub q: String,
    pub limit: Option<u8>,
    pub offset: Option<u32>,
    pub sort: Option<SortOrder>,
    pub create: bool,
}

impl ListQuery {
    fn page(&self) -> PageQuery {
        let default = PageQuery::default();
        PageQuery {
            limit: self.limit.unwrap_or(default.limit),
            offset: self.offset.unwrap_or(default.offset),
            sort: self.sort.unwrap_or(default.sort),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DetailQuery {
    pub edit: bool,
    pub add: bool,
}

fn expired(state: &AppState, error: &ClientError) -> Response {
    warn!("Session ended: {error}");
    session::sign_out(state, View::landing(false))
}

/// Splits an action result into "done" and an inline notice, unless the session is over
fn settle(state: &AppState, result: Result<bool, ClientError>) -> Result<(bool, Option<String>), Response> {
    match result {
        Ok(done) => Ok((done, None)),
        Err(e) if e.ends_session() => Err(expired(state, &e)),
        Err(e) => {
            warn!("Portfolio action failed: {e}");
            Ok((false, Some(e.user_message(ACTION_FAILED))))
        }
    }
}

/// First page of the list with `notice` on top
async fn list_with_notice(state: &AppState, session: &Session, notice: String) -> Response {
    let list = match state
        .forseer
        .forseer()
        .load_portfolios(session, PageQuery::default())
        .await
    {
        Ok(list) => list,
        Err(e) if e.ends_session() => return expired(state, &e),
        Err(e) => {
            warn!("Failed to load portfolios: {e}");
            PortfolioList::default()
        }
    };
    render(&PortfoliosTemplate {
        notice: Some(notice),
        ..PortfoliosTemplate::new(session, &list)
    })
}

async fn open(
    state: &AppState,
    session: &Session,
    portfolio_id: PortfolioId,
) -> Result<PortfolioDetail, Response> {
    match state
        .forseer
        .forseer()
        .open_portfolio(session, portfolio_id)
        .await
    {
        Ok(detail) => Ok(detail),
        Err(e) if e.ends_session() => Err(expired(state, &e)),
        Err(e) => {
            warn!("Failed to open portfolio {portfolio_id}: {e}");
            Err(list_with_notice(state, session, e.user_message(PORTFOLIO_UNAVAILABLE)).await)
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<ListQuery>,
) -> Response {
    let forseer = state.forseer.forseer();
    let mut list = match forseer.load_portfolios(&session, query.page()).await {
        Ok(list) => list,
        Err(e) if e.ends_session() => return expired(&state, &e),
        Err(e) => return list_with_notice(&state, &session, e.user_message(ACTION_FAILED)).await,
    };

    let search = forseer
        .search(&session, &mut list, &query.q)
        .await
        .map(|()| true);
    let notice = match settle(&state, search) {
        Ok((_, notice)) => notice,
        Err(response) => return response,
    };

    render(&PortfoliosTemplate {
        creating: query.create,
        notice,
        ..PortfoliosTemplate::new(&session, &list)
    })
}

pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(form): Form<PortfolioForm>,
) -> Response {
    let forseer = state.forseer.forseer();
    let mut list = PortfolioList::default();
    let result = forseer.create_portfolio(&session, &mut list, &form).await;
    let (created, notice) = match settle(&state, result) {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };
    if created {
        return render(&PortfoliosTemplate::new(&session, &list));
    }

    // Keep the creation form open over a fresh list
    let list = match forseer.load_portfolios(&session, PageQuery::default()).await {
        Ok(list) => list,
        Err(e) if e.ends_session() => return expired(&state, &e),
        Err(_) => PortfolioList::default(),
    };
    render(&PortfoliosTemplate {
        creating: true,
        name: form.name,
        notice,
        ..PortfoliosTemplate::new(&session, &list)
    })
}

pub async fn detail(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(portfolio_id): Path<PortfolioId>,
    Query(query): Query<DetailQuery>,
) -> Response {
    let detail = match open(&state, &session, portfolio_id).await {
        Ok(detail) => detail,
        Err(response) => return response,
    };
    render(&PortfolioDetailTemplate {
        editing: query.edit,
        adding: query.add,
        ..PortfolioDetailTemplate::new(&session, &detail)
    })
}

pub async fn rename(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(portfolio_id): Path<PortfolioId>,
    Form(form): Form<PortfolioForm>,
) -> Response {
    let mut detail = match open(&state, &session, portfolio_id).await {
        Ok(detail) => detail,
        Err(response) => return response,
    };
    let result = state
        .forseer
        .forseer()
        .rename_portfolio(&session, &mut detail, &form)
        .await;
    let (renamed, notice) = match settle(&state, result) {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };
    render(&PortfolioDetailTemplate {
        editing: !renamed,
        notice,
        ..PortfolioDetailTemplate::new(&session, &detail)
    })
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(portfolio_id): Path<PortfolioId>,
) -> Response {
    let detail = match open(&state, &session, portfolio_id).await {
        Ok(detail) => detail,
        Err(response) => return response,
    };
    match state
        .forseer
        .forseer()
        .delete_portfolio(&session, detail.clone())
        .await
    {
        Ok(view) => Redirect::to(&view.path()).into_response(),
        Err(e) if e.ends_session() => expired(&state, &e),
        Err(e) => {
            warn!("Failed to delete portfolio {portfolio_id}: {e}");
            render(&PortfolioDetailTemplate {
                notice: Some(e.user_message(ACTION_FAILED)),
                ..PortfolioDetailTemplate::new(&session, &detail)
            })
        }
    }
}

pub async fn add_stock(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(portfolio_id): Path<PortfolioId>,
    Form(form): Form<StockForm>,
) -> Response {
    let mut detail = match open(&state, &session, portfolio_id).await {
        Ok(detail) => detail,
        Err(response) => return response,
    };
    let result = state
        .forseer
        .forseer()
        .add_stock(&session, &mut detail, &form)
        .await;
    let (added, notice) = match settle(&state, result) {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };
    render(&PortfolioDetailTemplate {
        adding: !added,
        notice,
        ..PortfolioDetailTemplate::new(&session, &detail)
    })
}

pub async fn update_stock(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((portfolio_id, symbol)): Path<(PortfolioId, String)>,
    Form(form): Form<HoldingForm>,
) -> Response {
    let mut detail = match open(&state, &session, portfolio_id).await {
        Ok(detail) => detail,
        Err(response) => return response,
    };
    let result = state
        .forseer
        .forseer()
        .update_stock(&session, &mut detail, &symbol, &form)
        .await;
    let notice = match settle(&state, result) {
        Ok((_, notice)) => notice,
        Err(response) => return response,
    };
    render(&PortfolioDetailTemplate {
        notice,
        ..PortfolioDetailTemplate::new(&session, &detail)
    })
}

pub async fn delete_stock(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((portfolio_id, symbol)): Path<(PortfolioId, String)>,
) -> Response {
    let mut detail = match open(&state, &session, portfolio_id).await {
        Ok(detail) => detail,
        Err(response) => return response,
    };
    let result = state
        .forseer
        .forseer()
        .delete_stock(&session, &mut detail, &symbol)
        .await
        .map(|()| true);
    let notice = match settle(&state, result) {
        Ok((_, notice)) => notice,
        Err(response) => return response,
    };
    render(&PortfolioDetailTemplate {
        notice,
        ..PortfolioDetailTemplate::new(&session, &detail)
    })
}
