use axum::{
    extract::{Form, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use domain::{
    core::{ACTIVATION_FAILED, REGISTRATION_FAILED},
    forms::{LoginForm, RegisterForm},
    view::{REGISTRATION_NOTICE, View},
};
use tracing::info;

use crate::web::{
    AppState, session,
    templates::{ConfirmTemplate, LoginTemplate, RegisterTemplate, render},
};

/// Redirect for a signed-in user asking for an anonymous screen, or the reverse
async fn redirect_if_misplaced(
    state: &AppState,
    headers: &HeaderMap,
    requested: View,
) -> Option<Redirect> {
    let signed_in = session::restore(state, headers).await.is_some();
    let view = View::resolve(requested, signed_in);
    (view != requested).then(|| Redirect::to(&view.path()))
}

pub async fn home(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    let signed_in = session::restore(&state, &headers).await.is_some();
    Redirect::to(&View::landing(signed_in).path())
}

pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(redirect) = redirect_if_misplaced(&state, &headers, View::Login).await {
        return redirect.into_response();
    }
    render(&LoginTemplate::default())
}

pub async fn login_submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state.forseer.forseer().login(&form).await {
        Ok(session) => {
            info!("User {} signed in", session.user.username);
            session::sign_in(&state, &session, View::landing(true))
        }
        Err(e) => render(&LoginTemplate {
            error: Some(e.login_message()),
            email: form.email,
        }),
    }
}

pub async fn register_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(redirect) = redirect_if_misplaced(&state, &headers, View::Register).await {
        return redirect.into_response();
    }
    render(&RegisterTemplate::default())
}

pub async fn register_submit(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Response {
    match state.forseer.forseer().register(&form).await {
        Ok(()) => render(&RegisterTemplate {
            notice: Some(REGISTRATION_NOTICE.to_string()),
            ..RegisterTemplate::default()
        }),
        Err(e) => render(&RegisterTemplate {
            error: Some(e.user_message(REGISTRATION_FAILED)),
            username: form.username,
            email: form.email,
            ..RegisterTemplate::default()
        }),
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let current = session::restore(&state, &headers).await;
    let view = state.forseer.forseer().logout(current.as_ref());
    session::sign_out(&state, view)
}

pub async fn confirm_page(Path(token): Path<String>) -> Response {
    render(&ConfirmTemplate { token, alert: None })
}

pub async fn confirm_submit(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    match state.forseer.forseer().activate(&token).await {
        Ok(()) => Redirect::to("/").into_response(),
        Err(_) => render(&ConfirmTemplate {
            token,
            alert: Some(ACTIVATION_FAILED.to_string()),
        }),
    }
}
