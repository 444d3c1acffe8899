use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use domain::{token::AccessToken, view::Session, view::View};
use tracing::{debug, warn};

use crate::web::AppState;

pub const TOKEN_COOKIE: &str = "token";

/// Attributes of the cookie holding the session token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub max_age_secs: u64,
}

impl CookiePolicy {
    pub fn session_cookie(&self, token: &AccessToken) -> String {
        self.cookie(token.as_str(), self.max_age_secs)
    }

    /// Cookie that clears the session token
    pub fn logout_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: u64) -> String {
        let secure = if self.secure { " Secure;" } else { "" };
        format!("{TOKEN_COOKIE}={value}; HttpOnly;{secure} SameSite=Strict; Max-Age={max_age}; Path=/")
    }
}

/// Extract the session token from the Authorization header or the cookie
pub fn extract_token(headers: &HeaderMap) -> Option<AccessToken> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let cookie = || {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .find_map(|cookie| cookie.trim().strip_prefix("token="))
    };

    bearer
        .or_else(cookie)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(AccessToken::new)
}

/// The signed-in session of the request, if its token is still accepted
pub async fn restore(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    let token = extract_token(headers)?;
    state
        .forseer
        .forseer()
        .restore_session(token)
        .await
        .inspect_err(|e| debug!("Stored session rejected: {e}"))
        .ok()
}

/// Sets the session cookie and moves on to `view`
pub fn sign_in(state: &AppState, session: &Session, view: View) -> Response {
    (
        [(header::SET_COOKIE, state.cookies.session_cookie(&session.token))],
        Redirect::to(&view.path()),
    )
        .into_response()
}

/// Drops the session cookie and returns to the login screen
pub fn sign_out(state: &AppState, view: View) -> Response {
    (
        [(header::SET_COOKIE, state.cookies.logout_cookie())],
        Redirect::to(&view.path()),
    )
        .into_response()
}

/// Middleware for the screens that need a signed-in user
///
/// Handlers behind it read the `Session` from the request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        return Redirect::to(&View::resolve(View::Portfolios, false).path()).into_response();
    };

    match state.forseer.forseer().restore_session(token).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(e) => {
            warn!("Session ended: {e}");
            sign_out(&state, View::landing(false))
        }
    }
}
