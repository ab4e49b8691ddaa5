// HTTP handlers for the interactive login flow

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::session::read_cookie;
use super::{AuthError, LoginSession, SessionAuth, LOGIN_SESSION, LOGIN_SESSION_MAX_AGE, USER_SESSION};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::state::AppState;
use crate::templates::{self, escape_html};

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
}

fn session_auth(state: &AppState) -> AppResult<&SessionAuth> {
    state
        .auth
        .session()
        .ok_or_else(|| AppError::Internal("interactive login is not configured".into()))
}

/// GET /login - Start the authorization code flow
pub async fn login(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let session = session_auth(&state)?;
    let oauth_state = Uuid::new_v4().to_string();

    let sealed = session.cookies.seal(
        &LoginSession {
            oauth_state: oauth_state.clone(),
        },
        LOGIN_SESSION_MAX_AGE,
    )?;
    let cookie = session
        .cookies
        .set_cookie(LOGIN_SESSION, &sealed, LOGIN_SESSION_MAX_AGE, false)?;

    let url = session.provider.authorize_url(&oauth_state);
    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Redirect::temporary(&url)).into_response())
}

/// GET /callback - Return leg from the identity provider
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let session = session_auth(&state)?;

    let expected = read_cookie(&headers, LOGIN_SESSION)
        .and_then(|raw| session.cookies.open::<LoginSession>(raw))
        .map(|login| login.oauth_state);
    match (&expected, &params.state) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => {
            warn!("OAuth state mismatch on callback");
            metrics::LOGINS.with_label_values(&["state_mismatch"]).inc();
            return Err(AuthError::StateMismatch.into());
        }
    }
    let clear_login = session.cookies.clear_cookie(LOGIN_SESSION)?;

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("missing authorization code".into()))?;
    let profile = session.provider.fetch_profile(&code).await?;

    match state.auth.complete_login(&profile.email) {
        Ok(grant) => {
            info!("Login completed");
            metrics::LOGINS.with_label_values(&["ok"]).inc();
            Ok((
                AppendHeaders([(SET_COOKIE, clear_login), (SET_COOKIE, grant.cookie)]),
                Redirect::temporary("/token"),
            )
                .into_response())
        }
        Err(AuthError::Forbidden { email }) => {
            metrics::LOGINS.with_label_values(&["forbidden"]).inc();
            let clear_user = session.cookies.clear_cookie(USER_SESSION)?;
            Ok((
                StatusCode::FORBIDDEN,
                AppendHeaders([(SET_COOKIE, clear_login), (SET_COOKIE, clear_user)]),
                Html(templates::forbidden(&email)),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /logout - Clear the user session
pub async fn logout(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let session = session_auth(&state)?;
    let cookie = session.cookies.clear_cookie(USER_SESSION)?;
    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Html(templates::LOGGED_OUT)).into_response())
}

/// GET /token - Show the bearer token for the current session
pub async fn token(State(state): State<Arc<AppState>>, headers: HeaderMap) -> AppResult<Html<String>> {
    let user = state.auth.read_user_session(&headers);
    let email = user.as_ref().map(|u| u.email.as_str());
    let token = match email {
        Some(email) => state.auth.issue_token(email)?,
        None => None,
    };
    Ok(Html(templates::token_page(email, token.as_deref())))
}

/// GET /profile - Debug view of the authentication state
pub async fn profile(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Html<String> {
    let mut page = String::new();
    if let Some(user) = state.auth.read_user_session(&headers) {
        page.push_str(&format!("session[\"email\"]: {}<br>\n", escape_html(&user.email)));
        page.push_str(&format!("session[\"hash\"]: {}<br>\n", escape_html(&user.hash)));
    }
    match state.auth.authenticate(&headers) {
        Ok(hash) => page.push_str(&format!(
            "Authenticated<br>User hash: {}.<br><a href='/logout'>Log out</a>.",
            escape_html(&hash)
        )),
        Err(e) => page.push_str(&format!(
            "Not authenticated: {}.<br><a href='/login'>Log in</a>.",
            escape_html(&e.to_string())
        )),
    }
    Html(page)
}
