use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::error;
use uuid::Uuid;

use crate::auth::{remember, service};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_id";

/// The resolved session id for the current request, inserted into
/// request extensions by [`session_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct SessionId(pub Uuid);

pub(crate) fn session_cookie(id: Uuid, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Resolves the browser's session before any handler runs. A valid
/// `session_id` cookie maps to its live session; otherwise a fresh
/// anonymous session is created and, when a remember-me cookie pair is
/// present, a restore is attempted: on success the credential is
/// rotated, on failure both cookies are expired.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let secure = state.config.cookies.secure;
    let mut out = jar.clone();

    let live = jar
        .get(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok())
        .filter(|id| state.sessions.get(*id).is_some());

    let session_id = match live {
        Some(id) => id,
        None => {
            let id = state.sessions.create();
            out = out.add(session_cookie(id, secure));

            let remembered_user = jar
                .get(remember::USER_COOKIE)
                .and_then(|c| c.value().parse::<i64>().ok());
            let remembered_token = jar
                .get(remember::TOKEN_COOKIE)
                .map(|c| c.value().to_string());

            match (remembered_user, remembered_token) {
                (Some(user_id), Some(token)) => {
                    match service::restore_session(&state.db, &state.sessions, id, user_id, &token)
                        .await
                    {
                        Ok(Some(user)) => {
                            // Rotate: a restore consumes the token.
                            match remember::issue(
                                &state.db,
                                out.clone(),
                                user.id,
                                state.config.cookies.remember_ttl_days,
                                secure,
                            )
                            .await
                            {
                                Ok(jar) => out = jar,
                                Err(e) => {
                                    error!(error = %e, "remember-me rotation failed")
                                }
                            }
                        }
                        Ok(None) => out = remember::clear_cookies(out),
                        Err(e) => error!(error = %e, "remember-me restore failed"),
                    }
                }
                (None, None) => {}
                // Half a cookie pair is useless; drop whichever is left.
                _ => out = remember::clear_cookies(out),
            }
            id
        }
    };

    req.extensions_mut().insert(SessionId(session_id));
    let response = next.run(req).await;
    (out, response).into_response()
}
