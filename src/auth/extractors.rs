use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use uuid::Uuid;

use crate::auth::middleware::SessionId;
use crate::auth::session::{Flash, Session};
use crate::state::AppState;

/// The request's session id plus a snapshot of its state. Always
/// available once the session middleware has run.
pub struct CurrentSession {
    pub id: Uuid,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionId(id) = parts.extensions.get::<SessionId>().copied().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session middleware not installed".to_string(),
        ))?;
        let session = state.sessions.get(id).ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session expired mid-request".to_string(),
        ))?;
        Ok(CurrentSession { id, session })
    }
}

/// The logged-in user, or a redirect to the login page with a flash
/// message when the session is anonymous.
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let current = CurrentSession::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;

        match (current.session.user_id, current.session.username) {
            (Some(id), Some(username)) if current.session.logged_in => {
                Ok(AuthUser { id, username })
            }
            _ => {
                state.sessions.set_flash(
                    current.id,
                    Flash::warning("Please login to access this page."),
                );
                Err(Redirect::to("/login").into_response())
            }
        }
    }
}
