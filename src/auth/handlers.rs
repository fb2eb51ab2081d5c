use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::instrument;

use crate::auth::dto::{CsrfForm, LoginForm, PageContext, RegisterForm};
use crate::auth::extractors::CurrentSession;
use crate::auth::middleware::session_cookie;
use crate::auth::service::{self, Registration};
use crate::auth::session::Flash;
use crate::auth::remember;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}

async fn index(current: CurrentSession) -> Redirect {
    if current.session.logged_in {
        Redirect::to("/dashboard")
    } else {
        Redirect::to("/login")
    }
}

/// Form page view-model, or a bounce to the dashboard when already
/// logged in.
fn form_page(state: &AppState, current: CurrentSession) -> Response {
    if current.session.logged_in {
        return Redirect::to("/dashboard").into_response();
    }
    let csrf_token = state.sessions.csrf_token(current.id).unwrap_or_default();
    let flash = state.sessions.take_flash(current.id);
    Json(PageContext { csrf_token, flash }).into_response()
}

async fn register_page(State(state): State<AppState>, current: CurrentSession) -> Response {
    form_page(&state, current)
}

async fn login_page(State(state): State<AppState>, current: CurrentSession) -> Response {
    form_page(&state, current)
}

#[instrument(skip_all)]
async fn register(
    State(state): State<AppState>,
    current: CurrentSession,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, AppError> {
    if !state.sessions.validate_csrf(current.id, &form.csrf_token) {
        return Err(AppError::Csrf);
    }

    service::register(
        &state.db,
        Registration {
            username: &form.username,
            email: &form.email,
            password: &form.password,
            confirm_password: &form.confirm_password,
        },
    )
    .await?;

    state.sessions.set_flash(
        current.id,
        Flash::success("Registration successful! You can now log in."),
    );
    Ok(Redirect::to("/login"))
}

#[instrument(skip_all)]
async fn login(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), AppError> {
    if !state.sessions.validate_csrf(current.id, &form.csrf_token) {
        return Err(AppError::Csrf);
    }

    let mut errors = Vec::new();
    if form.username.trim().is_empty() {
        errors.push("Username is required.".to_string());
    }
    if form.password.is_empty() {
        errors.push("Password is required.".to_string());
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let user = service::login(
        &state.db,
        &state.sessions,
        current.id,
        &form.username,
        &form.password,
    )
    .await?;

    let jar = if form.remember_me.is_some() {
        remember::issue(
            &state.db,
            jar,
            user.id,
            state.config.cookies.remember_ttl_days,
            state.config.cookies.secure,
        )
        .await?
    } else {
        jar
    };

    state
        .sessions
        .set_flash(current.id, Flash::success("Login successful!"));
    Ok((jar, Redirect::to("/dashboard")))
}

#[instrument(skip_all)]
async fn logout(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
    Form(form): Form<CsrfForm>,
) -> Result<(CookieJar, Redirect), AppError> {
    if !state.sessions.validate_csrf(current.id, &form.csrf_token) {
        return Err(AppError::Csrf);
    }

    if let Some(user_id) = current.session.user_id {
        remember::forget(&state.db, user_id).await?;
    }
    state.sessions.clear(current.id);

    // Flash lives on a fresh anonymous session so it survives the
    // redirect.
    let fresh = state.sessions.create();
    state.sessions.set_flash(
        fresh,
        Flash::success("You have been successfully logged out."),
    );
    let jar = remember::clear_cookies(jar)
        .add(session_cookie(fresh, state.config.cookies.secure));

    Ok((jar, Redirect::to("/login")))
}
