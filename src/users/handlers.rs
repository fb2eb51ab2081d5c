use axum::{
    extract::{Path, State},
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument};

use crate::auth::dto::CsrfForm;
use crate::auth::extractors::{AuthUser, CurrentSession};
use crate::auth::middleware::session_cookie;
use crate::auth::remember;
use crate::auth::service;
use crate::auth::session::Flash;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::dto::{DashboardPage, PasswordForm, ProfileForm, ProfilePage};
use crate::users::repo::{ProfileUpdate, User, UserListItem, UserWithProfile};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/profile", get(profile_page).post(update_profile))
        .route("/password", post(change_password))
        .route("/users", get(list_users))
        .route("/users/:id/delete", post(delete_user))
}

fn is_valid_url(candidate: &str) -> bool {
    lazy_static! {
        static ref URL_RE: Regex = Regex::new(r"^https?://\S+$").unwrap();
    }
    URL_RE.is_match(candidate)
}

fn none_if_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Joined record for the logged-in user; a stale session pointing at
/// a deleted user surfaces as not-found.
async fn current_user_record(
    state: &AppState,
    user_id: i64,
) -> Result<UserWithProfile, AppError> {
    UserWithProfile::find(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".into()))
}

#[instrument(skip_all)]
async fn dashboard(
    State(state): State<AppState>,
    current: CurrentSession,
    user: AuthUser,
) -> Result<Json<DashboardPage>, AppError> {
    let record = current_user_record(&state, user.id).await?;
    let users = UserListItem::list_newest_first(&state.db).await?;
    Ok(Json(DashboardPage {
        user: record,
        users,
        csrf_token: state.sessions.csrf_token(current.id).unwrap_or_default(),
        flash: state.sessions.take_flash(current.id),
    }))
}

#[instrument(skip_all)]
async fn profile_page(
    State(state): State<AppState>,
    current: CurrentSession,
    user: AuthUser,
) -> Result<Json<ProfilePage>, AppError> {
    let record = current_user_record(&state, user.id).await?;
    Ok(Json(ProfilePage {
        user: record,
        csrf_token: state.sessions.csrf_token(current.id).unwrap_or_default(),
        flash: state.sessions.take_flash(current.id),
    }))
}

#[instrument(skip_all)]
async fn update_profile(
    State(state): State<AppState>,
    current: CurrentSession,
    user: AuthUser,
    Form(form): Form<ProfileForm>,
) -> Result<Redirect, AppError> {
    if !state.sessions.validate_csrf(current.id, &form.csrf_token) {
        return Err(AppError::Csrf);
    }

    let website = none_if_empty(&form.website);
    if let Some(ref url) = website {
        if !is_valid_url(url) {
            return Err(AppError::Validation(vec![
                "Please enter a valid website URL.".to_string(),
            ]));
        }
    }

    ProfileUpdate {
        full_name: none_if_empty(&form.full_name),
        bio: none_if_empty(&form.bio),
        website,
    }
    .apply(&state.db, user.id)
    .await?;

    info!(user_id = user.id, "profile updated");
    state
        .sessions
        .set_flash(current.id, Flash::success("Profile updated successfully!"));
    Ok(Redirect::to("/profile"))
}

#[instrument(skip_all)]
async fn change_password(
    State(state): State<AppState>,
    current: CurrentSession,
    user: AuthUser,
    Form(form): Form<PasswordForm>,
) -> Result<Redirect, AppError> {
    if !state.sessions.validate_csrf(current.id, &form.csrf_token) {
        return Err(AppError::Csrf);
    }

    service::change_password(
        &state.db,
        user.id,
        &form.current_password,
        &form.new_password,
        &form.confirm_password,
    )
    .await?;

    state
        .sessions
        .set_flash(current.id, Flash::success("Password changed successfully!"));
    Ok(Redirect::to("/profile"))
}

#[instrument(skip_all)]
async fn list_users(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<UserListItem>>, AppError> {
    let users = UserListItem::list_newest_first(&state.db).await?;
    Ok(Json(users))
}

#[instrument(skip_all)]
async fn delete_user(
    State(state): State<AppState>,
    current: CurrentSession,
    user: AuthUser,
    Path(target_id): Path<i64>,
    jar: CookieJar,
    Form(form): Form<CsrfForm>,
) -> Result<(CookieJar, Redirect), AppError> {
    if !state.sessions.validate_csrf(current.id, &form.csrf_token) {
        return Err(AppError::Csrf);
    }

    if !User::delete(&state.db, target_id).await? {
        return Err(AppError::NotFound("User not found.".into()));
    }
    info!(user_id = target_id, deleted_by = user.id, "user deleted");

    if target_id == user.id {
        // Deleting yourself ends the session; remember-me rows went
        // with the user via the FK cascade.
        state.sessions.clear(current.id);
        let fresh = state.sessions.create();
        state
            .sessions
            .set_flash(fresh, Flash::success("Your account has been deleted."));
        let jar = remember::clear_cookies(jar)
            .add(session_cookie(fresh, state.config.cookies.secure));
        return Ok((jar, Redirect::to("/login")));
    }

    state
        .sessions
        .set_flash(current.id, Flash::success("User deleted successfully!"));
    Ok((jar, Redirect::to("/dashboard")))
}
