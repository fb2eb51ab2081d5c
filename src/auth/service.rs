use lazy_static::lazy_static;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::{burn_verification, hash_password, verify_password};
use crate::auth::remember;
use crate::auth::session::SessionManager;
use crate::error::AppError;
use crate::users::repo::{NewUser, User};

/// Shared failure message for login: never reveals whether the
/// username exists.
pub const INVALID_CREDENTIALS: &str = "Invalid username or password.";

pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Register a new account. Field checks short-circuit within a field
/// but every failing field contributes its message before anything is
/// written; the availability lookups here are advisory — the unique
/// constraints at insert time are what actually decide a conflict.
pub async fn register(db: &SqlitePool, reg: Registration<'_>) -> Result<User, AppError> {
    let username = reg.username.trim();
    let email = reg.email.trim();
    let mut errors = Vec::new();

    if username.is_empty() {
        errors.push("Username is required.".to_string());
    } else if username.len() < 3 || username.len() > 20 {
        errors.push("Username must be between 3 and 20 characters.".to_string());
    } else if !is_valid_username(username) {
        errors.push("Username can only contain letters, numbers, and underscores.".to_string());
    } else if User::find_by_username(db, username).await?.is_some() {
        errors.push("Username is already taken. Please choose another.".to_string());
    }

    if email.is_empty() {
        errors.push("Email is required.".to_string());
    } else if !is_valid_email(email) {
        errors.push("Please enter a valid email address.".to_string());
    } else if User::find_by_email(db, email).await?.is_some() {
        errors.push("Email address is already registered. Please use another.".to_string());
    }

    if reg.password.is_empty() {
        errors.push("Password is required.".to_string());
    } else if reg.password.len() < 8 {
        errors.push("Password must be at least 8 characters long.".to_string());
    }

    if reg.password != reg.confirm_password {
        errors.push("Passwords do not match.".to_string());
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let password_hash = hash_password(reg.password)?;
    let user = User::create_with_profile(
        db,
        NewUser {
            username,
            email,
            password_hash: &password_hash,
        },
    )
    .await?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Authenticate and transition the session to logged-in. Unknown user
/// and wrong password are indistinguishable to the caller, and the
/// unknown-user path still pays for a hash verification.
pub async fn login(
    db: &SqlitePool,
    sessions: &SessionManager,
    session_id: Uuid,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    let user = match User::find_by_username(db, username.trim()).await? {
        Some(user) => user,
        None => {
            burn_verification(password);
            warn!(username = %username.trim(), "login for unknown username");
            return Err(AppError::auth(INVALID_CREDENTIALS));
        }
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = user.id, "login with wrong password");
        return Err(AppError::auth(INVALID_CREDENTIALS));
    }

    sessions.login(session_id, user.id, &user.username);
    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(user)
}

/// Change a password after re-proving the current one. The stored
/// hash is untouched unless every check passes.
pub async fn change_password(
    db: &SqlitePool,
    user_id: i64,
    current_password: &str,
    new_password: &str,
    confirm_password: &str,
) -> Result<(), AppError> {
    let mut errors = Vec::new();

    if current_password.is_empty() {
        errors.push("Current password is required.".to_string());
    }

    if new_password.is_empty() {
        errors.push("New password is required.".to_string());
    } else if new_password.len() < 8 {
        errors.push("New password must be at least 8 characters long.".to_string());
    }

    if new_password != confirm_password {
        errors.push("New passwords do not match.".to_string());
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let user = User::find_by_id(db, user_id)
        .await?
        .ok_or_else(|| AppError::auth("Current password is incorrect."))?;

    if !verify_password(current_password, &user.password_hash)? {
        warn!(user_id, "password change with wrong current password");
        return Err(AppError::auth("Current password is incorrect."));
    }

    let password_hash = hash_password(new_password)?;
    User::update_password_hash(db, user_id, &password_hash).await?;
    info!(user_id, "password changed");
    Ok(())
}

/// Re-establish a session from the remember-me cookie pair. The token
/// must match the stored hash; the id cookie alone proves nothing.
/// Returns the user so the caller can rotate the credential.
pub async fn restore_session(
    db: &SqlitePool,
    sessions: &SessionManager,
    session_id: Uuid,
    user_id: i64,
    token: &str,
) -> Result<Option<User>, AppError> {
    if !remember::validate(db, user_id, token).await? {
        warn!(user_id, "remember-me token rejected");
        return Ok(None);
    }

    let user = match User::find_by_id(db, user_id).await? {
        Some(user) => user,
        None => return Ok(None),
    };

    sessions.login(session_id, user.id, &user.username);
    info!(user_id = user.id, "session restored from remember-me");
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::memory_pool;
    use axum_extra::extract::cookie::CookieJar;
    use time::Duration;

    fn sessions() -> SessionManager {
        SessionManager::new(Duration::hours(1))
    }

    fn reg<'a>(username: &'a str, email: &'a str, password: &'a str) -> Registration<'a> {
        Registration {
            username,
            email,
            password,
            confirm_password: password,
        }
    }

    #[tokio::test]
    async fn register_succeeds_once_per_username_and_email() {
        let db = memory_pool().await;
        register(&db, reg("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        let err = register(&db, reg("alice", "different@example.com", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msgs)
            if msgs == &["Username is already taken. Please choose another.".to_string()]));
    }

    #[tokio::test]
    async fn register_accumulates_errors_across_fields() {
        let db = memory_pool().await;
        let err = register(
            &db,
            Registration {
                username: "a!",
                email: "not-an-email",
                password: "short",
                confirm_password: "other",
            },
        )
        .await
        .unwrap_err();

        let AppError::Validation(msgs) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            msgs,
            vec![
                "Username must be between 3 and 20 characters.".to_string(),
                "Please enter a valid email address.".to_string(),
                "Password must be at least 8 characters long.".to_string(),
                "Passwords do not match.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn register_rejects_bad_username_charset() {
        let db = memory_pool().await;
        let err = register(&db, reg("has space", "a@example.com", "password123"))
            .await
            .unwrap_err();
        let AppError::Validation(msgs) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            msgs,
            vec!["Username can only contain letters, numbers, and underscores.".to_string()]
        );
    }

    #[tokio::test]
    async fn login_transitions_session_to_authenticated() {
        let db = memory_pool().await;
        let mgr = sessions();
        let sid = mgr.create();
        register(&db, reg("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        let user = login(&db, &mgr, sid, "alice", "password123").await.unwrap();
        let session = mgr.get(sid).unwrap();
        assert!(session.logged_in);
        assert_eq!(session.user_id, Some(user.id));
        assert_eq!(session.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn login_failure_is_generic_and_leaves_session_anonymous() {
        let db = memory_pool().await;
        let mgr = sessions();
        let sid = mgr.create();
        register(&db, reg("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        let wrong_pw = login(&db, &mgr, sid, "alice", "wrong-password")
            .await
            .unwrap_err();
        let no_user = login(&db, &mgr, sid, "nobody", "wrong-password")
            .await
            .unwrap_err();
        assert_eq!(wrong_pw.to_string(), INVALID_CREDENTIALS);
        assert_eq!(no_user.to_string(), INVALID_CREDENTIALS);

        let session = mgr.get(sid).unwrap();
        assert!(!session.logged_in);
        assert!(session.user_id.is_none());
    }

    #[tokio::test]
    async fn change_password_requires_the_current_one() {
        let db = memory_pool().await;
        let mgr = sessions();
        let sid = mgr.create();
        let user = register(&db, reg("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        let err = change_password(&db, user.id, "wrong", "new-password-1", "new-password-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));

        // Old password still works.
        login(&db, &mgr, sid, "alice", "password123").await.unwrap();
    }

    #[tokio::test]
    async fn change_password_swaps_which_password_logs_in() {
        let db = memory_pool().await;
        let mgr = sessions();
        let user = register(&db, reg("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        change_password(&db, user.id, "password123", "brand-new-pw", "brand-new-pw")
            .await
            .unwrap();

        let sid = mgr.create();
        assert!(login(&db, &mgr, sid, "alice", "password123").await.is_err());
        login(&db, &mgr, sid, "alice", "brand-new-pw").await.unwrap();
    }

    #[tokio::test]
    async fn change_password_validates_the_new_one() {
        let db = memory_pool().await;
        let user = register(&db, reg("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        let err = change_password(&db, user.id, "password123", "short", "short")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Hash untouched: validation failed before any verify/update.
        let mgr = sessions();
        let sid = mgr.create();
        login(&db, &mgr, sid, "alice", "password123").await.unwrap();
    }

    #[tokio::test]
    async fn restore_session_requires_a_matching_token() {
        let db = memory_pool().await;
        let mgr = sessions();
        let sid = mgr.create();
        let user = register(&db, reg("alice", "alice@example.com", "password123"))
            .await
            .unwrap();

        let jar = remember::issue(&db, CookieJar::new(), user.id, 30, false)
            .await
            .unwrap();
        let token = jar.get(remember::TOKEN_COOKIE).unwrap().value().to_string();

        // Wrong token: no restore, session stays anonymous.
        let denied = restore_session(&db, &mgr, sid, user.id, "bogus")
            .await
            .unwrap();
        assert!(denied.is_none());
        assert!(!mgr.get(sid).unwrap().logged_in);

        let restored = restore_session(&db, &mgr, sid, user.id, &token)
            .await
            .unwrap()
            .expect("restored");
        assert_eq!(restored.id, user.id);
        assert!(mgr.get(sid).unwrap().logged_in);
    }

    #[tokio::test]
    async fn restore_session_for_deleted_user_fails() {
        let db = memory_pool().await;
        let mgr = sessions();
        let sid = mgr.create();
        let user = register(&db, reg("alice", "alice@example.com", "password123"))
            .await
            .unwrap();
        let jar = remember::issue(&db, CookieJar::new(), user.id, 30, false)
            .await
            .unwrap();
        let token = jar.get(remember::TOKEN_COOKIE).unwrap().value().to_string();

        User::delete(&db, user.id).await.unwrap();

        let restored = restore_session(&db, &mgr, sid, user.id, &token).await.unwrap();
        assert!(restored.is_none());
    }
}
