use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};

use crate::auth::session::{constant_time_eq, random_hex};
use crate::error::AppError;

/// Cookie carrying the decimal user id.
pub const USER_COOKIE: &str = "remember_user";
/// Cookie carrying the opaque token (64 hex chars).
pub const TOKEN_COOKIE: &str = "remember_token";

const TOKEN_BYTES: usize = 32;

/// Server-side fingerprint of the cookie token. The plaintext token
/// only ever lives in the browser.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn long_lived(name: &'static str, value: String, ttl_days: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(ttl_days))
        .build()
}

/// Issue a fresh remember-me credential for `user_id`: a new random
/// token, its hash upserted server-side, and both cookies set. Called
/// on login with "remember me" and again on every successful restore,
/// which is what rotates the token.
pub async fn issue(
    db: &SqlitePool,
    jar: CookieJar,
    user_id: i64,
    ttl_days: i64,
    secure: bool,
) -> Result<CookieJar, AppError> {
    let token = random_hex(TOKEN_BYTES);
    let expires_at = OffsetDateTime::now_utc() + Duration::days(ttl_days);

    sqlx::query(
        r#"
        INSERT INTO remember_tokens (user_id, token_hash, expires_at)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            token_hash = excluded.token_hash,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(expires_at)
    .execute(db)
    .await?;

    Ok(jar
        .add(long_lived(USER_COOKIE, user_id.to_string(), ttl_days, secure))
        .add(long_lived(TOKEN_COOKIE, token, ttl_days, secure)))
}

/// True iff `token` matches the stored, unexpired credential for
/// `user_id`. The id cookie alone never restores a session.
pub async fn validate(db: &SqlitePool, user_id: i64, token: &str) -> Result<bool, AppError> {
    let row: Option<(String, OffsetDateTime)> =
        sqlx::query_as("SELECT token_hash, expires_at FROM remember_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(db)
            .await?;

    match row {
        Some((stored_hash, expires_at)) if expires_at > OffsetDateTime::now_utc() => {
            Ok(constant_time_eq(&stored_hash, &hash_token(token)))
        }
        _ => Ok(false),
    }
}

/// Drop the server-side credential for a user (logout, account
/// deletion is handled by the FK cascade).
pub async fn forget(db: &SqlitePool, user_id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM remember_tokens WHERE user_id = ?")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Expire both cookies in the browser.
pub fn clear_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(USER_COOKIE).path("/"))
        .remove(Cookie::build(TOKEN_COOKIE).path("/"))
}
