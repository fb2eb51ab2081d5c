use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;

use crate::error::AppError;

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// User joined with its profile row, as shown on the profile page.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserWithProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
}

/// Row of the admin-style user listing.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserListItem {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub full_name: Option<String>,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
}

/// Map a unique-constraint violation to the user-facing conflict
/// message. The constraint is the authoritative uniqueness check; any
/// pre-flight availability lookup is advisory only.
fn conflict_from(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            let msg = db_err.message();
            return if msg.contains("users.email") {
                AppError::conflict("Email address is already registered. Please use another.")
            } else {
                AppError::conflict("Username is already taken. Please choose another.")
            };
        }
    }
    AppError::Store(e)
}

impl User {
    /// Insert the user and its empty profile as one transaction: both
    /// rows land or neither does.
    pub async fn create_with_profile(
        db: &SqlitePool,
        new: NewUser<'_>,
    ) -> Result<User, AppError> {
        let now = OffsetDateTime::now_utc();
        let mut tx = db.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_from)?;

        sqlx::query("INSERT INTO profiles (user_id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(user.id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    pub async fn find_by_username(
        db: &SqlitePool,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn update_password_hash(
        db: &SqlitePool,
        id: i64,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Delete a user; the profile row (and any remember-me token) goes
    /// with it via ON DELETE CASCADE. Returns false when no such user.
    pub async fn delete(db: &SqlitePool, id: i64) -> Result<bool, AppError> {
        let mut tx = db.begin().await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }
}

impl UserWithProfile {
    pub async fn find(db: &SqlitePool, id: i64) -> Result<Option<UserWithProfile>, AppError> {
        let row = sqlx::query_as::<_, UserWithProfile>(
            r#"
            SELECT u.id, u.username, u.email, u.created_at,
                   p.full_name, p.bio, p.website
            FROM users u
            LEFT JOIN profiles p ON p.user_id = u.id
            WHERE u.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }
}

impl UserListItem {
    pub async fn list_newest_first(db: &SqlitePool) -> Result<Vec<UserListItem>, AppError> {
        let rows = sqlx::query_as::<_, UserListItem>(
            r#"
            SELECT u.id, u.username, u.email, u.created_at, p.full_name
            FROM users u
            LEFT JOIN profiles p ON p.user_id = u.id
            ORDER BY u.id DESC
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}

impl ProfileUpdate {
    pub async fn apply(&self, db: &SqlitePool, user_id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET full_name = ?, bio = ?, website = ?, updated_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(self.full_name.as_deref())
        .bind(self.bio.as_deref())
        .bind(self.website.as_deref())
        .bind(OffsetDateTime::now_utc())
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::memory_pool;

    async fn insert_user(db: &SqlitePool, username: &str, email: &str) -> User {
        User::create_with_profile(
            db,
            NewUser {
                username,
                email,
                password_hash: "$argon2$fake",
            },
        )
        .await
        .expect("create user")
    }

    #[tokio::test]
    async fn create_then_fetch_joined_has_empty_profile() {
        let db = memory_pool().await;
        let user = insert_user(&db, "alice", "alice@example.com").await;

        let joined = UserWithProfile::find(&db, user.id)
            .await
            .unwrap()
            .expect("joined row");
        assert_eq!(joined.username, "alice");
        assert!(joined.full_name.is_none());
        assert!(joined.bio.is_none());
        assert!(joined.website.is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let db = memory_pool().await;
        insert_user(&db, "alice", "alice@example.com").await;

        let err = User::create_with_profile(
            &db,
            NewUser {
                username: "alice",
                email: "other@example.com",
                password_hash: "$argon2$fake",
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("Username")));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let db = memory_pool().await;
        insert_user(&db, "alice", "alice@example.com").await;

        let err = User::create_with_profile(
            &db,
            NewUser {
                username: "bob",
                email: "alice@example.com",
                password_hash: "$argon2$fake",
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("Email")));
    }

    #[tokio::test]
    async fn conflicting_insert_leaves_no_partial_rows() {
        let db = memory_pool().await;
        insert_user(&db, "alice", "alice@example.com").await;

        let _ = User::create_with_profile(
            &db,
            NewUser {
                username: "alice",
                email: "second@example.com",
                password_hash: "$argon2$fake",
            },
        )
        .await;

        let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&db)
            .await
            .unwrap();
        let (profiles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(users, 1);
        assert_eq!(profiles, 1);
    }

    #[tokio::test]
    async fn profile_update_roundtrip() {
        let db = memory_pool().await;
        let user = insert_user(&db, "alice", "alice@example.com").await;

        ProfileUpdate {
            full_name: Some("Alice A.".into()),
            bio: Some("hello".into()),
            website: Some("https://example.com".into()),
        }
        .apply(&db, user.id)
        .await
        .unwrap();

        let joined = UserWithProfile::find(&db, user.id).await.unwrap().unwrap();
        assert_eq!(joined.full_name.as_deref(), Some("Alice A."));
        assert_eq!(joined.bio.as_deref(), Some("hello"));
        assert_eq!(joined.website.as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn delete_cascades_to_profile() {
        let db = memory_pool().await;
        let user = insert_user(&db, "alice", "alice@example.com").await;

        assert!(User::delete(&db, user.id).await.unwrap());
        assert!(!User::delete(&db, user.id).await.unwrap());

        let (profiles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(profiles, 0);
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let db = memory_pool().await;
        insert_user(&db, "first", "first@example.com").await;
        insert_user(&db, "second", "second@example.com").await;
        insert_user(&db, "third", "third@example.com").await;

        let listed = UserListItem::list_newest_first(&db).await.unwrap();
        let names: Vec<_> = listed.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["third", "second", "first"]);
    }
}
