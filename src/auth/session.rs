use std::collections::HashMap;

use parking_lot::RwLock;
use rand::RngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Bytes of randomness in a CSRF token (64 hex chars on the wire).
const CSRF_TOKEN_BYTES: usize = 32;

/// Hex-encoded random bytes from the OS RNG.
pub(crate) fn random_hex(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time string equality for secret comparison.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Warning,
    Danger,
}

/// One-shot message carried across a redirect.
#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub message: String,
    pub kind: FlashKind,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FlashKind::Success,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FlashKind::Warning,
        }
    }
}

/// Per-browser session state. Either fully logged-out (no user, flag
/// false) or fully logged-in (both fields set, flag true); `create`
/// and `login` are the only writers of those fields.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub logged_in: bool,
    csrf_token: Option<String>,
    flash: Option<Flash>,
    expires_at: OffsetDateTime,
}

/// Session-id-keyed store owned by the application state, replacing
/// any notion of ambient per-process session globals. TTL is supplied
/// by the caller; entries slide on access and are swept on create.
pub struct SessionManager {
    inner: RwLock<HashMap<Uuid, Session>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a fresh anonymous session and return its id. Expired
    /// entries are swept here so the map cannot grow unbounded without
    /// a background task.
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.write();
        inner.retain(|_, s| s.expires_at > now);
        inner.insert(
            id,
            Session {
                user_id: None,
                username: None,
                logged_in: false,
                csrf_token: None,
                flash: None,
                expires_at: now + self.ttl,
            },
        );
        id
    }

    /// Snapshot of a live session, sliding its expiry. `None` when the
    /// id is unknown or the session has expired.
    pub fn get(&self, id: Uuid) -> Option<Session> {
        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.write();
        match inner.get_mut(&id) {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + self.ttl;
                Some(session.clone())
            }
            Some(_) => {
                inner.remove(&id);
                None
            }
            None => None,
        }
    }

    /// Anonymous -> Authenticated. Sets user id, username and the
    /// logged-in flag together so no partial state is observable.
    pub fn login(&self, id: Uuid, user_id: i64, username: &str) {
        if let Some(session) = self.inner.write().get_mut(&id) {
            session.user_id = Some(user_id);
            session.username = Some(username.to_string());
            session.logged_in = true;
        }
    }

    /// Authenticated -> gone. Drops the entry entirely; the next
    /// request starts from a fresh anonymous session.
    pub fn clear(&self, id: Uuid) {
        self.inner.write().remove(&id);
    }

    /// The session's CSRF token, generating one on first use. Stable
    /// for the life of the session.
    pub fn csrf_token(&self, id: Uuid) -> Option<String> {
        let mut inner = self.inner.write();
        let session = inner.get_mut(&id)?;
        Some(
            session
                .csrf_token
                .get_or_insert_with(|| random_hex(CSRF_TOKEN_BYTES))
                .clone(),
        )
    }

    /// True iff `candidate` equals the session's stored token. Absent
    /// session or token, or any mismatch, is invalid.
    pub fn validate_csrf(&self, id: Uuid, candidate: &str) -> bool {
        let stored = match self.inner.read().get(&id) {
            Some(session) => session.csrf_token.clone(),
            None => None,
        };
        match stored {
            Some(token) => constant_time_eq(&token, candidate),
            None => false,
        }
    }

    pub fn set_flash(&self, id: Uuid, flash: Flash) {
        if let Some(session) = self.inner.write().get_mut(&id) {
            session.flash = Some(flash);
        }
    }

    /// Remove and return the pending flash message, if any.
    pub fn take_flash(&self, id: Uuid) -> Option<Flash> {
        self.inner.write().get_mut(&id)?.flash.take()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}
