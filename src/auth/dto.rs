use serde::{Deserialize, Serialize};

use crate::auth::session::Flash;

/// Registration form fields.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub csrf_token: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Login form fields. `remember_me` is a checkbox: present ("on")
/// when ticked, absent otherwise.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub csrf_token: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: Option<String>,
}

/// Body of POSTs that carry nothing but the CSRF token (logout,
/// delete).
#[derive(Debug, Deserialize)]
pub struct CsrfForm {
    pub csrf_token: String,
}

/// View-model for the anonymous pages (login, register): what the
/// rendering layer needs to draw the form.
#[derive(Debug, Serialize)]
pub struct PageContext {
    pub csrf_token: String,
    pub flash: Option<Flash>,
}
