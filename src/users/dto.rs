use serde::{Deserialize, Serialize};

use crate::auth::session::Flash;
use crate::users::repo::{UserListItem, UserWithProfile};

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub csrf_token: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub website: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub csrf_token: String,
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// View-model for the profile page: the joined user record plus what
/// the forms need.
#[derive(Debug, Serialize)]
pub struct ProfilePage {
    pub user: UserWithProfile,
    pub csrf_token: String,
    pub flash: Option<Flash>,
}

/// View-model for the dashboard: the current user and the full user
/// listing, newest first.
#[derive(Debug, Serialize)]
pub struct DashboardPage {
    pub user: UserWithProfile,
    pub users: Vec<UserListItem>,
    pub csrf_token: String,
    pub flash: Option<Flash>,
}
