use tracing::{debug, error, info, warn};

use super::session::{RestoreOutcome, Session, SharedSession};
use super::AuthError;
use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::models::{Credentials, LoginResponse, PasswordChange, UserProfile};

const LOGIN_PATH: &str = "/auth/login";
const CURRENT_USER_PATH: &str = "/auth/me";
const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";
const LOGOUT_PATH: &str = "/auth/logout";

/// Session lifecycle operations against the backend.
///
/// Holds the same `SharedSession` the request pipeline reads its token from.
#[derive(Clone)]
pub struct SessionManager {
    api: ApiClient,
    session: SharedSession,
}

impl SessionManager {
    pub fn new(api: ApiClient) -> Self {
        let session = api.session().clone();
        Self { api, session }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn snapshot(&self) -> Session {
        self.session.snapshot().await
    }

    pub async fn token(&self) -> Option<String> {
        self.session.token().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }

    pub async fn is_admin(&self) -> bool {
        self.session.snapshot().await.is_admin()
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.session.profile().await
    }

    /// Log in with a username and password.
    ///
    /// Returns `Ok(false)` when the backend rejected the credentials. Errors
    /// from this call never reach the notification sink; the caller renders
    /// its own feedback.
    pub async fn login(&self, credentials: &Credentials) -> Result<bool, AuthError> {
        let request = ApiRequest::post(LOGIN_PATH)
            .form(credentials.form())
            .suppress_global_handling();

        let response: LoginResponse = match self.api.send_json(request).await {
            Ok(response) => response,
            Err(ApiError::Unauthenticated(message)) => {
                info!(user = %credentials.username, reason = %message, "Login rejected");
                return Ok(false);
            }
            Err(e) => {
                error!(user = %credentials.username, error = %e, "Login failed");
                return Err(e.into());
            }
        };

        let token = response.access_token;
        self.session.establish(token.clone(), response.user).await?;
        info!(user = %credentials.username, "Login successful");

        // The profile embedded in the login response stays authoritative
        // unless the richer fetch succeeds.
        if let Err(e) = self.refresh_profile(&token).await {
            warn!(error = %e, "Post-login profile refresh failed, keeping login profile");
        }

        Ok(true)
    }

    async fn refresh_profile(&self, token: &str) -> Result<bool, AuthError> {
        let request = ApiRequest::get(CURRENT_USER_PATH).suppress_global_handling();
        let profile: UserProfile = self.api.send_json(request).await?;
        Ok(self.session.replace_profile(token, profile).await?)
    }

    /// Fetch the current user's full profile.
    ///
    /// Any failure is taken as proof the session is no longer valid and logs
    /// out. A response arriving after the session was cleared is dropped.
    pub async fn fetch_profile(&self) {
        let Some(token) = self.session.token().await else {
            debug!("Skipping profile fetch - not authenticated");
            return;
        };

        match self.api.get_json::<UserProfile>(CURRENT_USER_PATH).await {
            Ok(profile) => {
                if let Err(e) = self.session.replace_profile(&token, profile).await {
                    error!(error = %e, "Failed to persist refreshed profile");
                }
            }
            Err(e) => {
                warn!(error = %e, category = %e.category(), "Profile fetch failed, logging out");
                self.logout().await;
            }
        }
    }

    /// Clear the session and erase stored credentials. Safe to repeat.
    pub async fn logout(&self) {
        self.session.clear().await;
    }

    /// Tell the backend the session is over, then log out locally.
    pub async fn sign_out(&self) {
        if self.session.is_authenticated().await {
            let request = ApiRequest::post(LOGOUT_PATH).suppress_global_handling();
            if let Err(e) = self.api.send(request).await {
                debug!(error = %e, "Backend logout failed, clearing local session anyway");
            }
        }
        self.logout().await;
    }

    /// Rehydrate the session from stored credentials.
    pub async fn restore(&self) -> RestoreOutcome {
        let outcome = self.session.restore().await;
        debug!(outcome = ?outcome, "Session restore");
        outcome
    }

    /// Change the current user's password. The session token stays valid.
    ///
    /// Returns `Ok(false)` when the backend refused the change, e.g. because
    /// the current password was wrong.
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<bool, AuthError> {
        let body = PasswordChange {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        let request = ApiRequest::post(CHANGE_PASSWORD_PATH).json(&body)?;

        match self.api.send(request).await {
            Ok(_) => {
                info!("Password changed");
                Ok(true)
            }
            Err(ApiError::Unclassified { status: Some(400), .. }) | Err(ApiError::ValidationFailed(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
