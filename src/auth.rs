// Sign up / sign in / token refresh against `/auth/*`.
// Successful calls persist tokens and the user in the session.

use tracing::{info, warn};

use crate::{
    api::{ApiClient, ApiError},
    models::{AuthResponse, RefreshRequest, RefreshResponse, SignInRequest, SignUpRequest, User},
    session::{Destination, Session},
};

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn session(&self) -> &Session {
        self.api.session()
    }

    pub async fn signup(&self, request: &SignUpRequest) -> Result<AuthResponse, ApiError> {
        let response: AuthResponse = self.api.post("/auth/signup/", request).await?;
        self.session().store_auth(&response)?;
        info!(user_id = response.user.id, "signed up");
        Ok(response)
    }

    pub async fn signin(&self, request: &SignInRequest) -> Result<AuthResponse, ApiError> {
        let response: AuthResponse = self.api.post("/auth/signin/", request).await?;
        self.session().store_auth(&response)?;
        info!(user_id = response.user.id, "signed in");
        Ok(response)
    }

    pub async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse, ApiError> {
        let response: RefreshResponse = self.api.post("/auth/refresh/", request).await?;
        if !response.access.is_empty() {
            self.session().set_access_token(&response.access)?;
        }
        Ok(response)
    }

    /// Exchanges the stored refresh token for a new access token.
    ///
    /// Returns `None` without a stored refresh token. A failed exchange logs
    /// the user out.
    pub async fn refresh_token(&self) -> Option<String> {
        let refresh = self.session().refresh_token()?;

        match self.refresh(&RefreshRequest { refresh }).await {
            Ok(response) => Some(response.access),
            Err(err) => {
                warn!(error = %err, "token refresh failed, clearing session");
                self.logout();
                None
            }
        }
    }

    pub fn logout(&self) {
        if let Err(err) = self.session().clear() {
            warn!(error = %err, "failed to clear session");
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.session().user()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().access_token()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    pub fn select_destination(&self, destination: &Destination) -> Result<(), ApiError> {
        Ok(self.session().set_destination(destination)?)
    }

    pub fn destination(&self) -> Destination {
        self.session().destination()
    }
}
