//! Authentication session controller.
//!
//! [`AuthSession`] owns the in-memory session state and everything persisted
//! for it. It moves through three phases:
//!
//! ```text
//! Initializing ──initialize()──▶ Authenticated ◀──callback ok── Unauthenticated
//!              └───────────────▶ Unauthenticated ◀──logout()─── Authenticated
//! ```

use crate::config::AuthConfig;
use crate::error::Error;
use crate::navigator::Navigator;
use crate::oauth::AuthClient;
use crate::pkce;
use crate::storage::Storage;
use crate::token_store::{TokenRecord, TokenStore, now_millis};

/// In-memory session state.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub access_token: Option<String>,
}

impl SessionState {
    fn initializing() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    fn authenticated(access_token: String) -> Self {
        Self {
            is_authenticated: true,
            is_loading: false,
            access_token: Some(access_token),
        }
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("is_authenticated", &self.is_authenticated)
            .field("is_loading", &self.is_loading)
            .field("has_access_token", &self.access_token.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// OAuth2 Authorization Code + PKCE session controller.
///
/// Passed explicitly to whatever needs it (typically a [`RouteGuard`](crate::RouteGuard));
/// there is no ambient global session.
pub struct AuthSession<D, S, N> {
    client: AuthClient,
    tokens: TokenStore<D, S>,
    navigator: N,
    state: SessionState,
}

/// Clears the `isLoggingIn` marker when dropped, so every exit from a
/// callback (including a dropped future) releases it.
struct LoggingInRelease<'a, D: Storage, S: Storage>(&'a TokenStore<D, S>);

impl<D: Storage, S: Storage> Drop for LoggingInRelease<'_, D, S> {
    fn drop(&mut self) {
        self.0.clear_logging_in();
    }
}

impl<D: Storage, S: Storage, N: Navigator> AuthSession<D, S, N> {
    #[must_use]
    pub fn new(client: AuthClient, tokens: TokenStore<D, S>, navigator: N) -> Self {
        Self {
            client,
            tokens,
            navigator,
            state: SessionState::initializing(),
        }
    }

    /// Restore the session from persisted tokens. Run once per page load.
    pub fn initialize(&mut self) {
        self.state = match self.tokens.load() {
            Some(record) => SessionState::authenticated(record.access_token),
            None => SessionState::default(),
        };
        tracing::debug!(authenticated = self.state.is_authenticated, "Auth session initialized");
    }

    /// Start the authorization flow with a full-page navigation.
    ///
    /// The `isLoggingIn` marker is set before anything else so a concurrent
    /// caller can see a redirect is already underway.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] (after clearing the marker) if no redirect URI
    /// is configured. There is no fallback redirect target.
    pub fn login(&self) -> Result<(), Error> {
        self.tokens.set_logging_in();

        if self.client.config().redirect_uri().is_none() {
            self.tokens.clear_logging_in();
            tracing::error!("Login aborted: redirect URI is not configured");
            return Err(Error::Config("redirect URI is not configured".into()));
        }

        let state = pkce::generate_state();
        let verifier = pkce::generate_code_verifier();
        self.tokens.store_state(&state);
        self.tokens.store_verifier(&verifier);

        let challenge = pkce::generate_code_challenge(&verifier);
        let url = self
            .client
            .authorization_url(&state, &challenge)
            .inspect_err(|e| {
                self.tokens.clear_logging_in();
                tracing::error!(error = %e, "Login aborted");
            })?;

        tracing::info!("Redirecting to identity provider for login");
        self.navigator.navigate(&url);
        Ok(())
    }

    /// End the session locally and at the identity provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the logout endpoint or logout redirect is
    /// missing. Nothing is cleared and no navigation happens in that case.
    pub fn logout(&mut self) -> Result<(), Error> {
        let logout_url = self.client.logout_url().inspect_err(|e| {
            tracing::error!(error = %e, "Logout aborted");
        })?;

        self.tokens.set_just_logged_out();
        self.state = SessionState::default();
        self.tokens.clear();

        tracing::info!("Logged out; redirecting to identity provider");
        self.navigator.navigate(&logout_url);
        Ok(())
    }

    /// Complete the authorization code flow for a callback `code` and `state`.
    ///
    /// Returns `true` once tokens are persisted and the session is
    /// authenticated. On any failure the session is left unchanged. The stored
    /// CSRF state and PKCE verifier are consumed either way, and the
    /// `isLoggingIn` marker is always cleared.
    pub async fn handle_auth_callback(&mut self, code: &str, state: &str) -> bool {
        let _release = LoggingInRelease(&self.tokens);

        match Self::complete_callback(&self.client, &self.tokens, code, state).await {
            Ok(record) => {
                self.state = SessionState::authenticated(record.access_token);
                tracing::info!("OAuth2 login successful");
                true
            }
            Err(Error::StateMismatch) => {
                tracing::warn!("OAuth state mismatch; possible CSRF attempt");
                false
            }
            Err(Error::OAuth { status, detail, .. }) => {
                tracing::error!(?status, body = %detail, "Token exchange rejected");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Token exchange failed");
                false
            }
        }
    }

    async fn complete_callback(
        client: &AuthClient,
        tokens: &TokenStore<D, S>,
        code: &str,
        state: &str,
    ) -> Result<TokenRecord, Error> {
        let stored_state = tokens.stored_state();
        tokens.remove_state();

        if stored_state.as_deref() != Some(state) {
            let _ = tokens.take_verifier();
            return Err(Error::StateMismatch);
        }

        let verifier = tokens.take_verifier();
        let response = client.exchange_code(code, verifier.as_deref()).await?;

        let record = TokenRecord::from_response(&response, now_millis());
        tokens.save(&record);
        Ok(record)
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.state.is_loading {
            SessionPhase::Initializing
        } else if self.state.is_authenticated {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.state.access_token.as_deref()
    }

    /// Whether a login redirect is already underway.
    #[must_use]
    pub fn is_logging_in(&self) -> bool {
        self.tokens.is_logging_in()
    }

    /// Consume the `justLoggedOut` marker.
    #[must_use]
    pub fn take_just_logged_out(&self) -> bool {
        self.tokens.take_just_logged_out()
    }

    pub(crate) fn clear_logging_in(&self) {
        self.tokens.clear_logging_in();
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        self.client.config()
    }

    #[must_use]
    pub fn navigator(&self) -> &N {
        &self.navigator
    }
}
