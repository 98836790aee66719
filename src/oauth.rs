use serde::Deserialize;
use url::Url;

use crate::config::AuthConfig;
use crate::error::Error;

/// HTTP client for the identity provider's authorize, token and logout endpoints.
#[derive(Debug, Clone)]
pub struct AuthClient {
    config: AuthConfig,
    http: reqwest::Client,
}

/// Token response from the provider's token endpoint.
///
/// `access_token`, `id_token` and `expires_in` are required; a response without
/// them fails to deserialize and the exchange is treated as failed.
#[derive(Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (timeouts, connection pool reuse, testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the authorization URL for a prepared `state` and S256 `code_challenge`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no redirect URI is configured.
    pub fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<Url, Error> {
        let redirect_uri = self.require_redirect_uri()?;
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `code_verifier` is attached when present. With a configured client
    /// secret the request carries HTTP Basic `client_id:client_secret`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] without a redirect URI, [`Error::Http`] on
    /// network or decode failure, or [`Error::OAuth`] if the token endpoint
    /// answers with a non-success status.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, Error> {
        let redirect_uri = self.require_redirect_uri()?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let mut request = self.http.post(self.config.token_url.clone()).form(&params);
        if let Some(secret) = &self.config.client_secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }

        let response = request.send().await?;
        let response = Self::ensure_success(response, "token exchange").await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    /// Build the provider logout URL: `{logout_url}?client_id=&logout_uri=`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the logout endpoint or the logout redirect
    /// is not configured.
    pub fn logout_url(&self) -> Result<Url, Error> {
        let (Some(logout_url), Some(logout_redirect)) =
            (&self.config.logout_url, &self.config.logout_redirect)
        else {
            return Err(Error::Config(
                "logout URL and logout redirect must both be configured".into(),
            ));
        };

        let mut url = logout_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("logout_uri", logout_redirect.as_str());
        Ok(url)
    }

    fn require_redirect_uri(&self) -> Result<&Url, Error> {
        self.config
            .redirect_uri
            .as_ref()
            .ok_or_else(|| Error::Config("redirect URI is not configured".into()))
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}
