use url::Url;

use crate::error::Error;

const DEFAULT_SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// Identity-provider and backend configuration.
///
/// Required fields (`client_id`, authorize and token endpoints) are constructor
/// parameters. Redirect and logout targets stay optional on purpose: the
/// operation that needs one refuses to run without it instead of guessing.
///
/// ```rust,ignore
/// use consignment_auth::AuthConfig;
///
/// let config = AuthConfig::new(
///     "my-client-id",
///     "https://auth.example.com/oauth2/authorize".parse()?,
///     "https://auth.example.com/oauth2/token".parse()?,
/// )
/// .with_redirect_uri("https://track.example.com/dashboard".parse()?)
/// .with_logout("https://auth.example.com/logout".parse()?, "https://track.example.com/".parse()?);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct AuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: Option<String>,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) redirect_uri: Option<Url>,
    pub(crate) logout_url: Option<Url>,
    pub(crate) logout_redirect: Option<Url>,
    pub(crate) api_base_url: Option<Url>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(client_id: impl Into<String>, auth_url: Url, token_url: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            auth_url,
            token_url,
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            redirect_uri: None,
            logout_url: None,
            logout_redirect: None,
            api_base_url: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `OAUTH_CLIENT_ID`: OAuth2 client ID
    /// - `OAUTH_AUTHORIZE_URL`: authorization endpoint
    /// - `OAUTH_TOKEN_URL`: token endpoint
    ///
    /// # Optional env vars
    /// - `OAUTH_CLIENT_SECRET`: enables HTTP Basic client authentication
    /// - `OAUTH_SCOPES`: space- or comma-separated scopes
    /// - `OAUTH_REDIRECT_URI`: callback URI (login refuses to run without it)
    /// - `OAUTH_LOGOUT_URL`, `OAUTH_LOGOUT_REDIRECT`: logout endpoint and return target
    /// - `API_BASE_URL`: backend API root
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required vars are missing or any URL is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values through `lookup`.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required values are missing or any URL is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| Error::Config(format!("{key} is required")));
        let url = |key: &str, raw: String| {
            raw.trim()
                .parse::<Url>()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        };
        let optional_url = |key: &str| get(key).map(|raw| url(key, raw)).transpose();

        let client_id = require("OAUTH_CLIENT_ID")?;
        let auth_url = url("OAUTH_AUTHORIZE_URL", require("OAUTH_AUTHORIZE_URL")?)?;
        let token_url = url("OAUTH_TOKEN_URL", require("OAUTH_TOKEN_URL")?)?;

        let mut config = Self::new(client_id, auth_url, token_url);
        config.client_secret = get("OAUTH_CLIENT_SECRET");
        config.redirect_uri = optional_url("OAUTH_REDIRECT_URI")?;
        config.logout_url = optional_url("OAUTH_LOGOUT_URL")?;
        config.logout_redirect = optional_url("OAUTH_LOGOUT_REDIRECT")?;
        config.api_base_url = optional_url("API_BASE_URL")?;

        if let Some(scopes) = get("OAUTH_SCOPES") {
            config = config.with_scopes(
                scopes
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }

        Ok(config)
    }

    /// Confidential-client secret, sent as HTTP Basic credentials on token exchange.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Override the OAuth2 scopes (default: `["openid", "email", "profile"]`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, url: Url) -> Self {
        self.redirect_uri = Some(url);
        self
    }

    /// Provider logout endpoint and the URI it should send the browser back to.
    #[must_use]
    pub fn with_logout(mut self, logout_url: Url, logout_redirect: Url) -> Self {
        self.logout_url = Some(logout_url);
        self.logout_redirect = Some(logout_redirect);
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: Url) -> Self {
        self.api_base_url = Some(url);
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn has_client_secret(&self) -> bool {
        self.client_secret.is_some()
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn redirect_uri(&self) -> Option<&Url> {
        self.redirect_uri.as_ref()
    }

    #[must_use]
    pub fn logout_url(&self) -> Option<&Url> {
        self.logout_url.as_ref()
    }

    #[must_use]
    pub fn logout_redirect(&self) -> Option<&Url> {
        self.logout_redirect.as_ref()
    }

    #[must_use]
    pub fn api_base_url(&self) -> Option<&Url> {
        self.api_base_url.as_ref()
    }
}

// Manual Debug: keep the client secret out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri.as_ref().map(Url::as_str))
            .field("logout_url", &self.logout_url.as_ref().map(Url::as_str))
            .field("logout_redirect", &self.logout_redirect.as_ref().map(Url::as_str))
            .field("api_base_url", &self.api_base_url.as_ref().map(Url::as_str))
            .finish()
    }
}
