use serde::de::DeserializeOwned;
use url::Url;

use crate::config::AuthConfig;
use crate::error::Error;
use crate::navigator::Navigator;
use crate::session::AuthSession;
use crate::storage::Storage;

/// Bearer-authenticated client for the consignment backend API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client rooted at `base_url`. Request paths are resolved
    /// relative to it, so `https://api.example.com/v1` and
    /// `https://api.example.com/v1/` behave the same.
    #[must_use]
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if no API base URL is configured.
    pub fn from_config(config: &AuthConfig) -> Result<Self, Error> {
        config
            .api_base_url()
            .cloned()
            .map(Self::new)
            .ok_or_else(|| Error::Config("API base URL is not configured".into()))
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` with a bearer token and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a path that cannot be joined to the base
    /// URL or that resolves to a different origin, [`Error::Http`] on network
    /// or decode failure, or [`Error::Api`] for a non-success status.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, Error> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("invalid API path {path:?}: {e}")))?;
        // An absolute URL as `path` would carry the bearer token to another host.
        if url.origin() != self.base_url.origin() {
            return Err(Error::Config(format!(
                "API path {path:?} leaves the configured API origin"
            )));
        }

        let response = self.http.get(url).bearer_auth(access_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "API request failed");
            return Err(Error::Api {
                status: status.as_u16(),
                detail,
            });
        }
        response.json::<T>().await.map_err(Into::into)
    }

    /// [`get_json`](Self::get_json) with the session's current access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] if the session holds no token, plus
    /// anything [`get_json`](Self::get_json) returns.
    pub async fn get_json_for<T, D, S, N>(
        &self,
        session: &AuthSession<D, S, N>,
        path: &str,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        D: Storage,
        S: Storage,
        N: Navigator,
    {
        let token = session.access_token().ok_or(Error::Unauthenticated)?;
        self.get_json(path, token).await
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::navigator::RecordingNavigator;
    use crate::oauth::AuthClient;
    use crate::storage::MemoryStorage;
    use crate::token_store::TokenStore;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Consignment {
        id: String,
        status: String,
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = ApiClient::new("https://api.example.com/v1".parse().unwrap());
        assert_eq!(client.base_url().as_str(), "https://api.example.com/v1/");
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let config = AuthConfig::new(
            "c",
            "https://auth.example.com/authorize".parse().unwrap(),
            "https://auth.example.com/token".parse().unwrap(),
        );
        assert!(matches!(ApiClient::from_config(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_get_json_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/consignments/CN-1"))
            .and(header("authorization", "Bearer A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "CN-1",
                "status": "in_transit"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(format!("{}/v1", server.uri()).parse().unwrap());
        let consignment: Consignment = client.get_json("/consignments/CN-1", "A").await.unwrap();

        assert_eq!(
            consignment,
            Consignment {
                id: "CN-1".into(),
                status: "in_transit".into()
            }
        );
    }

    #[tokio::test]
    async fn test_get_json_rejects_foreign_origin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let client = ApiClient::new("https://api.example.com/v1/".parse().unwrap());
        let foreign = format!("{}/steal", server.uri());
        let result = client.get_json::<serde_json::Value>(&foreign, "A").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_scheme_relative_path_stays_on_api_origin() {
        let base: Url = "https://api.example.com/v1/".parse().unwrap();
        let joined = base.join("//other.example.com/x".trim_start_matches('/')).unwrap();
        assert_eq!(joined.origin(), base.origin());
    }

    #[tokio::test]
    async fn test_get_json_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri().parse().unwrap());
        let err = client
            .get_json::<serde_json::Value>("consignments", "A")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 401, detail } if detail == "expired"));
    }

    #[tokio::test]
    async fn test_get_json_for_unauthenticated_session() {
        let config = AuthConfig::new(
            "c",
            "https://auth.example.com/authorize".parse().unwrap(),
            "https://auth.example.com/token".parse().unwrap(),
        );
        let mut session = AuthSession::new(
            AuthClient::new(config),
            TokenStore::new(MemoryStorage::new(), MemoryStorage::new()),
            RecordingNavigator::new(),
        );
        session.initialize();

        let client = ApiClient::new("https://api.example.com/".parse().unwrap());
        let result = client
            .get_json_for::<serde_json::Value, _, _, _>(&session, "consignments")
            .await;
        assert!(matches!(result, Err(Error::Unauthenticated)));
    }
}
