use url::Url;

use crate::navigator::Navigator;
use crate::session::AuthSession;
use crate::storage::Storage;

/// What a protected view should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardView {
    /// Session still initializing, or a callback exchange is in flight.
    Loading,
    /// Not authenticated; a login redirect is (or will be) underway.
    Redirecting,
    /// Authenticated; render the protected content.
    Content,
}

/// OAuth callback parameters found in the current URL.
#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match &*key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }
}

/// Guards a protected view: completes OAuth callbacks found in the URL and
/// starts a login when the session is unauthenticated.
///
/// One guard per protected view instance. Call [`evaluate`](Self::evaluate)
/// whenever the session state or URL changes; it is safe to call repeatedly.
#[derive(Debug, Default)]
pub struct RouteGuard {
    has_redirected: bool,
    processing: bool,
    attempted_code: Option<String>,
}

impl RouteGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate the guard against `current_url` and return the view to render.
    pub async fn evaluate<D, S, N>(
        &mut self,
        session: &mut AuthSession<D, S, N>,
        current_url: &Url,
    ) -> GuardView
    where
        D: Storage,
        S: Storage,
        N: Navigator,
    {
        let params = CallbackParams::from_url(current_url);

        if let Some(error) = &params.error {
            if !self.has_redirected {
                let description = params.error_description.as_deref().unwrap_or("");
                tracing::warn!(error = %error, description = %description, "OAuth2 error from identity provider");
                session.clear_logging_in();
                // Auto-login against a failing provider would loop.
                self.has_redirected = true;
            }
            return self.view(session);
        }

        if let (Some(code), Some(state)) = (&params.code, &params.state)
            && self.attempted_code.as_deref() != Some(code.as_str())
        {
            self.attempted_code = Some(code.clone());
            self.processing = true;
            let ok = session.handle_auth_callback(code, state).await;
            self.processing = false;

            if ok {
                let mut clean = current_url.clone();
                clean.set_query(None);
                session.navigator().replace_url(&clean);
            }
            return self.view(session);
        }

        if !session.is_loading() && !session.is_authenticated() && !self.has_redirected {
            if session.take_just_logged_out() {
                tracing::debug!("Skipping auto-login after explicit logout");
            } else if session.is_logging_in() {
                tracing::debug!("Login redirect already in progress");
            } else {
                self.has_redirected = true;
                if let Err(e) = session.login() {
                    tracing::debug!(error = %e, "Auto-login did not start");
                }
            }
        }

        self.view(session)
    }

    /// The view for the current state, without side effects.
    #[must_use]
    pub fn view<D, S, N>(&self, session: &AuthSession<D, S, N>) -> GuardView
    where
        D: Storage,
        S: Storage,
        N: Navigator,
    {
        if session.is_loading() || self.processing {
            GuardView::Loading
        } else if session.is_authenticated() {
            GuardView::Content
        } else {
            GuardView::Redirecting
        }
    }

    /// True while a callback exchange is in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    #[must_use]
    pub fn has_redirected(&self) -> bool {
        self.has_redirected
    }
}
