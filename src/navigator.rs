use std::sync::{Arc, Mutex};

use url::Url;

/// Consumer-provided browser navigation.
///
/// In a wasm front end this maps to `window.location.assign` and
/// `history.replaceState`; a desktop shell might open the system browser.
pub trait Navigator {
    /// Full-page navigation. For a browser page this is terminal: nothing
    /// after it in the current page instance is expected to run.
    fn navigate(&self, url: &Url);

    /// Rewrite the visible URL without reloading the page.
    fn replace_url(&self, url: &Url);
}

/// A navigation side effect recorded by [`RecordingNavigator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Navigate(Url),
    Replace(Url),
}

/// In-memory [`Navigator`] that records every call.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    log: Arc<Mutex<Vec<Navigation>>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Navigation> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Targets of full-page navigations only.
    #[must_use]
    pub fn navigations(&self) -> Vec<Url> {
        self.history()
            .into_iter()
            .filter_map(|n| match n {
                Navigation::Navigate(url) => Some(url),
                Navigation::Replace(_) => None,
            })
            .collect()
    }

    /// The most recent URL set via [`Navigator::replace_url`].
    #[must_use]
    pub fn last_replaced(&self) -> Option<Url> {
        self.history().into_iter().rev().find_map(|n| match n {
            Navigation::Replace(url) => Some(url),
            Navigation::Navigate(_) => None,
        })
    }

    fn record(&self, entry: Navigation) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &Url) {
        self.record(Navigation::Navigate(url.clone()));
    }

    fn replace_url(&self, url: &Url) {
        self.record(Navigation::Replace(url.clone()));
    }
}
