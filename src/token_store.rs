use crate::oauth::TokenResponse;
use crate::storage::{Storage, StorageError};

// Durable keys.
const ACCESS_TOKEN_KEY: &str = "access_token";
const ID_TOKEN_KEY: &str = "id_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const TOKEN_EXPIRY_KEY: &str = "token_expiry";
const STATE_KEY: &str = "oauth_state";

// Session-scoped keys.
const PKCE_VERIFIER_KEY: &str = "pkce_verifier";
const LOGGING_IN_KEY: &str = "isLoggingIn";
const JUST_LOGGED_OUT_KEY: &str = "justLoggedOut";

const MARKER_SET: &str = "true";

const TOKEN_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    ID_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    TOKEN_EXPIRY_KEY,
];

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// Tokens persisted across reloads.
///
/// The expiry is absolute (epoch millis), so a reload can check it without
/// knowing when the tokens were issued.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expiry_epoch_millis: i64,
}

impl TokenRecord {
    /// Build a record from a token response received at `now_millis`.
    #[must_use]
    pub fn from_response(response: &TokenResponse, now_millis: i64) -> Self {
        let lifetime_ms = i64::try_from(response.expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        Self {
            access_token: response.access_token.clone(),
            id_token: response.id_token.clone(),
            refresh_token: response.refresh_token.clone(),
            expiry_epoch_millis: now_millis.saturating_add(lifetime_ms),
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expiry_epoch_millis <= now_millis
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expiry_epoch_millis", &self.expiry_epoch_millis)
            .finish_non_exhaustive()
    }
}

/// Token and flow-marker persistence over a durable and a session-scoped store.
///
/// Writes and deletes are best-effort: a failing backend is logged and
/// otherwise ignored, so a disabled store degrades to "not logged in" instead
/// of an error. Read failures are treated as absent values.
#[derive(Debug)]
pub struct TokenStore<D, S> {
    durable: D,
    session: S,
}

impl<D: Storage, S: Storage> TokenStore<D, S> {
    #[must_use]
    pub fn new(durable: D, session: S) -> Self {
        Self { durable, session }
    }

    #[must_use]
    pub fn durable(&self) -> &D {
        &self.durable
    }

    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn save(&self, record: &TokenRecord) {
        best_effort(self.durable.set(ACCESS_TOKEN_KEY, &record.access_token), ACCESS_TOKEN_KEY);
        best_effort(self.durable.set(ID_TOKEN_KEY, &record.id_token), ID_TOKEN_KEY);
        match &record.refresh_token {
            Some(token) => best_effort(self.durable.set(REFRESH_TOKEN_KEY, token), REFRESH_TOKEN_KEY),
            None => best_effort(self.durable.remove(REFRESH_TOKEN_KEY), REFRESH_TOKEN_KEY),
        }
        best_effort(
            self.durable
                .set(TOKEN_EXPIRY_KEY, &record.expiry_epoch_millis.to_string()),
            TOKEN_EXPIRY_KEY,
        );
    }

    /// Load the stored record if it is complete and unexpired.
    ///
    /// An expired or incomplete record is purged before returning `None`.
    #[must_use]
    pub fn load(&self) -> Option<TokenRecord> {
        self.load_at(now_millis())
    }

    /// [`load`](Self::load) against an explicit clock.
    #[must_use]
    pub fn load_at(&self, now_millis: i64) -> Option<TokenRecord> {
        let access_token = read(&self.durable, ACCESS_TOKEN_KEY);
        let id_token = read(&self.durable, ID_TOKEN_KEY);
        let refresh_token = read(&self.durable, REFRESH_TOKEN_KEY);
        let expiry = read(&self.durable, TOKEN_EXPIRY_KEY);
        if access_token.is_none() && id_token.is_none() && refresh_token.is_none() && expiry.is_none()
        {
            return None;
        }

        let record = match (access_token, id_token, expiry.and_then(|e| e.parse::<i64>().ok())) {
            (Some(access_token), Some(id_token), Some(expiry_epoch_millis)) => TokenRecord {
                access_token,
                id_token,
                refresh_token,
                expiry_epoch_millis,
            },
            _ => {
                tracing::debug!("Discarding incomplete stored token record");
                self.purge_tokens();
                return None;
            }
        };

        if record.is_expired_at(now_millis) {
            tracing::debug!(expiry = record.expiry_epoch_millis, "Discarding expired tokens");
            self.purge_tokens();
            return None;
        }
        Some(record)
    }

    /// Remove persisted tokens, the CSRF state and the PKCE verifier.
    pub fn clear(&self) {
        self.purge_tokens();
        best_effort(self.durable.remove(STATE_KEY), STATE_KEY);
        best_effort(self.session.remove(PKCE_VERIFIER_KEY), PKCE_VERIFIER_KEY);
    }

    fn purge_tokens(&self) {
        for key in TOKEN_KEYS {
            best_effort(self.durable.remove(key), key);
        }
    }

    // ── CSRF state ─────────────────────────────────────────────────

    pub fn store_state(&self, state: &str) {
        best_effort(self.durable.set(STATE_KEY, state), STATE_KEY);
    }

    #[must_use]
    pub fn stored_state(&self) -> Option<String> {
        read(&self.durable, STATE_KEY)
    }

    pub fn remove_state(&self) {
        best_effort(self.durable.remove(STATE_KEY), STATE_KEY);
    }

    // ── PKCE verifier ──────────────────────────────────────────────

    pub fn store_verifier(&self, verifier: &str) {
        best_effort(self.session.set(PKCE_VERIFIER_KEY, verifier), PKCE_VERIFIER_KEY);
    }

    /// Read and delete the PKCE verifier.
    #[must_use]
    pub fn take_verifier(&self) -> Option<String> {
        let verifier = read(&self.session, PKCE_VERIFIER_KEY);
        best_effort(self.session.remove(PKCE_VERIFIER_KEY), PKCE_VERIFIER_KEY);
        verifier
    }

    // ── Flow markers ───────────────────────────────────────────────

    pub fn set_logging_in(&self) {
        best_effort(self.session.set(LOGGING_IN_KEY, MARKER_SET), LOGGING_IN_KEY);
    }

    pub fn clear_logging_in(&self) {
        best_effort(self.session.remove(LOGGING_IN_KEY), LOGGING_IN_KEY);
    }

    #[must_use]
    pub fn is_logging_in(&self) -> bool {
        read(&self.session, LOGGING_IN_KEY).as_deref() == Some(MARKER_SET)
    }

    pub fn set_just_logged_out(&self) {
        best_effort(self.session.set(JUST_LOGGED_OUT_KEY, MARKER_SET), JUST_LOGGED_OUT_KEY);
    }

    /// Read and delete the `justLoggedOut` marker.
    #[must_use]
    pub fn take_just_logged_out(&self) -> bool {
        let set = read(&self.session, JUST_LOGGED_OUT_KEY).as_deref() == Some(MARKER_SET);
        if set {
            best_effort(self.session.remove(JUST_LOGGED_OUT_KEY), JUST_LOGGED_OUT_KEY);
        }
        set
    }
}

fn read(store: &impl Storage, key: &'static str) -> Option<String> {
    store.get(key).unwrap_or_else(|e| {
        tracing::warn!(error = %e, key, "Storage read failed");
        None
    })
}

fn best_effort(result: Result<(), StorageError>, key: &'static str) {
    if let Err(e) = result {
        tracing::warn!(error = %e, key, "Storage write failed; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    /// Backend that refuses every operation, like storage in some private-browsing modes.
    struct DisabledStorage;

    impl Storage for DisabledStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }
    }

    fn store() -> (TokenStore<MemoryStorage, MemoryStorage>, MemoryStorage, MemoryStorage) {
        let durable = MemoryStorage::new();
        let session = MemoryStorage::new();
        (
            TokenStore::new(durable.clone(), session.clone()),
            durable,
            session,
        )
    }

    fn record(expiry: i64) -> TokenRecord {
        TokenRecord {
            access_token: "A".into(),
            id_token: "I".into(),
            refresh_token: Some("R".into()),
            expiry_epoch_millis: expiry,
        }
    }

    #[test]
    fn test_save_then_load() {
        let (tokens, durable, _) = store();
        tokens.save(&record(10_000));

        assert_eq!(durable.get("token_expiry").unwrap().as_deref(), Some("10000"));
        assert_eq!(tokens.load_at(9_999), Some(record(10_000)));
    }

    #[test]
    fn test_save_without_refresh_token_removes_stale_one() {
        let (tokens, durable, _) = store();
        tokens.save(&record(10_000));
        tokens.save(&TokenRecord {
            refresh_token: None,
            ..record(20_000)
        });

        assert_eq!(durable.get("refresh_token").unwrap(), None);
        assert_eq!(tokens.load_at(0).unwrap().refresh_token, None);
    }

    #[test]
    fn test_load_expired_purges_everything() {
        let (tokens, durable, _) = store();
        tokens.save(&record(10_000));

        assert_eq!(tokens.load_at(10_000), None);
        for key in TOKEN_KEYS {
            assert_eq!(durable.get(key).unwrap(), None, "{key} should be purged");
        }
    }

    #[test]
    fn test_load_with_real_clock_rejects_past_expiry() {
        let (tokens, durable, _) = store();
        tokens.save(&record(now_millis() - 1_000));

        assert!(tokens.load().is_none());
        assert!(durable.is_empty());
    }

    #[test]
    fn test_load_incomplete_record_is_purged() {
        let (tokens, durable, _) = store();
        durable.set("access_token", "A").unwrap();
        durable.set("token_expiry", "not-a-number").unwrap();
        durable.set("refresh_token", "R").unwrap();

        assert_eq!(tokens.load_at(0), None);
        assert!(durable.is_empty());
    }

    #[test]
    fn test_load_purges_orphaned_id_and_refresh_tokens() {
        let (tokens, durable, _) = store();
        durable.set("id_token", "I").unwrap();
        durable.set("refresh_token", "R").unwrap();

        assert_eq!(tokens.load(), None);
        assert!(durable.is_empty(), "no residual token fields");
    }

    #[test]
    fn test_load_empty_store() {
        let (tokens, _, _) = store();
        assert_eq!(tokens.load_at(0), None);
    }

    #[test]
    fn test_record_from_response_uses_absolute_expiry() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "A",
            "id_token": "I",
            "expires_in": 3600,
            "token_type": "Bearer"
        }))
        .unwrap();

        let rec = TokenRecord::from_response(&response, 1_000);
        assert_eq!(rec.expiry_epoch_millis, 3_601_000);
        assert_eq!(rec.refresh_token, None);
    }

    #[test]
    fn test_clear_removes_tokens_state_and_verifier() {
        let (tokens, durable, session) = store();
        tokens.save(&record(10_000));
        tokens.store_state("xyz");
        tokens.store_verifier("verifier");
        tokens.set_logging_in();

        tokens.clear();

        assert!(durable.is_empty());
        assert_eq!(session.get("pkce_verifier").unwrap(), None);
        assert!(tokens.is_logging_in(), "clear leaves flow markers alone");
    }

    #[test]
    fn test_take_verifier_is_single_use() {
        let (tokens, _, _) = store();
        tokens.store_verifier("v");
        assert_eq!(tokens.take_verifier().as_deref(), Some("v"));
        assert_eq!(tokens.take_verifier(), None);
    }

    #[test]
    fn test_markers() {
        let (tokens, _, session) = store();
        assert!(!tokens.is_logging_in());
        tokens.set_logging_in();
        assert_eq!(session.get("isLoggingIn").unwrap().as_deref(), Some("true"));
        assert!(tokens.is_logging_in());
        tokens.clear_logging_in();
        assert!(!tokens.is_logging_in());

        tokens.set_just_logged_out();
        assert!(tokens.take_just_logged_out());
        assert!(!tokens.take_just_logged_out());
    }

    #[test]
    fn test_disabled_storage_never_panics() {
        let tokens = TokenStore::new(DisabledStorage, DisabledStorage);
        tokens.save(&record(10_000));
        tokens.store_state("s");
        tokens.set_logging_in();
        tokens.clear();

        assert_eq!(tokens.load_at(0), None);
        assert_eq!(tokens.stored_state(), None);
        assert!(!tokens.is_logging_in());
        assert!(!tokens.take_just_logged_out());
    }
}
