#![doc = include_str!("../README.md")]

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod navigator;
pub mod oauth;
pub mod pkce;
pub mod session;
pub mod storage;
pub mod token_store;

// Re-exports for convenient access
pub use api::ApiClient;
pub use config::AuthConfig;
pub use error::Error;
pub use guard::{GuardView, RouteGuard};
pub use navigator::{Navigation, Navigator, RecordingNavigator};
pub use oauth::{AuthClient, TokenResponse};
pub use pkce::{generate_code_challenge, generate_code_verifier, generate_state};
pub use session::{AuthSession, SessionPhase, SessionState};
pub use storage::{JsonFileStorage, MemoryStorage, Storage, StorageError};
pub use token_store::{TokenRecord, TokenStore};
