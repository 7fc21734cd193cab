//! # oauth1-provider
//!
//! The service provider side of OAuth 1.0a (RFC 5849).
//!
//! This crate issues request tokens, mediates a resource owner's approval of
//! them, exchanges approved request tokens for access tokens and then
//! authenticates API calls signed with those access tokens.
//!
//! ## Features
//!
//! - **Three-legged flow**: request token, authorize and access token endpoints
//! - **Signature methods**: PLAINTEXT, HMAC-SHA1 and HMAC-SHA256, pluggable
//! - **Replay protection**: nonce ledger keyed by consumer, token, nonce and timestamp
//! - **Scoped tokens**: tokens may be bound to a single named resource
//! - **Pluggable storage**: abstract traits for credentials and nonces
//!
//! ## Example
//!
//! ```rust,no_run
//! use oauth1_provider::{HeaderUserAuthenticator, MemoryStore, OAuthProvider, ProviderConfig};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig::new("https://photos.example.net".parse::<url::Url>()?)
//!     .with_realm("photos");
//! let provider = OAuthProvider::builder()
//!     .config(config)
//!     .store(Arc::new(MemoryStore::new()))
//!     .user_authenticator(Arc::new(HeaderUserAuthenticator::default()))
//!     .build()?;
//!
//! let app = provider.router();
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod callback;
pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod request;
#[cfg(feature = "axum")]
pub mod server;
pub mod signature;
pub mod store;
pub mod token;
pub mod validator;

pub use auth::{HeaderUserAuthenticator, UserAuthenticator};
pub use callback::{CallbackValidator, OUT_OF_BAND};
pub use config::ProviderConfig;
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use model::{Consumer, ConsumerStatus, NonceRecord, Resource, Token, TokenState, TokenType};
pub use request::OAuthRequest;
#[cfg(feature = "axum")]
pub use server::{OAuthProvider, OAuthProviderBuilder};
pub use signature::{SignatureMethod, SignatureMethodKind, SignatureMethods};
pub use store::{CredentialStore, ExchangeOutcome, NonceStore};
pub use token::{AuthorizationOutcome, SweepReport, TokenManager};
pub use validator::{Authenticated, RequestValidator, TokenRequirement};
