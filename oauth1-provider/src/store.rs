use crate::callback::CallbackValidator;
use crate::error::{Error, Result};
use crate::model::{Consumer, Resource, Token, TokenType};
use crate::token::{KEY_SIZE, SECRET_SIZE, generate_random_string};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Attempts at drawing an unused token key before giving up.
const MAX_KEY_ATTEMPTS: usize = 5;

/// Result of swapping an approved request token for an access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Request token deleted and access token stored
    Exchanged,
    /// No approved request token under that key (already exchanged, expired
    /// or never approved); nothing changed
    RequestTokenGone,
    /// The access token key is taken; nothing changed
    KeyCollision,
}

/// Storage abstraction for consumers, resources and tokens.
///
/// Lookups return `Ok(None)` when the record does not exist; expired tokens
/// count as absent. Implementations must make
/// [`authorize_request_token`](CredentialStore::authorize_request_token) and
/// [`exchange_request_token`](CredentialStore::exchange_request_token)
/// atomic with respect to concurrent calls on the same key.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get a consumer by key, whatever its status
    async fn get_consumer(&self, key: &str) -> Result<Option<Consumer>>;

    /// Get a resource by name
    async fn get_resource(&self, name: &str) -> Result<Option<Resource>>;

    /// Get an unexpired request token by key
    async fn get_request_token(&self, key: &str) -> Result<Option<Token>>;

    /// Get an unexpired access token by key, only if owned by `consumer_key`
    async fn get_access_token(&self, key: &str, consumer_key: &str) -> Result<Option<Token>>;

    /// Store a new token. Returns false if the key is already taken.
    async fn insert_token(&self, token: &Token) -> Result<bool>;

    /// Approve an unapproved request token for `user`.
    /// Returns the updated token, or `None` if no such unapproved token exists.
    async fn authorize_request_token(
        &self,
        key: &str,
        user: &str,
        verifier: &str,
    ) -> Result<Option<Token>>;

    /// Delete the approved request token `request_key` and store
    /// `access_token` in one transaction.
    async fn exchange_request_token(
        &self,
        request_key: &str,
        access_token: &Token,
    ) -> Result<ExchangeOutcome>;

    /// Delete a token of either type. Returns whether it existed.
    async fn delete_token(&self, key: &str) -> Result<bool>;

    /// Delete every token expired at `now`. Returns how many were removed.
    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Create and store a request token with a fresh random key and secret.
    ///
    /// The callback is confirmed through `callbacks`; an unconfirmed callback
    /// is recorded, not rejected.
    async fn create_request_token(
        &self,
        consumer: &Consumer,
        callback: &str,
        resource: Option<Resource>,
        callbacks: &CallbackValidator,
        lifetime: Option<Duration>,
    ) -> Result<Token> {
        let now = Utc::now();
        let callback_confirmed = callbacks.is_valid(callback);

        for _ in 0..MAX_KEY_ATTEMPTS {
            let token = Token {
                key: generate_random_string(KEY_SIZE),
                secret: generate_random_string(SECRET_SIZE),
                token_type: TokenType::Request,
                consumer_key: consumer.key.clone(),
                user: None,
                resource: resource.clone(),
                callback: Some(callback.to_string()),
                callback_confirmed,
                verifier: None,
                is_approved: false,
                created_at: now,
                expires_at: lifetime.map(|lifetime| now + lifetime),
            };

            if self.insert_token(&token).await? {
                return Ok(token);
            }
            tracing::debug!("request token key collision, drawing a new key");
        }

        Err(Error::Internal(
            "could not allocate a unique request token key".to_string(),
        ))
    }

    /// Replace an approved request token with a new access token bound to
    /// the same consumer, user and resource.
    ///
    /// Returns `None` if the request token was exchanged concurrently or is
    /// not approved.
    async fn create_access_token(
        &self,
        request_token: &Token,
        lifetime: Option<Duration>,
    ) -> Result<Option<Token>> {
        if request_token.token_type != TokenType::Request || !request_token.is_approved {
            return Ok(None);
        }

        let now = Utc::now();
        for _ in 0..MAX_KEY_ATTEMPTS {
            let access_token = Token {
                key: generate_random_string(KEY_SIZE),
                secret: generate_random_string(SECRET_SIZE),
                token_type: TokenType::Access,
                consumer_key: request_token.consumer_key.clone(),
                user: request_token.user.clone(),
                resource: request_token.resource.clone(),
                callback: None,
                callback_confirmed: false,
                verifier: None,
                is_approved: true,
                created_at: now,
                expires_at: lifetime.map(|lifetime| now + lifetime),
            };

            match self
                .exchange_request_token(&request_token.key, &access_token)
                .await?
            {
                ExchangeOutcome::Exchanged => return Ok(Some(access_token)),
                ExchangeOutcome::RequestTokenGone => return Ok(None),
                ExchangeOutcome::KeyCollision => {
                    tracing::debug!("access token key collision, drawing a new key");
                }
            }
        }

        Err(Error::Internal(
            "could not allocate a unique access token key".to_string(),
        ))
    }
}

/// Replay ledger of (consumer, token, nonce, timestamp) tuples
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Record the tuple. Returns true if it had not been seen before,
    /// false on a replay.
    async fn check_nonce(
        &self,
        consumer_key: &str,
        token_key: Option<&str>,
        nonce: &str,
        timestamp: i64,
    ) -> Result<bool>;

    /// Forget nonces whose timestamp is older than `before`
    async fn cleanup_expired(&self, before: DateTime<Utc>) -> Result<u64>;
}
