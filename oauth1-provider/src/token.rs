use crate::callback::CallbackValidator;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::model::{Consumer, Token, TokenState, TokenType, callback_redirect_url};
use crate::store::{CredentialStore, NonceStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const KEY_SIZE: usize = 32;
pub const SECRET_SIZE: usize = 32;
pub const VERIFIER_SIZE: usize = 10;

/// `error` value sent to the callback when the user declines.
pub const ACCESS_DENIED_MESSAGE: &str = "Access not granted by user.";
/// `error` value sent to the callback when it was never confirmed.
pub const INVALID_CALLBACK_MESSAGE: &str = "Invalid callback URL.";

/// Where the resource owner goes after deciding on a request token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// Redirect to the consumer's callback
    Redirect { url: String, granted: bool },
    /// Out-of-band grant; the verifier is shown to the user
    OutOfBand { token_key: String, verifier: String },
    /// Out-of-band denial
    OutOfBandDenied,
}

/// Counts reported by a sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tokens: u64,
    pub nonces: u64,
}

/// Drives tokens through request → authorized → access.
///
/// Holds no state between calls; everything lives in the store.
pub struct TokenManager<S> {
    store: Arc<S>,
    config: Arc<ProviderConfig>,
    callbacks: CallbackValidator,
}

impl<S> Clone for TokenManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<S: CredentialStore> TokenManager<S> {
    pub fn new(store: Arc<S>, config: Arc<ProviderConfig>) -> Self {
        let callbacks = CallbackValidator::from_config(&config);
        Self {
            store,
            config,
            callbacks,
        }
    }

    /// Issue an unapproved request token for an accepted consumer.
    ///
    /// An empty or absent `scope` grants access to every resource.
    pub async fn issue_request_token(
        &self,
        consumer: &Consumer,
        callback: &str,
        scope: Option<&str>,
    ) -> Result<Token> {
        if !consumer.is_accepted() {
            tracing::warn!(
                consumer_key = %consumer.key,
                status = consumer.status.as_str(),
                "refusing request token to consumer that is not accepted"
            );
            return Err(Error::InvalidConsumer);
        }

        let resource = match scope.filter(|s| !s.is_empty()) {
            Some(name) => Some(
                self.store
                    .get_resource(name)
                    .await?
                    .ok_or_else(|| Error::InvalidScope(name.to_string()))?,
            ),
            None => None,
        };

        let token = self
            .store
            .create_request_token(
                consumer,
                callback,
                resource,
                &self.callbacks,
                self.config.request_token_lifetime,
            )
            .await?;

        tracing::info!(
            consumer_key = %consumer.key,
            token_key = %token.key,
            callback_confirmed = token.callback_confirmed,
            scope = ?token.scope_name(),
            "issued request token"
        );

        Ok(token)
    }

    /// Record the resource owner's decision on a request token.
    ///
    /// A denial is not an error: the token stays unapproved and may be
    /// authorized later, and the consumer learns of the denial through its
    /// callback.
    pub async fn record_authorization(
        &self,
        request_token: &Token,
        user: &str,
        granted: bool,
    ) -> Result<AuthorizationOutcome> {
        if request_token.token_type != TokenType::Request {
            return Err(Error::InvalidToken);
        }

        if !granted {
            tracing::info!(token_key = %request_token.key, user, "user denied request token");
            return Ok(self.refusal(request_token, ACCESS_DENIED_MESSAGE));
        }

        if !request_token.callback_confirmed {
            tracing::warn!(
                token_key = %request_token.key,
                "authorization attempted with an unconfirmed callback"
            );
            return Ok(self.refusal(request_token, INVALID_CALLBACK_MESSAGE));
        }

        match request_token.state(Utc::now()) {
            TokenState::Requested => {}
            TokenState::Authorized => {
                return Err(Error::PermissionDenied("request token already authorized"));
            }
            TokenState::Active | TokenState::Expired => return Err(Error::InvalidToken),
        }

        let verifier = generate_verifier();
        let token = self
            .store
            .authorize_request_token(&request_token.key, user, &verifier)
            .await?
            .ok_or(Error::InvalidToken)?;

        tracing::info!(
            token_key = %token.key,
            consumer_key = %token.consumer_key,
            user,
            "request token authorized"
        );

        if token.is_out_of_band() {
            return Ok(AuthorizationOutcome::OutOfBand {
                token_key: token.key,
                verifier,
            });
        }

        let callback = token.callback.as_deref().unwrap_or_default();
        Ok(AuthorizationOutcome::Redirect {
            url: callback_redirect_url(callback, Some(&verifier), &[("oauth_token", &token.key)]),
            granted: true,
        })
    }

    fn refusal(&self, request_token: &Token, message: &str) -> AuthorizationOutcome {
        match request_token.callback.as_deref() {
            Some(callback) if !request_token.is_out_of_band() => AuthorizationOutcome::Redirect {
                url: callback_redirect_url(callback, None, &[("error", message)]),
                granted: false,
            },
            _ => AuthorizationOutcome::OutOfBandDenied,
        }
    }

    /// Swap an authorized request token for an access token.
    ///
    /// At most one exchange of a given request token succeeds; a concurrent
    /// loser sees [`Error::InvalidToken`].
    pub async fn exchange_for_access_token(
        &self,
        consumer: &Consumer,
        request_token: &Token,
        verifier: Option<&str>,
    ) -> Result<Token> {
        if !consumer.is_accepted() {
            return Err(Error::InvalidConsumer);
        }
        if request_token.token_type != TokenType::Request
            || request_token.consumer_key != consumer.key
        {
            return Err(Error::InvalidToken);
        }

        match request_token.state(Utc::now()) {
            TokenState::Authorized => {}
            TokenState::Requested => {
                return Err(Error::PermissionDenied("request token not approved by the user"));
            }
            TokenState::Active | TokenState::Expired => return Err(Error::InvalidToken),
        }

        if self.config.require_verifier && !verifier_matches(request_token, verifier) {
            return Err(Error::PermissionDenied("invalid OAuth verifier"));
        }

        let access_token = self
            .store
            .create_access_token(request_token, self.config.access_token_lifetime)
            .await?
            .ok_or(Error::InvalidToken)?;

        tracing::info!(
            consumer_key = %consumer.key,
            request_token_key = %request_token.key,
            access_token_key = %access_token.key,
            "exchanged request token for access token"
        );

        Ok(access_token)
    }

    /// Revoke one of the consumer's access tokens.
    pub async fn revoke_access_token(&self, consumer: &Consumer, token_key: &str) -> Result<()> {
        let token = self
            .store
            .get_access_token(token_key, &consumer.key)
            .await?
            .ok_or(Error::InvalidToken)?;

        if !self.store.delete_token(&token.key).await? {
            return Err(Error::InvalidToken);
        }

        tracing::info!(consumer_key = %consumer.key, token_key, "revoked access token");
        Ok(())
    }
}

impl<S: CredentialStore + NonceStore> TokenManager<S> {
    /// Drop expired tokens and nonces too old to be replayed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let tokens = self.store.purge_expired_tokens(now).await?;
        let nonces = self
            .store
            .cleanup_expired(now - self.config.timestamp_threshold)
            .await?;

        if tokens > 0 || nonces > 0 {
            tracing::info!(tokens, nonces, "swept expired credentials");
        }
        Ok(SweepReport { tokens, nonces })
    }
}

fn verifier_matches(token: &Token, supplied: Option<&str>) -> bool {
    match (token.verifier.as_deref(), supplied) {
        (Some(expected), Some(supplied)) => {
            bool::from(expected.as_bytes().ct_eq(supplied.as_bytes()))
        }
        _ => false,
    }
}

/// `oauth_token=..&oauth_token_secret=..[&oauth_callback_confirmed=..]`,
/// the body of the response creating a token.
pub fn credentials_response(token: &Token, callback_confirmed: Option<bool>) -> Result<String> {
    let mut pairs = vec![
        ("oauth_token", token.key.as_str()),
        ("oauth_token_secret", token.secret.as_str()),
    ];
    if let Some(confirmed) = callback_confirmed {
        pairs.push(("oauth_callback_confirmed", if confirmed { "true" } else { "false" }));
    }
    serde_urlencoded::to_string(pairs)
        .map_err(|e| Error::Internal(format!("failed to encode credentials: {}", e)))
}

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random alphanumeric string from the operating system's CSPRNG
pub fn generate_random_string(len: usize) -> String {
    use rand::Rng;
    use rand::rngs::OsRng;
    let mut rng = OsRng;
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

pub fn generate_verifier() -> String {
    use rand::Rng;
    use rand::rngs::OsRng;
    let mut rng = OsRng;
    (0..VERIFIER_SIZE)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
