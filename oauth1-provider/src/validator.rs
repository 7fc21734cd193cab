//! Protocol request validation.
//!
//! Stages run in a fixed order and the first failure wins: required
//! parameters, consumer, token, nonce, then version, timestamp and
//! signature. The reason is logged; callers only ever learn that the
//! request was rejected.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::model::{Consumer, Resource, Token, TokenType};
use crate::request::{OAuthRequest, REQUIRED_PARAMETERS};
use crate::signature::SignatureMethods;
use crate::store::{CredentialStore, NonceStore};
use chrono::Utc;
use http::Method;
use std::sync::Arc;

/// Protocol version accepted in `oauth_version`
pub const OAUTH_VERSION: &str = "1.0";

/// Which token, if any, a request must be signed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRequirement {
    /// Consumer credentials only (request-token endpoint)
    None,
    /// An unexpired request token (access-token endpoint)
    Request,
    /// An access token owned by the consumer (protected resources)
    Access,
}

impl TokenRequirement {
    fn token_type(&self) -> Option<TokenType> {
        match self {
            TokenRequirement::None => None,
            TokenRequirement::Request => Some(TokenType::Request),
            TokenRequirement::Access => Some(TokenType::Access),
        }
    }
}

/// A request that passed every validation stage
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub consumer: Consumer,
    pub token: Option<Token>,
    realm: Arc<str>,
    signature_methods: Arc<str>,
}

impl Authenticated {
    /// Resource owner the token was authorized by
    pub fn user(&self) -> Option<&str> {
        self.token.as_ref().and_then(|t| t.user.as_deref())
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.token.as_ref().and_then(|t| t.resource.as_ref())
    }

    /// Check the token may reach the resource `name` with `method`.
    ///
    /// A token without a resource is unrestricted. A read-only resource only
    /// admits safe methods.
    pub fn require_scope(&self, name: &str, method: &Method) -> Result<()> {
        let Some(resource) = self.resource() else {
            return Ok(());
        };
        if resource.name != name {
            tracing::warn!(
                granted = %resource.name,
                wanted = name,
                "token scope does not cover resource"
            );
            return Err(Error::InsufficientScope);
        }
        let safe = matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS);
        if resource.is_readonly && !safe {
            tracing::warn!(resource = name, %method, "write attempted on read-only scope");
            return Err(Error::InsufficientScope);
        }
        Ok(())
    }

    /// Render `error` with the challenge of the provider that authenticated
    /// this request, e.g. after a failed [`require_scope`](Self::require_scope).
    #[cfg(feature = "axum")]
    pub fn reject(&self, error: Error) -> axum::response::Response {
        error.into_challenge(&self.realm, &self.signature_methods)
    }
}

pub struct RequestValidator<S> {
    store: Arc<S>,
    config: Arc<ProviderConfig>,
    methods: Arc<SignatureMethods>,
    realm: Arc<str>,
    signature_methods: Arc<str>,
}

impl<S> Clone for RequestValidator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            methods: self.methods.clone(),
            realm: self.realm.clone(),
            signature_methods: self.signature_methods.clone(),
        }
    }
}

impl<S: CredentialStore + NonceStore> RequestValidator<S> {
    pub fn new(store: Arc<S>, config: Arc<ProviderConfig>, methods: Arc<SignatureMethods>) -> Self {
        let realm = config.realm.as_str().into();
        let signature_methods = methods.names().join(",").into();
        Self {
            store,
            config,
            methods,
            realm,
            signature_methods,
        }
    }

    pub fn methods(&self) -> &SignatureMethods {
        &self.methods
    }

    /// Validate `request`, additionally requiring every name in `extra`.
    pub async fn validate(
        &self,
        request: &OAuthRequest,
        requirement: TokenRequirement,
        extra: &[&str],
    ) -> Result<Authenticated> {
        match self.run(request, requirement, extra).await {
            Ok(authenticated) => Ok(authenticated),
            Err(e) => {
                if e.is_authentication_failure() {
                    tracing::warn!(
                        method = %request.method(),
                        url = %request.normalized_url(),
                        consumer_key = request.consumer_key().unwrap_or_default(),
                        reason = %e,
                        "rejected OAuth request"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &OAuthRequest,
        requirement: TokenRequirement,
        extra: &[&str],
    ) -> Result<Authenticated> {
        let mut required: Vec<&str> = REQUIRED_PARAMETERS.to_vec();
        if requirement != TokenRequirement::None {
            required.push(crate::request::TOKEN);
        }
        for &name in extra {
            if !required.contains(&name) {
                required.push(name);
            }
        }

        let missing = request.missing(&required);
        if !missing.is_empty() {
            return Err(Error::MissingParameters(missing));
        }

        // Presence was checked above, empty strings fall through to lookups
        let consumer_key = request.consumer_key().unwrap_or_default();
        let consumer = self
            .store
            .get_consumer(consumer_key)
            .await?
            .filter(Consumer::is_accepted)
            .ok_or(Error::InvalidConsumer)?;

        let token = match requirement.token_type() {
            None => None,
            Some(token_type) => Some(self.load_token(request, &consumer, token_type).await?),
        };

        let timestamp = request.timestamp().unwrap_or_default();
        let nonce_timestamp = timestamp.parse::<i64>().unwrap_or_default();
        let fresh = self
            .store
            .check_nonce(
                &consumer.key,
                token.as_ref().map(|t| t.key.as_str()),
                request.nonce().unwrap_or_default(),
                nonce_timestamp,
            )
            .await?;
        if !fresh {
            return Err(Error::ReplayedRequest);
        }

        if let Some(version) = request.version() {
            if version != OAUTH_VERSION {
                return Err(Error::UnsupportedVersion(version.to_string()));
            }
        }

        let seconds = timestamp.parse::<i64>().map_err(|_| Error::ExpiredTimestamp)?;
        let drift = Utc::now().timestamp().abs_diff(seconds);
        if drift > self.config.timestamp_threshold.num_seconds().unsigned_abs() {
            return Err(Error::ExpiredTimestamp);
        }

        let method = self
            .methods
            .get(request.signature_method().unwrap_or_default())?;
        let token_secret = token.as_ref().map(|t| t.secret.as_str());
        if !method.verify(request, &consumer.secret, token_secret) {
            return Err(Error::InvalidSignature);
        }

        Ok(Authenticated {
            consumer,
            token,
            realm: self.realm.clone(),
            signature_methods: self.signature_methods.clone(),
        })
    }

    async fn load_token(
        &self,
        request: &OAuthRequest,
        consumer: &Consumer,
        token_type: TokenType,
    ) -> Result<Token> {
        let key = request.token_key().unwrap_or_default();
        let token = match token_type {
            TokenType::Request => self
                .store
                .get_request_token(key)
                .await?
                .filter(|t| t.consumer_key == consumer.key),
            TokenType::Access => self.store.get_access_token(key, &consumer.key).await?,
        };
        token.ok_or(Error::InvalidToken)
    }
}
