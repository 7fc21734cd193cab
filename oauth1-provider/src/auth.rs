//! Authentication of resource owners and protected resource calls.
//!
//! The provider never logs users in itself. A [`UserAuthenticator`] tells it
//! who is behind the authorization page; signed API calls are checked by the
//! [`require_oauth`](axum_middleware::require_oauth) middleware.

use crate::error::Result;
use async_trait::async_trait;
use http::HeaderMap;

/// Resolves the resource owner behind a browser request.
#[async_trait]
pub trait UserAuthenticator: Send + Sync {
    /// The logged-in user, or `None` if nobody is logged in.
    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<String>>;
}

/// Trusts a header set by an authenticating reverse proxy.
#[derive(Debug, Clone)]
pub struct HeaderUserAuthenticator {
    header: http::HeaderName,
}

impl HeaderUserAuthenticator {
    pub fn new(header: http::HeaderName) -> Self {
        Self { header }
    }
}

impl Default for HeaderUserAuthenticator {
    fn default() -> Self {
        Self::new(http::HeaderName::from_static("x-remote-user"))
    }
}

#[async_trait]
impl UserAuthenticator for HeaderUserAuthenticator {
    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<String>> {
        Ok(headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(str::to_string))
    }
}

#[cfg(feature = "axum")]
pub mod axum_middleware {
    //! Axum glue for protected resources.

    use crate::error::Error;
    use crate::server::OAuthProvider;
    use crate::store::{CredentialStore, NonceStore};
    use crate::validator::{Authenticated, TokenRequirement};
    use axum::{
        body::Body,
        extract::{FromRequestParts, Request, State},
        http::request::Parts,
        middleware::Next,
        response::Response,
    };

    /// Largest body buffered while collecting form-encoded parameters.
    pub const MAX_BODY_SIZE: usize = 1024 * 1024;

    /// Reject any request not signed with a valid access token.
    ///
    /// On success the [`Authenticated`] principal is stored in the request
    /// extensions and can be extracted by handlers.
    ///
    /// ```rust,ignore
    /// let api = provider.protect(Router::new().route("/api/photos", get(list_photos)));
    /// ```
    pub async fn require_oauth<S>(
        State(provider): State<OAuthProvider<S>>,
        request: Request,
        next: Next,
    ) -> Response
    where
        S: CredentialStore + NonceStore + 'static,
    {
        let (parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return provider.reject(Error::InvalidRequest(format!(
                    "failed to read request body: {}",
                    e
                )));
            }
        };

        let authenticated = match provider.oauth_request(&parts, &bytes) {
            Ok(oauth_request) => {
                provider
                    .validator()
                    .validate(&oauth_request, TokenRequirement::Access, &[])
                    .await
            }
            Err(e) => Err(e),
        };

        match authenticated {
            Ok(authenticated) => {
                tracing::debug!(
                    consumer_key = %authenticated.consumer.key,
                    user = authenticated.user().unwrap_or_default(),
                    path = %parts.uri.path(),
                    "authenticated protected resource call"
                );
                let mut request = Request::from_parts(parts, Body::from(bytes));
                request.extensions_mut().insert(authenticated);
                next.run(request).await
            }
            Err(e) => provider.reject(e),
        }
    }

    impl<S> FromRequestParts<S> for Authenticated
    where
        S: Send + Sync,
    {
        type Rejection = Error;

        async fn from_request_parts(
            parts: &mut Parts,
            _state: &S,
        ) -> std::result::Result<Self, Self::Rejection> {
            parts.extensions.get::<Authenticated>().cloned().ok_or_else(|| {
                Error::Internal("route is not behind require_oauth".to_string())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[tokio::test]
    async fn header_authenticator_reads_trimmed_user() {
        let users = HeaderUserAuthenticator::default();
        let mut headers = HeaderMap::new();
        assert_eq!(users.current_user(&headers).await.unwrap(), None);

        headers.insert("x-remote-user", HeaderValue::from_static("  "));
        assert_eq!(users.current_user(&headers).await.unwrap(), None);

        headers.insert("x-remote-user", HeaderValue::from_static(" jane "));
        assert_eq!(
            users.current_user(&headers).await.unwrap().as_deref(),
            Some("jane")
        );
    }
}
