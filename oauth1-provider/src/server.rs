use crate::{
    auth::{UserAuthenticator, axum_middleware::require_oauth},
    config::ProviderConfig,
    error::{Error, Result},
    model::Token,
    request::{CALLBACK, OAuthRequest, TOKEN, VERIFIER},
    signature::SignatureMethods,
    store::{CredentialStore, NonceStore},
    token::{AuthorizationOutcome, TokenManager, credentials_response},
    validator::{RequestValidator, TokenRequirement},
};
use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

/// OAuth 1.0a service provider: the three protocol endpoints plus the
/// middleware guarding protected resources.
pub struct OAuthProvider<S> {
    config: Arc<ProviderConfig>,
    store: Arc<S>,
    validator: RequestValidator<S>,
    tokens: TokenManager<S>,
    users: Arc<dyn UserAuthenticator>,
    signature_methods_header: Arc<str>,
}

impl<S> Clone for OAuthProvider<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            validator: self.validator.clone(),
            tokens: self.tokens.clone(),
            users: self.users.clone(),
            signature_methods_header: self.signature_methods_header.clone(),
        }
    }
}

impl<S> OAuthProvider<S>
where
    S: CredentialStore + NonceStore + 'static,
{
    /// Create a new provider builder.
    pub fn builder() -> OAuthProviderBuilder<S> {
        OAuthProviderBuilder::default()
    }

    /// Router with the request-token, authorize and access-token endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/oauth/request_token/",
                get(handle_request_token).post(handle_request_token),
            )
            .route(
                "/oauth/authorize/",
                get(handle_authorize_form).post(handle_authorize),
            )
            .route(
                "/oauth/access_token/",
                get(handle_access_token).post(handle_access_token),
            )
            .with_state(self.clone())
    }

    /// Put every route of `router` behind OAuth access-token authentication.
    pub fn protect(&self, router: Router) -> Router {
        router.route_layer(axum::middleware::from_fn_with_state(
            self.clone(),
            require_oauth::<S>,
        ))
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn validator(&self) -> &RequestValidator<S> {
        &self.validator
    }

    pub fn tokens(&self) -> &TokenManager<S> {
        &self.tokens
    }

    /// Rebuild the signed request from its transport pieces. The URL is the
    /// public one from configuration, not whatever host the socket saw.
    pub fn oauth_request(&self, parts: &Parts, body: &[u8]) -> Result<OAuthRequest> {
        self.build_request(&parts.method, &parts.uri, &parts.headers, body)
    }

    fn build_request(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<OAuthRequest> {
        let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        OAuthRequest::from_parts(
            method.clone(),
            &self.config.endpoint(path_and_query),
            header_str(headers, header::AUTHORIZATION),
            header_str(headers, header::CONTENT_TYPE),
            body,
        )
    }

    /// Render an error, authentication failures as a challenge.
    pub fn reject(&self, error: Error) -> Response {
        match &error {
            Error::StorageError(_) | Error::Internal(_) => {
                tracing::error!(error = %error, "OAuth request failed");
            }
            e if !e.is_authentication_failure() => {
                tracing::info!(error = %error, "OAuth request refused");
            }
            _ => {}
        }
        error.into_challenge(&self.config.realm, &self.signature_methods_header)
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn form_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-www-form-urlencoded")],
        body,
    )
        .into_response()
}

fn redirect(location: &str) -> Result<Response> {
    let location = HeaderValue::from_str(location)
        .map_err(|e| Error::Internal(format!("invalid redirect location: {}", e)))?;
    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

/// Issue a request token.
async fn handle_request_token<S>(
    State(server): State<OAuthProvider<S>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: CredentialStore + NonceStore + 'static,
{
    tracing::info!("handling request token request");
    request_token(&server, &method, &uri, &headers, &body)
        .await
        .unwrap_or_else(|e| server.reject(e))
}

async fn request_token<S>(
    server: &OAuthProvider<S>,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response>
where
    S: CredentialStore + NonceStore + 'static,
{
    let request = server.build_request(method, uri, headers, body)?;
    let authenticated = server
        .validator
        .validate(&request, TokenRequirement::None, &[CALLBACK])
        .await?;

    let token = server
        .tokens
        .issue_request_token(
            &authenticated.consumer,
            request.callback().unwrap_or_default(),
            request.scope(),
        )
        .await?;

    Ok(form_response(credentials_response(
        &token,
        Some(token.callback_confirmed),
    )?))
}

#[derive(Debug, Deserialize)]
struct AuthorizeQuery {
    oauth_token: Option<String>,
}

/// Describe a pending request token so a consent page can be rendered.
async fn handle_authorize_form<S>(
    State(server): State<OAuthProvider<S>>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> Response
where
    S: CredentialStore + NonceStore + 'static,
{
    authorize_form(&server, &headers, query)
        .await
        .unwrap_or_else(|e| server.reject(e))
}

async fn authorize_form<S>(
    server: &OAuthProvider<S>,
    headers: &HeaderMap,
    query: AuthorizeQuery,
) -> Result<Response>
where
    S: CredentialStore + NonceStore + 'static,
{
    let user = server
        .users
        .current_user(headers)
        .await?
        .ok_or(Error::LoginRequired)?;
    let token = pending_request_token(server, query.oauth_token.as_deref()).await?;
    let consumer = server
        .store
        .get_consumer(&token.consumer_key)
        .await?
        .ok_or(Error::InvalidConsumer)?;

    let description = serde_json::json!({
        "oauth_token": token.key,
        "user": user,
        "consumer": {
            "name": consumer.name,
            "description": consumer.description,
        },
        "scope": token.resource.as_ref().map(|r| serde_json::json!({
            "name": r.name,
            "url": r.url,
            "is_readonly": r.is_readonly,
        })),
        "callback_confirmed": token.callback_confirmed,
        "is_approved": token.is_approved,
    });

    Ok((StatusCode::OK, Json(description)).into_response())
}

#[derive(Debug, Deserialize)]
struct AuthorizeForm {
    oauth_token: Option<String>,
    #[serde(default)]
    authorize_access: Option<String>,
}

impl AuthorizeForm {
    fn granted(&self) -> bool {
        matches!(
            self.authorize_access.as_deref().map(str::trim),
            Some("1" | "on" | "true" | "yes")
        )
    }
}

/// Record the resource owner's decision.
async fn handle_authorize<S>(
    State(server): State<OAuthProvider<S>>,
    headers: HeaderMap,
    Form(form): Form<AuthorizeForm>,
) -> Response
where
    S: CredentialStore + NonceStore + 'static,
{
    tracing::info!("handling authorize request");
    authorize(&server, &headers, form)
        .await
        .unwrap_or_else(|e| server.reject(e))
}

async fn authorize<S>(
    server: &OAuthProvider<S>,
    headers: &HeaderMap,
    form: AuthorizeForm,
) -> Result<Response>
where
    S: CredentialStore + NonceStore + 'static,
{
    let user = server
        .users
        .current_user(headers)
        .await?
        .ok_or(Error::LoginRequired)?;
    let token = pending_request_token(server, form.oauth_token.as_deref()).await?;

    let outcome = server
        .tokens
        .record_authorization(&token, &user, form.granted())
        .await?;

    match outcome {
        AuthorizationOutcome::Redirect { url, .. } => redirect(&url),
        AuthorizationOutcome::OutOfBand { token_key, verifier } => Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "oauth_token": token_key,
                "oauth_verifier": verifier,
            })),
        )
            .into_response()),
        AuthorizationOutcome::OutOfBandDenied => Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "error": crate::token::ACCESS_DENIED_MESSAGE,
            })),
        )
            .into_response()),
    }
}

async fn pending_request_token<S>(server: &OAuthProvider<S>, key: Option<&str>) -> Result<Token>
where
    S: CredentialStore + NonceStore + 'static,
{
    let key = key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::MissingParameters(vec![TOKEN.to_string()]))?;
    server
        .store
        .get_request_token(key)
        .await?
        .ok_or(Error::InvalidToken)
}

/// Exchange an authorized request token for an access token.
async fn handle_access_token<S>(
    State(server): State<OAuthProvider<S>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: CredentialStore + NonceStore + 'static,
{
    tracing::info!("handling access token request");
    access_token(&server, &method, &uri, &headers, &body)
        .await
        .unwrap_or_else(|e| server.reject(e))
}

async fn access_token<S>(
    server: &OAuthProvider<S>,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response>
where
    S: CredentialStore + NonceStore + 'static,
{
    let request = server.build_request(method, uri, headers, body)?;
    let extra: &[&str] = if server.config.require_verifier {
        &[VERIFIER]
    } else {
        &[]
    };
    let authenticated = server
        .validator
        .validate(&request, TokenRequirement::Request, extra)
        .await?;
    let request_token = authenticated.token.ok_or(Error::InvalidToken)?;

    let access_token = server
        .tokens
        .exchange_for_access_token(&authenticated.consumer, &request_token, request.verifier())
        .await?;

    Ok(form_response(credentials_response(&access_token, None)?))
}

/// Builder for OAuthProvider.
pub struct OAuthProviderBuilder<S> {
    config: Option<ProviderConfig>,
    store: Option<Arc<S>>,
    users: Option<Arc<dyn UserAuthenticator>>,
    methods: Option<SignatureMethods>,
}

impl<S> Default for OAuthProviderBuilder<S> {
    fn default() -> Self {
        Self {
            config: None,
            store: None,
            users: None,
            methods: None,
        }
    }
}

impl<S> OAuthProviderBuilder<S>
where
    S: CredentialStore + NonceStore + 'static,
{
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn user_authenticator(mut self, users: Arc<dyn UserAuthenticator>) -> Self {
        self.users = Some(users);
        self
    }

    /// Replace the signature methods built from the configuration, e.g. to
    /// register a custom method.
    pub fn signature_methods(mut self, methods: SignatureMethods) -> Self {
        self.methods = Some(methods);
        self
    }

    pub fn build(self) -> Result<OAuthProvider<S>> {
        let config = Arc::new(
            self.config
                .ok_or_else(|| Error::InvalidRequest("config required".to_string()))?,
        );
        let store = self
            .store
            .ok_or_else(|| Error::InvalidRequest("store required".to_string()))?;
        let users = self
            .users
            .ok_or_else(|| Error::InvalidRequest("user authenticator required".to_string()))?;

        let methods = self
            .methods
            .unwrap_or_else(|| SignatureMethods::new(&config.signature_methods));
        let signature_methods_header: Arc<str> = methods.names().join(",").into();
        if signature_methods_header.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one signature method must be enabled".to_string(),
            ));
        }

        let validator = RequestValidator::new(store.clone(), config.clone(), Arc::new(methods));
        let tokens = TokenManager::new(store.clone(), config.clone());

        Ok(OAuthProvider {
            config,
            store,
            validator,
            tokens,
            users,
            signature_methods_header,
        })
    }
}
