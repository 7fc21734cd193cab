mod common;

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use common::*;
use oauth1_provider::{
    Authenticated, HeaderUserAuthenticator, OAuthProvider, OAuthRequest, SignatureMethodKind,
};
use std::sync::Arc;
use tower::ServiceExt;

const HMAC: SignatureMethodKind = SignatureMethodKind::HmacSha1;

async fn photos(authenticated: Authenticated, method: Method) -> Response {
    match authenticated.require_scope("photos", &method) {
        Ok(()) => Json(serde_json::json!({ "user": authenticated.user() })).into_response(),
        Err(e) => authenticated.reject(e),
    }
}

async fn documents(authenticated: Authenticated, method: Method) -> Response {
    match authenticated.require_scope("documents", &method) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => authenticated.reject(e),
    }
}

fn app() -> Router {
    let provider = OAuthProvider::builder()
        .config(config())
        .store(store())
        .user_authenticator(Arc::new(HeaderUserAuthenticator::default()))
        .build()
        .unwrap();

    let api = Router::new()
        .route("/photos", get(photos).post(photos))
        .route("/documents", get(documents));
    provider.router().merge(provider.protect(api))
}

fn signed_request(request: &OAuthRequest) -> Request<Body> {
    let uri = request
        .url()
        .as_str()
        .strip_prefix(HOST)
        .unwrap()
        .to_string();
    Request::builder()
        .method(request.method().clone())
        .uri(uri)
        .header(header::AUTHORIZATION, authorization_header(request))
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn form_value(body: &str, name: &str) -> String {
    url::form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

struct Credentials {
    key: String,
    secret: String,
}

async fn request_token(app: &Router, callback: &str, scope: Option<&str>) -> (Credentials, String) {
    let url = match scope {
        Some(scope) => format!("{}/oauth/request_token/?scope={}", HOST, scope),
        None => format!("{}/oauth/request_token/", HOST),
    };
    let request = sign(
        unsigned(Method::POST, &url, CONSUMER_KEY, HMAC).with_param("oauth_callback", callback),
        HMAC,
        CONSUMER_SECRET,
        None,
    );

    let response = app.clone().oneshot(signed_request(&request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-www-form-urlencoded"
    );
    let body = body_string(response).await;
    (
        Credentials {
            key: form_value(&body, "oauth_token"),
            secret: form_value(&body, "oauth_token_secret"),
        },
        form_value(&body, "oauth_callback_confirmed"),
    )
}

async fn authorize(app: &Router, token_key: &str, grant: bool) -> Response {
    let form = if grant {
        format!("oauth_token={}&authorize_access=1", token_key)
    } else {
        format!("oauth_token={}", token_key)
    };
    app.clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/oauth/authorize/")
                .header("x-remote-user", "jane")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn access_token(app: &Router, token: &Credentials, verifier: &str) -> Response {
    let request = sign(
        unsigned(
            Method::POST,
            &format!("{}/oauth/access_token/", HOST),
            CONSUMER_KEY,
            HMAC,
        )
        .with_param("oauth_token", token.key.as_str())
        .with_param("oauth_verifier", verifier),
        HMAC,
        CONSUMER_SECRET,
        Some(&token.secret),
    );
    app.clone().oneshot(signed_request(&request)).await.unwrap()
}

async fn authorized_access_token(app: &Router, scope: Option<&str>) -> Credentials {
    let (token, _) = request_token(app, CALLBACK, scope).await;
    let response = authorize(app, &token.key, true).await;
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    let verifier = query_value(location, "oauth_verifier").unwrap();

    let response = access_token(app, &token, &verifier).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(!body.contains("oauth_callback_confirmed"));
    Credentials {
        key: form_value(&body, "oauth_token"),
        secret: form_value(&body, "oauth_token_secret"),
    }
}

fn resource_call(method: Method, path: &str, token: &Credentials) -> Request<Body> {
    let request = sign(
        unsigned(method, &format!("{}{}", HOST, path), CONSUMER_KEY, HMAC)
            .with_param("oauth_token", token.key.as_str()),
        HMAC,
        CONSUMER_SECRET,
        Some(&token.secret),
    );
    signed_request(&request)
}

#[tokio::test]
async fn full_flow_over_http() {
    let app = app();

    let (token, confirmed) = request_token(&app, CALLBACK, None).await;
    assert_eq!(confirmed, "true");
    assert_eq!(token.key.len(), 32);

    let response = authorize(&app, &token.key, true).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with("http://printer.example.com/cb?oauth_verifier="));
    assert_eq!(query_value(location, "oauth_token").unwrap(), token.key);
    let verifier = query_value(location, "oauth_verifier").unwrap();

    let response = access_token(&app, &token, &verifier).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    let access = Credentials {
        key: form_value(&body, "oauth_token"),
        secret: form_value(&body, "oauth_token_secret"),
    };

    let response = app
        .clone()
        .oneshot(resource_call(Method::GET, "/photos", &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"user":"jane"}"#);
}

#[tokio::test]
async fn failures_answer_with_uniform_challenge() {
    let app = app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/photos")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "OAuth realm=\"photos\""
    );
    assert_eq!(
        response.headers().get("x-oauth-signature-methods").unwrap(),
        "HMAC-SHA1,PLAINTEXT"
    );
    let missing_body = body_string(response).await;

    let request = sign(
        unsigned(
            Method::POST,
            &format!("{}/oauth/request_token/", HOST),
            "unknownconsumer1",
            HMAC,
        )
        .with_param("oauth_callback", "oob"),
        HMAC,
        CONSUMER_SECRET,
        None,
    );
    let response = app.clone().oneshot(signed_request(&request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let unknown_body = body_string(response).await;

    assert_eq!(missing_body, "Invalid OAuth request.");
    assert_eq!(unknown_body, missing_body);
}

#[tokio::test]
async fn denial_redirects_with_error() {
    let app = app();
    let (token, _) = request_token(&app, CALLBACK, None).await;

    let response = authorize(&app, &token.key, false).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "http://printer.example.com/cb?error=Access+not+granted+by+user."
    );

    let response = access_token(&app, &token, "0000000000").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn out_of_band_shows_verifier() {
    let app = app();
    let (token, confirmed) = request_token(&app, "oob", None).await;
    assert_eq!(confirmed, "true");

    let response = authorize(&app, &token.key, true).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["oauth_token"], token.key.as_str());
    let verifier = body["oauth_verifier"].as_str().unwrap().to_string();

    let response = access_token(&app, &token, &verifier).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn authorization_requires_a_user() {
    let app = app();
    let (token, _) = request_token(&app, CALLBACK, Some("photos")).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/oauth/authorize/?oauth_token={}", token.key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/oauth/authorize/?oauth_token={}", token.key))
                .header("x-remote-user", "jane")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["consumer"]["name"], "printer");
    assert_eq!(body["scope"]["name"], "photos");
    assert_eq!(body["user"], "jane");
}

#[tokio::test]
async fn scope_is_enforced_by_handlers() {
    let app = app();
    let access = authorized_access_token(&app, Some("photos")).await;

    let response = app
        .clone()
        .oneshot(resource_call(Method::GET, "/photos", &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(resource_call(Method::GET, "/documents", &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "OAuth realm=\"photos\""
    );
    assert_eq!(
        response.headers().get("x-oauth-signature-methods").unwrap(),
        "HMAC-SHA1,PLAINTEXT"
    );
    assert_eq!(body_string(response).await, "Invalid OAuth request.");

    let response = app
        .clone()
        .oneshot(resource_call(Method::POST, "/photos", &access))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn replayed_call_is_challenged() {
    let app = app();
    let access = authorized_access_token(&app, None).await;

    let request = sign(
        unsigned(Method::GET, &format!("{}/photos", HOST), CONSUMER_KEY, HMAC)
            .with_param("oauth_token", access.key.as_str()),
        HMAC,
        CONSUMER_SECRET,
        Some(&access.secret),
    );

    let response = app.clone().oneshot(signed_request(&request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.clone().oneshot(signed_request(&request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
