#![allow(dead_code)]

use chrono::Utc;
use http::Method;
use oauth1_provider::request::percent_encode;
use oauth1_provider::token::generate_random_string;
use oauth1_provider::{
    Consumer, ConsumerStatus, MemoryStore, OAuthRequest, ProviderConfig, RequestValidator,
    Resource, SignatureMethodKind, SignatureMethods, TokenManager,
};
use std::sync::Arc;
use url::Url;

pub const HOST: &str = "http://photos.example.net";

pub const CONSUMER_KEY: &str = "dpf43f3p2l4k3l03";
pub const CONSUMER_SECRET: &str = "kd94hf93k423kf44";
pub const PENDING_KEY: &str = "pendingconsumer0";
pub const PENDING_SECRET: &str = "pendingsecret000";
pub const CALLBACK: &str = "http://printer.example.com/cb";

pub fn config() -> ProviderConfig {
    ProviderConfig::new(Url::parse(HOST).unwrap())
        .with_realm("photos")
        .with_callback_denylist(vec!["evil.example.com".into()])
}

fn consumer(key: &str, secret: &str, status: ConsumerStatus) -> Consumer {
    Consumer {
        key: key.into(),
        secret: secret.into(),
        name: "printer".into(),
        owner: "jane".into(),
        description: Some("Printing service".into()),
        status,
        created_at: Utc::now(),
    }
}

/// An accepted printer consumer, a pending one, and two resources.
pub fn store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .insert_consumer(consumer(CONSUMER_KEY, CONSUMER_SECRET, ConsumerStatus::Accepted))
        .unwrap();
    store
        .insert_consumer(consumer(PENDING_KEY, PENDING_SECRET, ConsumerStatus::Pending))
        .unwrap();
    store
        .insert_resource(Resource {
            name: "photos".into(),
            url: "/photos".into(),
            is_readonly: true,
        })
        .unwrap();
    store
        .insert_resource(Resource {
            name: "documents".into(),
            url: "/documents".into(),
            is_readonly: false,
        })
        .unwrap();
    Arc::new(store)
}

pub struct Provider {
    pub store: Arc<MemoryStore>,
    pub validator: RequestValidator<MemoryStore>,
    pub tokens: TokenManager<MemoryStore>,
}

pub fn provider_with(config: ProviderConfig) -> Provider {
    let store = store();
    let config = Arc::new(config);
    let methods = Arc::new(SignatureMethods::new(&config.signature_methods));
    Provider {
        validator: RequestValidator::new(store.clone(), config.clone(), methods),
        tokens: TokenManager::new(store.clone(), config),
        store,
    }
}

pub fn provider() -> Provider {
    provider_with(config())
}

/// Request carrying every protocol parameter except the signature.
pub fn unsigned(
    method: Method,
    url: &str,
    consumer_key: &str,
    kind: SignatureMethodKind,
) -> OAuthRequest {
    OAuthRequest::new(method, Url::parse(url).unwrap())
        .with_param("oauth_consumer_key", consumer_key)
        .with_param("oauth_nonce", generate_random_string(16))
        .with_param("oauth_timestamp", Utc::now().timestamp().to_string())
        .with_param("oauth_signature_method", kind.wire_name())
        .with_param("oauth_version", "1.0")
}

pub fn sign(
    mut request: OAuthRequest,
    kind: SignatureMethodKind,
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> OAuthRequest {
    let signature = kind
        .method()
        .sign(&request, consumer_secret, token_secret)
        .unwrap();
    request.set_param("oauth_signature", signature);
    request
}

/// `OAuth realm="photos", ...` header carrying the request's protocol
/// parameters.
pub fn authorization_header(request: &OAuthRequest) -> String {
    let params: Vec<String> = request
        .params()
        .iter()
        .filter(|(k, _)| k.starts_with("oauth_"))
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect();
    format!("OAuth realm=\"photos\", {}", params.join(", "))
}

pub fn query_value(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
