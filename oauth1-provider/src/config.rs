use crate::signature::SignatureMethodKind;
use chrono::Duration;
use url::Url;

/// Longest callback URL accepted, in bytes.
pub const MAX_URL_LENGTH: usize = 2083;

/// Configuration for the OAuth provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Public address of this provider, used to rebuild signed request URLs
    pub host: Url,

    /// Realm announced in authentication challenges
    pub realm: String,

    /// Signature methods consumers may use
    pub signature_methods: Vec<SignatureMethodKind>,

    /// Callback hosts that are never confirmed
    pub callback_denylist: Vec<String>,

    /// Callbacks must be strictly shorter than this
    pub max_url_length: usize,

    /// Maximum distance between a request timestamp and the server clock
    pub timestamp_threshold: Duration,

    /// Require `oauth_verifier` on access-token exchange (OAuth 1.0a)
    pub require_verifier: bool,

    /// Lifetime of unexchanged request tokens; `None` never expires
    pub request_token_lifetime: Option<Duration>,

    /// Lifetime of access tokens; `None` never expires
    pub access_token_lifetime: Option<Duration>,
}

impl ProviderConfig {
    /// Create a new configuration with sensible defaults
    pub fn new(host: impl Into<Url>) -> Self {
        Self {
            host: host.into(),
            realm: String::new(),
            signature_methods: vec![SignatureMethodKind::Plaintext, SignatureMethodKind::HmacSha1],
            callback_denylist: Vec::new(),
            max_url_length: MAX_URL_LENGTH,
            timestamp_threshold: Duration::seconds(300),
            require_verifier: true,
            request_token_lifetime: Some(Duration::hours(1)),
            access_token_lifetime: None,
        }
    }

    /// Set the challenge realm
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Set the enabled signature methods
    pub fn with_signature_methods(mut self, methods: Vec<SignatureMethodKind>) -> Self {
        self.signature_methods = methods;
        self
    }

    /// Set the callback host denylist
    pub fn with_callback_denylist(mut self, hosts: Vec<String>) -> Self {
        self.callback_denylist = hosts;
        self
    }

    pub fn with_max_url_length(mut self, length: usize) -> Self {
        self.max_url_length = length;
        self
    }

    pub fn with_timestamp_threshold(mut self, threshold: Duration) -> Self {
        self.timestamp_threshold = threshold;
        self
    }

    pub fn with_require_verifier(mut self, require: bool) -> Self {
        self.require_verifier = require;
        self
    }

    pub fn with_request_token_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.request_token_lifetime = lifetime;
        self
    }

    pub fn with_access_token_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Comma separated wire names of the enabled methods
    pub fn signature_methods_header(&self) -> String {
        self.signature_methods
            .iter()
            .map(|m| m.wire_name())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Absolute URL of a path on this provider
    pub fn endpoint(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.host.as_str().trim_end_matches('/'),
            path_and_query
        )
    }
}
