use crate::callback::OUT_OF_BAND;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::{Url, form_urlencoded};

/// Registration state of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerStatus {
    /// Registered, awaiting approval
    Pending,
    /// Approved, may obtain tokens
    Accepted,
    /// Withdrawn by its owner
    Canceled,
    /// Refused by an administrator
    Rejected,
}

impl ConsumerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerStatus::Pending => "pending",
            ConsumerStatus::Accepted => "accepted",
            ConsumerStatus::Canceled => "canceled",
            ConsumerStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ConsumerStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ConsumerStatus::Pending),
            "accepted" => Ok(ConsumerStatus::Accepted),
            "canceled" => Ok(ConsumerStatus::Canceled),
            "rejected" => Ok(ConsumerStatus::Rejected),
            other => Err(format!("unknown consumer status: {}", other)),
        }
    }
}

/// A registered client application
#[derive(Clone, Serialize, Deserialize)]
pub struct Consumer {
    /// Public consumer key
    pub key: String,

    /// Shared secret, never logged
    pub secret: String,

    /// Display name shown on the consent page
    pub name: String,

    /// Developer who registered the application
    pub owner: String,

    #[serde(default)]
    pub description: Option<String>,

    pub status: ConsumerStatus,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Consumer {
    pub fn is_accepted(&self) -> bool {
        self.status == ConsumerStatus::Accepted
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("status", &self.status)
            .finish()
    }
}

/// A named protected surface a token may be bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub url: String,
    /// Tokens bound to a read-only resource only authorize safe methods
    #[serde(default)]
    pub is_readonly: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Request,
    Access,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Request => "request",
            TokenType::Access => "access",
        }
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "request" => Ok(TokenType::Request),
            "access" => Ok(TokenType::Access),
            other => Err(format!("unknown token type: {}", other)),
        }
    }
}

/// Lifecycle position of a stored token.
///
/// Exchanged request tokens and revoked access tokens are deleted, so they
/// have no state of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Request token awaiting the resource owner
    Requested,
    /// Request token approved, awaiting exchange
    Authorized,
    /// Usable access token
    Active,
    /// Past its expiration timestamp
    Expired,
}

/// A request or access token
#[derive(Clone, Serialize, Deserialize)]
pub struct Token {
    pub key: String,

    /// Token secret, only echoed in the response creating the token
    pub secret: String,

    pub token_type: TokenType,

    /// Key of the owning consumer
    pub consumer_key: String,

    /// Resource owner, set on authorization
    pub user: Option<String>,

    /// Bound scope; `None` grants access to every resource
    pub resource: Option<Resource>,

    /// Callback URL or the out-of-band marker
    pub callback: Option<String>,

    pub callback_confirmed: bool,

    /// Verifier handed to the consumer on authorization
    pub verifier: Option<String>,

    pub is_approved: bool,

    pub created_at: DateTime<Utc>,

    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_expired(now) {
            return TokenState::Expired;
        }
        match (self.token_type, self.is_approved) {
            (TokenType::Request, false) => TokenState::Requested,
            (TokenType::Request, true) => TokenState::Authorized,
            (TokenType::Access, _) => TokenState::Active,
        }
    }

    pub fn is_out_of_band(&self) -> bool {
        match self.callback.as_deref() {
            None => true,
            Some(callback) => callback == OUT_OF_BAND,
        }
    }

    pub fn scope_name(&self) -> Option<&str> {
        self.resource.as_ref().map(|r| r.name.as_str())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("consumer_key", &self.consumer_key)
            .field("user", &self.user)
            .field("resource", &self.scope_name())
            .field("callback", &self.callback)
            .field("callback_confirmed", &self.callback_confirmed)
            .field("is_approved", &self.is_approved)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One observed (consumer, token, nonce, timestamp) tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonceRecord {
    pub consumer_key: String,
    /// Empty when the request carried no token
    pub token_key: String,
    pub nonce: String,
    pub timestamp: i64,
}

/// Build the URL the resource owner is sent back to.
///
/// With a verifier the callback is parsed and `oauth_verifier` followed by
/// `args` is appended to its query. Without one, `?` and the form-encoded
/// `args` are appended to the literal callback.
pub fn callback_redirect_url(
    callback: &str,
    verifier: Option<&str>,
    args: &[(&str, &str)],
) -> String {
    if let Some(verifier) = verifier {
        if let Ok(mut url) = Url::parse(callback) {
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("oauth_verifier", verifier);
                for (name, value) in args {
                    query.append_pair(name, value);
                }
            }
            return url.into();
        }
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in args {
        serializer.append_pair(name, value);
    }
    let encoded = serializer.finish();

    if encoded.is_empty() {
        callback.to_string()
    } else {
        format!("{}?{}", callback, encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(token_type: TokenType, approved: bool) -> Token {
        Token {
            key: "key".into(),
            secret: "secret".into(),
            token_type,
            consumer_key: "consumer".into(),
            user: None,
            resource: None,
            callback: Some("http://printer.example.com/cb".into()),
            callback_confirmed: true,
            verifier: None,
            is_approved: approved,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn state_follows_type_and_approval() {
        let now = Utc::now();
        assert_eq!(token(TokenType::Request, false).state(now), TokenState::Requested);
        assert_eq!(token(TokenType::Request, true).state(now), TokenState::Authorized);
        assert_eq!(token(TokenType::Access, true).state(now), TokenState::Active);

        let mut expired = token(TokenType::Access, true);
        expired.expires_at = Some(now - Duration::seconds(1));
        assert_eq!(expired.state(now), TokenState::Expired);
    }

    #[test]
    fn denial_url_appends_to_literal_callback() {
        let url = callback_redirect_url(
            "http://printer.example.com/cb",
            None,
            &[("error", "Access not granted by user.")],
        );
        assert_eq!(url, "http://printer.example.com/cb?error=Access+not+granted+by+user.");
    }

    #[test]
    fn grant_url_keeps_existing_query() {
        let url = callback_redirect_url(
            "http://printer.example.com/cb?x=1",
            Some("1234567890"),
            &[("oauth_token", "abc")],
        );
        assert_eq!(
            url,
            "http://printer.example.com/cb?x=1&oauth_verifier=1234567890&oauth_token=abc"
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", token(TokenType::Access, true));
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
