//! The abstract OAuth request.
//!
//! Protocol parameters may arrive in the `Authorization: OAuth ...` header,
//! the query string or a form-encoded body. They are merged into one
//! parameter list in that order; single-valued lookups take the first
//! occurrence so header values win.

use crate::error::{Error, Result};
use http::Method;
use url::{Url, form_urlencoded};

pub const CONSUMER_KEY: &str = "oauth_consumer_key";
pub const TOKEN: &str = "oauth_token";
pub const NONCE: &str = "oauth_nonce";
pub const TIMESTAMP: &str = "oauth_timestamp";
pub const SIGNATURE: &str = "oauth_signature";
pub const SIGNATURE_METHOD: &str = "oauth_signature_method";
pub const VERSION: &str = "oauth_version";
pub const CALLBACK: &str = "oauth_callback";
pub const VERIFIER: &str = "oauth_verifier";

/// Parameters every signed request carries.
pub const REQUIRED_PARAMETERS: [&str; 5] =
    [CONSUMER_KEY, NONCE, SIGNATURE, SIGNATURE_METHOD, TIMESTAMP];

/// Percent-encode per RFC 5849 §3.6 (everything but unreserved characters).
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[derive(Debug, Clone)]
pub struct OAuthRequest {
    method: Method,
    url: Url,
    params: Vec<(String, String)>,
}

impl OAuthRequest {
    /// Request with the parameters of the URL's query string.
    pub fn new(method: Method, url: Url) -> Self {
        let params = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self {
            method,
            url,
            params,
        }
    }

    /// Assemble a request from its transport pieces.
    ///
    /// The body only contributes parameters when it is form encoded.
    pub fn from_parts(
        method: Method,
        url: &str,
        authorization: Option<&str>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::InvalidRequest(format!("invalid request URL: {}", e)))?;

        let mut params = match authorization {
            Some(value) => parse_authorization_header(value)?,
            None => Vec::new(),
        };

        params.extend(
            url.query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );

        let is_form = content_type.is_some_and(|ct| {
            ct.trim()
                .to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        });
        if is_form && !body.is_empty() {
            params.extend(
                form_urlencoded::parse(body).map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }

        Ok(Self {
            method,
            url,
            params,
        })
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Replace every occurrence of `name` with a single value.
    pub fn set_param(&mut self, name: &str, value: impl Into<String>) {
        self.params.retain(|(k, _)| k != name);
        self.params.push((name.to_string(), value.into()));
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names from `names` absent from this request, in order.
    pub fn missing(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter(|name| !self.contains(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Whether any protocol parameter is present at all.
    pub fn has_oauth_params(&self) -> bool {
        self.params.iter().any(|(k, _)| k.starts_with("oauth_"))
    }

    pub fn consumer_key(&self) -> Option<&str> {
        self.get(CONSUMER_KEY)
    }

    pub fn token_key(&self) -> Option<&str> {
        self.get(TOKEN)
    }

    pub fn nonce(&self) -> Option<&str> {
        self.get(NONCE)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.get(TIMESTAMP)
    }

    pub fn signature(&self) -> Option<&str> {
        self.get(SIGNATURE)
    }

    pub fn signature_method(&self) -> Option<&str> {
        self.get(SIGNATURE_METHOD)
    }

    pub fn version(&self) -> Option<&str> {
        self.get(VERSION)
    }

    pub fn callback(&self) -> Option<&str> {
        self.get(CALLBACK)
    }

    pub fn verifier(&self) -> Option<&str> {
        self.get(VERIFIER)
    }

    pub fn scope(&self) -> Option<&str> {
        self.get("scope")
    }

    /// Scheme, authority and path, lowercased host, default port dropped.
    pub fn normalized_url(&self) -> String {
        let scheme = self.url.scheme().to_ascii_lowercase();
        let host = self
            .url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default();
        let port = self
            .url
            .port()
            .map(|p| format!(":{}", p))
            .unwrap_or_default();
        let path = match self.url.path() {
            "" => "/",
            path => path,
        };
        format!("{}://{}{}{}", scheme, host, port, path)
    }

    /// Encoded, sorted `name=value` pairs excluding the signature.
    pub fn normalized_parameters(&self) -> String {
        let mut pairs: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|(k, _)| k != SIGNATURE)
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Signature base string of RFC 5849 §3.4.1.
    pub fn signature_base_string(&self) -> String {
        format!(
            "{}&{}&{}",
            self.method.as_str().to_ascii_uppercase(),
            percent_encode(&self.normalized_url()),
            percent_encode(&self.normalized_parameters())
        )
    }
}

/// Parse the parameters of an `OAuth` authorization header. `realm` is
/// dropped; other schemes yield no parameters.
pub fn parse_authorization_header(value: &str) -> Result<Vec<(String, String)>> {
    let value = value.trim();
    let Some((scheme, rest)) = value.split_once(' ') else {
        return Ok(Vec::new());
    };
    if !scheme.eq_ignore_ascii_case("oauth") {
        return Ok(Vec::new());
    }

    let mut params = Vec::new();
    for part in rest.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, raw) = part.split_once('=').ok_or_else(|| {
            Error::InvalidRequest(format!("malformed authorization parameter: {}", part))
        })?;
        let name = name.trim();
        if name.eq_ignore_ascii_case("realm") {
            continue;
        }
        let raw = raw.trim();
        let raw = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .unwrap_or(raw);
        let decoded = urlencoding::decode(raw).map_err(|e| {
            Error::InvalidRequest(format!("invalid encoding in {}: {}", name, e))
        })?;
        params.push((name.to_string(), decoded.into_owned()));
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 5849 §3.4.1.1 example request
    fn rfc_request() -> OAuthRequest {
        OAuthRequest::from_parts(
            Method::POST,
            "http://example.com/request?b5=%3D%253D&a3=a&c%40=&a2=r%20b",
            Some(
                "OAuth realm=\"Example\", oauth_consumer_key=\"9djdj82h48djs9d2\", \
                 oauth_token=\"kkk9d7dh3k39sjv7\", oauth_signature_method=\"HMAC-SHA1\", \
                 oauth_timestamp=\"137131201\", oauth_nonce=\"7d8f3e4a\", \
                 oauth_signature=\"bYT5CMsGcbgUdFHObYMEfcx6bsw%3D\"",
            ),
            Some("application/x-www-form-urlencoded"),
            b"c2&a3=2+q",
        )
        .unwrap()
    }

    #[test]
    fn header_parameters_are_decoded_and_realm_dropped() {
        let request = rfc_request();
        assert_eq!(request.consumer_key(), Some("9djdj82h48djs9d2"));
        assert_eq!(request.signature(), Some("bYT5CMsGcbgUdFHObYMEfcx6bsw="));
        assert!(!request.contains("realm"));
    }

    #[test]
    fn normalized_parameters_match_rfc_example() {
        assert_eq!(
            rfc_request().normalized_parameters(),
            "a2=r%20b&a3=2%20q&a3=a&b5=%3D%253D&c%40=&c2=&oauth_consumer_key=9djdj82h48djs9d2\
             &oauth_nonce=7d8f3e4a&oauth_signature_method=HMAC-SHA1&oauth_timestamp=137131201\
             &oauth_token=kkk9d7dh3k39sjv7"
        );
    }

    #[test]
    fn base_string_uses_normalized_url() {
        let request = OAuthRequest::new(
            Method::GET,
            Url::parse("HTTP://Example.COM:80/r%20v/X?id=123").unwrap(),
        );
        assert_eq!(request.normalized_url(), "http://example.com/r%20v/X");
        assert!(
            request
                .signature_base_string()
                .starts_with("GET&http%3A%2F%2Fexample.com%2Fr%2520v%2FX&id%3D123")
        );
    }

    #[test]
    fn json_bodies_contribute_nothing() {
        let request = OAuthRequest::from_parts(
            Method::POST,
            "http://example.com/photo/",
            None,
            Some("application/json"),
            br#"{"oauth_token":"x"}"#,
        )
        .unwrap();
        assert!(request.params().is_empty());
    }

    #[test]
    fn missing_lists_absent_names() {
        let request = OAuthRequest::new(
            Method::GET,
            Url::parse("http://example.com/?oauth_consumer_key=k&oauth_nonce=n").unwrap(),
        );
        assert_eq!(
            request.missing(&REQUIRED_PARAMETERS),
            vec!["oauth_signature", "oauth_signature_method", "oauth_timestamp"]
        );
    }
}
