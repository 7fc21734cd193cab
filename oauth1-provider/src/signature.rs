//! Pluggable signature methods.
//!
//! The validator only decides *when* a signature is checked; the algorithm
//! lives behind [`SignatureMethod`]. PLAINTEXT, HMAC-SHA1 and HMAC-SHA256 are
//! built in and further methods can be registered on [`SignatureMethods`].

use crate::error::{Error, Result};
use crate::request::{OAuthRequest, percent_encode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Built-in signature methods, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureMethodKind {
    Plaintext,
    HmacSha1,
    HmacSha256,
}

impl SignatureMethodKind {
    /// Name carried in `oauth_signature_method`
    pub fn wire_name(&self) -> &'static str {
        match self {
            SignatureMethodKind::Plaintext => "PLAINTEXT",
            SignatureMethodKind::HmacSha1 => "HMAC-SHA1",
            SignatureMethodKind::HmacSha256 => "HMAC-SHA256",
        }
    }

    pub fn method(&self) -> Arc<dyn SignatureMethod> {
        match self {
            SignatureMethodKind::Plaintext => Arc::new(Plaintext),
            SignatureMethodKind::HmacSha1 => Arc::new(HmacSha1Method),
            SignatureMethodKind::HmacSha256 => Arc::new(HmacSha256Method),
        }
    }
}

impl FromStr for SignatureMethodKind {
    type Err = String;

    /// Accepts configuration names (`hmac-sha1`) and wire names (`HMAC-SHA1`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plaintext" => Ok(SignatureMethodKind::Plaintext),
            "hmac-sha1" => Ok(SignatureMethodKind::HmacSha1),
            "hmac-sha256" => Ok(SignatureMethodKind::HmacSha256),
            other => Err(format!("unknown signature method: {}", other)),
        }
    }
}

impl fmt::Display for SignatureMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A signature algorithm.
pub trait SignatureMethod: Send + Sync {
    /// Name carried in `oauth_signature_method`
    fn name(&self) -> &str;

    /// Compute the signature of `request`.
    fn sign(
        &self,
        request: &OAuthRequest,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> Result<String>;

    /// Check the request's `oauth_signature` in constant time.
    fn verify(
        &self,
        request: &OAuthRequest,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> bool {
        let Some(provided) = request.signature() else {
            return false;
        };
        match self.sign(request, consumer_secret, token_secret) {
            Ok(expected) => bool::from(expected.as_bytes().ct_eq(provided.as_bytes())),
            Err(_) => false,
        }
    }
}

/// `enc(consumer_secret)&enc(token_secret)`, the key of every built-in method.
pub fn signing_key(consumer_secret: &str, token_secret: Option<&str>) -> String {
    format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret.unwrap_or(""))
    )
}

pub struct Plaintext;

impl SignatureMethod for Plaintext {
    fn name(&self) -> &str {
        "PLAINTEXT"
    }

    fn sign(
        &self,
        _request: &OAuthRequest,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> Result<String> {
        Ok(signing_key(consumer_secret, token_secret))
    }
}

pub struct HmacSha1Method;

impl SignatureMethod for HmacSha1Method {
    fn name(&self) -> &str {
        "HMAC-SHA1"
    }

    fn sign(
        &self,
        request: &OAuthRequest,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> Result<String> {
        let mut mac = HmacSha1::new_from_slice(signing_key(consumer_secret, token_secret).as_bytes())
            .map_err(|e| Error::Internal(format!("invalid HMAC key: {}", e)))?;
        mac.update(request.signature_base_string().as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn verify(
        &self,
        request: &OAuthRequest,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> bool {
        let Some(provided) = request.signature().and_then(|s| STANDARD.decode(s).ok()) else {
            return false;
        };
        let Ok(mut mac) =
            HmacSha1::new_from_slice(signing_key(consumer_secret, token_secret).as_bytes())
        else {
            return false;
        };
        mac.update(request.signature_base_string().as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

pub struct HmacSha256Method;

impl SignatureMethod for HmacSha256Method {
    fn name(&self) -> &str {
        "HMAC-SHA256"
    }

    fn sign(
        &self,
        request: &OAuthRequest,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> Result<String> {
        let mut mac =
            HmacSha256::new_from_slice(signing_key(consumer_secret, token_secret).as_bytes())
                .map_err(|e| Error::Internal(format!("invalid HMAC key: {}", e)))?;
        mac.update(request.signature_base_string().as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn verify(
        &self,
        request: &OAuthRequest,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> bool {
        let Some(provided) = request.signature().and_then(|s| STANDARD.decode(s).ok()) else {
            return false;
        };
        let Ok(mut mac) =
            HmacSha256::new_from_slice(signing_key(consumer_secret, token_secret).as_bytes())
        else {
            return false;
        };
        mac.update(request.signature_base_string().as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

/// The set of enabled signature methods, keyed by wire name.
#[derive(Clone, Default)]
pub struct SignatureMethods {
    methods: HashMap<String, Arc<dyn SignatureMethod>>,
}

impl SignatureMethods {
    pub fn new(kinds: &[SignatureMethodKind]) -> Self {
        let mut methods = Self::default();
        for kind in kinds {
            methods.register(kind.method());
        }
        methods
    }

    /// Enable a method, replacing any method of the same name.
    pub fn register(&mut self, method: Arc<dyn SignatureMethod>) {
        self.methods
            .insert(method.name().to_ascii_uppercase(), method);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn SignatureMethod>> {
        self.methods
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| Error::UnsupportedSignatureMethod(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.values().map(|m| m.name()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for SignatureMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
