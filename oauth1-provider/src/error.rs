use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Body returned for every authentication failure. The specific reason is
/// only ever logged.
pub const CHALLENGE_BODY: &str = "Invalid OAuth request.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Protocol authentication failures
    MissingParameters(Vec<String>),
    InvalidConsumer,
    InvalidToken,
    ReplayedRequest,
    UnsupportedSignatureMethod(String),
    InvalidSignature,
    UnsupportedVersion(String),
    ExpiredTimestamp,
    InvalidScope(String),
    InsufficientScope,

    // Authorization flow errors
    InvalidCallback,
    PermissionDenied(&'static str),
    LoginRequired,

    // Malformed transport input
    InvalidRequest(String),

    // Storage errors
    StorageError(String),

    // Generic errors
    Internal(String),
}

impl Error {
    /// Whether this failure is answered with an authentication challenge.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::MissingParameters(_)
                | Error::InvalidConsumer
                | Error::InvalidToken
                | Error::ReplayedRequest
                | Error::UnsupportedSignatureMethod(_)
                | Error::InvalidSignature
                | Error::UnsupportedVersion(_)
                | Error::ExpiredTimestamp
                | Error::InvalidScope(_)
                | Error::InsufficientScope
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingParameters(names) => {
                write!(f, "missing OAuth parameters: {}", names.join(", "))
            }
            Error::InvalidConsumer => write!(f, "invalid consumer"),
            Error::InvalidToken => write!(f, "invalid token"),
            Error::ReplayedRequest => write!(f, "nonce already used"),
            Error::UnsupportedSignatureMethod(method) => {
                write!(f, "unsupported signature method: {}", method)
            }
            Error::InvalidSignature => write!(f, "invalid signature"),
            Error::UnsupportedVersion(version) => {
                write!(f, "unsupported OAuth version: {}", version)
            }
            Error::ExpiredTimestamp => write!(f, "timestamp outside the accepted window"),
            Error::InvalidScope(scope) => write!(f, "unknown scope: {}", scope),
            Error::InsufficientScope => write!(f, "token not allowed to access this resource"),
            Error::InvalidCallback => write!(f, "invalid callback URL"),
            Error::PermissionDenied(reason) => write!(f, "permission denied: {}", reason),
            Error::LoginRequired => write!(f, "resource owner not authenticated"),
            Error::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            Error::StorageError(msg) => write!(f, "storage error: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(feature = "axum")]
impl Error {
    /// Render this error for the wire. Authentication failures become a 401
    /// challenge carrying the realm and the enabled signature methods.
    pub fn into_challenge(self, realm: &str, signature_methods: &str) -> axum::response::Response {
        use axum::http::{HeaderValue, StatusCode, header};
        use axum::response::IntoResponse;

        if self.is_authentication_failure() {
            let mut response = (StatusCode::UNAUTHORIZED, CHALLENGE_BODY).into_response();
            let challenge = format!("OAuth realm=\"{}\"", realm.replace('"', ""));
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
            if !signature_methods.is_empty() {
                if let Ok(value) = HeaderValue::from_str(signature_methods) {
                    response.headers_mut().insert(
                        header::HeaderName::from_static("x-oauth-signature-methods"),
                        value,
                    );
                }
            }
            return response;
        }

        let (status, body) = match self {
            Error::PermissionDenied(_) => (StatusCode::FORBIDDEN, "Action not allowed.".to_string()),
            Error::LoginRequired => (
                StatusCode::UNAUTHORIZED,
                "Authentication required.".to_string(),
            ),
            Error::InvalidCallback => (StatusCode::BAD_REQUEST, "Invalid callback URL.".to_string()),
            Error::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error.".to_string(),
            ),
        };

        (status, body).into_response()
    }
}

// axum IntoResponse implementation
#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        self.into_challenge("", "")
    }
}
