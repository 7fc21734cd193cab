use crate::config::ProviderConfig;
use url::Url;

/// Callback value meaning "show the verifier to the user instead of
/// redirecting".
pub const OUT_OF_BAND: &str = "oob";

/// Decides whether a callback supplied at request-token time is confirmed.
#[derive(Debug, Clone)]
pub struct CallbackValidator {
    denylist: Vec<String>,
    max_length: usize,
}

impl CallbackValidator {
    pub fn new(denylist: Vec<String>, max_length: usize) -> Self {
        Self {
            denylist: denylist
                .into_iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
            max_length,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.callback_denylist.clone(), config.max_url_length)
    }

    /// `oob` is always valid. Anything else needs a scheme, a host outside
    /// the denylist and a length below the maximum.
    pub fn is_valid(&self, callback: &str) -> bool {
        if callback == OUT_OF_BAND {
            return true;
        }
        if callback.len() >= self.max_length {
            return false;
        }
        let Ok(url) = Url::parse(callback) else {
            return false;
        };
        if url.scheme().is_empty() {
            return false;
        }
        match url.host_str() {
            Some(host) => {
                let host = host.to_ascii_lowercase();
                !self.denylist.iter().any(|denied| *denied == host)
            }
            None => true,
        }
    }
}
