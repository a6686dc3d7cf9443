//! Authentication blocks applied to outgoing requests

use crate::types::Headers;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Authentication attached to a request or chain step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSpec {
    #[default]
    None,
    Basic {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    Bearer {
        #[serde(default)]
        token: String,
    },
    #[serde(alias = "api-key", alias = "apikey", alias = "apiKey")]
    ApiKey {
        #[serde(rename = "keyName", alias = "key_name")]
        key_name: String,
        #[serde(rename = "keyValue", alias = "key_value", default)]
        key_value: String,
    },
}

impl AuthSpec {
    /// Rewrite every credential field through `f`. Used for placeholder
    /// substitution in chain steps.
    pub fn map_values(&self, mut f: impl FnMut(&str) -> String) -> AuthSpec {
        match self {
            AuthSpec::None => AuthSpec::None,
            AuthSpec::Basic { username, password } => AuthSpec::Basic {
                username: f(username),
                password: f(password),
            },
            AuthSpec::Bearer { token } => AuthSpec::Bearer { token: f(token) },
            AuthSpec::ApiKey {
                key_name,
                key_value,
            } => AuthSpec::ApiKey {
                key_name: f(key_name),
                key_value: f(key_value),
            },
        }
    }

    /// The header this auth block injects, if any
    pub fn header(&self) -> Option<(String, String)> {
        match self {
            AuthSpec::None => None,
            AuthSpec::Basic { username, password } => {
                let encoded = BASE64.encode(format!("{}:{}", username, password));
                Some(("Authorization".to_string(), format!("Basic {}", encoded)))
            }
            AuthSpec::Bearer { token } => {
                Some(("Authorization".to_string(), format!("Bearer {}", token)))
            }
            AuthSpec::ApiKey {
                key_name,
                key_value,
            } => {
                if key_name.trim().is_empty() {
                    None
                } else {
                    Some((key_name.clone(), key_value.clone()))
                }
            }
        }
    }

    /// Inject the auth header, replacing any header of the same name
    pub fn apply(&self, headers: &mut Headers) {
        if let Some((name, value)) = self.header() {
            headers.insert(name, value);
        }
    }
}
