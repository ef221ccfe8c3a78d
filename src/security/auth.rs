//! Auth and query-param application.
//!
//! Pure and synchronous: turns an auth descriptor into extra headers or query
//! params before the request reaches the executor. Secret values never reach
//! logs; the `Debug` output is redacted.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::security::headers::RawHeaders;

/// Where an API key is placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Auth descriptor attached to a saved or ad hoc request.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Auth {
    #[default]
    None,
    Bearer {
        #[serde(default)]
        token: String,
    },
    Basic {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    #[serde(rename = "apikey")]
    ApiKey {
        #[serde(default)]
        key: String,
        #[serde(default)]
        value: String,
        #[serde(default, rename = "apiKeyIn", alias = "in")]
        location: ApiKeyLocation,
    },
    /// Any descriptor type this build does not know; passed through.
    #[serde(other)]
    Unknown,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("Auth::None"),
            Auth::Bearer { .. } => f.write_str("Auth::Bearer { token: <redacted> }"),
            Auth::Basic { username, .. } => f
                .debug_struct("Auth::Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::ApiKey { key, location, .. } => f
                .debug_struct("Auth::ApiKey")
                .field("key", key)
                .field("value", &"<redacted>")
                .field("location", location)
                .finish(),
            Auth::Unknown => f.write_str("Auth::Unknown"),
        }
    }
}

/// Headers and params after auth has been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub headers: RawHeaders,
    pub params: BTreeMap<String, String>,
}

fn set_header(headers: &mut RawHeaders, name: &str, value: String) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    headers.insert(name.to_ascii_lowercase(), Value::String(value));
}

/// Apply `auth` to the given headers and params.
pub fn apply(auth: &Auth, mut headers: RawHeaders, mut params: BTreeMap<String, String>) -> Applied {
    match auth {
        Auth::Bearer { token } => {
            let token = token.trim();
            if !token.is_empty() {
                set_header(&mut headers, "authorization", format!("Bearer {token}"));
            }
        }
        Auth::Basic { username, password } => {
            if !username.is_empty() || !password.is_empty() {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                set_header(&mut headers, "authorization", format!("Basic {encoded}"));
            }
        }
        Auth::ApiKey { key, value, location } => {
            let key = key.trim();
            if !key.is_empty() {
                match location {
                    ApiKeyLocation::Header => set_header(&mut headers, key, value.clone()),
                    ApiKeyLocation::Query => {
                        params.insert(key.to_string(), value.clone());
                    }
                }
            }
        }
        Auth::None | Auth::Unknown => {}
    }
    Applied { headers, params }
}
