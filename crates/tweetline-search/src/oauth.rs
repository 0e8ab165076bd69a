//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Builds the `Authorization` header for a request from the consumer
//! credentials and, optionally, an access token. Query parameters of the
//! request URL are folded into the signature base string.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha1::Sha1;
use uuid::Uuid;

type HmacSha1 = Hmac<Sha1>;

/// A key/secret pair (consumer or access token)
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Signs requests on behalf of one consumer
#[derive(Debug, Clone)]
pub struct Signer {
    consumer: Credentials,
    token: Option<Credentials>,
}

impl Signer {
    pub fn new(consumer: Credentials, token: Option<Credentials>) -> Self {
        Self { consumer, token }
    }

    /// `Authorization` header value with a fresh nonce and timestamp
    pub fn authorization_header(&self, method: &str, url: &Url) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        self.authorization_header_at(method, url, &nonce, Utc::now().timestamp())
    }

    /// `Authorization` header value for a fixed nonce and timestamp
    pub fn authorization_header_at(
        &self,
        method: &str,
        url: &Url,
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let mut oauth_params: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer.key.clone()),
            ("oauth_nonce".into(), nonce.to_string()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp.to_string()),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some(token) = &self.token {
            oauth_params.push(("oauth_token".into(), token.key.clone()));
        }

        let mut all_params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        all_params.extend(oauth_params.iter().cloned());

        let base = signature_base_string(method, &base_url(url), &all_params);
        let signature = self.sign(&base);
        oauth_params.push(("oauth_signature".into(), signature));

        let fields = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {fields}")
    }

    /// Base64 HMAC-SHA1 of the base string, keyed by consumer and token secrets
    pub fn sign(&self, base_string: &str) -> String {
        let token_secret = self.token.as_ref().map_or("", |t| t.secret.as_str());
        let key = format!(
            "{}&{}",
            percent_encode(&self.consumer.secret),
            percent_encode(token_secret)
        );
        let mut mac =
            HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(base_string.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// `METHOD&enc(base_url)&enc(sorted params)`
pub fn signature_base_string(method: &str, base_url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(base_url),
        percent_encode(&param_string)
    )
}

/// Scheme, host, port (if non-default) and path; no query or fragment
fn base_url(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.to_string()
}

/// Percent-encode per RFC 3986, leaving only `A-Z a-z 0-9 - _ . ~`
pub fn percent_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}
