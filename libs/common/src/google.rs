//! Google service-account client
//!
//! Exchanges an RS256-signed assertion for an OAuth2 access token
//! (JWT bearer grant) with the indexing and analytics-readonly scopes.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GoogleError;

const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/indexing",
    "https://www.googleapis.com/auth/analytics.readonly",
];
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Fields of the service-account JSON we rely on
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Access token issued by the token endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

struct Signer {
    client_email: String,
    token_uri: String,
    key: EncodingKey,
}

/// Service-account token client
#[derive(Clone)]
pub struct GoogleService {
    signer: Option<Arc<Signer>>,
    http: reqwest::Client,
}

impl GoogleService {
    /// Load the service account from `path`. A missing or malformed file
    /// leaves the service uninitialized.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let key = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<ServiceAccountKey>(&raw).map_err(|e| e.to_string()));

        match key {
            Ok(key) => Self::from_key(key),
            Err(e) => {
                warn!(
                    "[GoogleAPI] Failed to read configuration file {} during service initialization: {}",
                    path.display(),
                    e
                );
                Self::uninitialized()
            }
        }
    }

    pub fn from_key(key: ServiceAccountKey) -> Self {
        let signer = match EncodingKey::from_rsa_pem(key.private_key.as_bytes()) {
            Ok(encoding_key) => Some(Arc::new(Signer {
                client_email: key.client_email,
                token_uri: key.token_uri,
                key: encoding_key,
            })),
            Err(e) => {
                warn!("[GoogleAPI] Invalid service account private key: {}", e);
                None
            }
        };
        Self {
            signer,
            http: reqwest::Client::new(),
        }
    }

    pub fn uninitialized() -> Self {
        Self {
            signer: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.signer.is_some()
    }

    /// Request a fresh access token
    pub async fn get_credentials(&self) -> Result<Credentials, GoogleError> {
        let signer = self.signer.as_ref().ok_or(GoogleError::NotInitialized)?;
        let claims = assertion_claims(&signer.client_email, &signer.token_uri, Utc::now().timestamp());
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signer.key)?;

        let response = self
            .http
            .post(&signer.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let credentials = response
            .error_for_status()
            .map_err(|e| {
                warn!("[GoogleAPI] Failed to get certificate: {}", e);
                e
            })?
            .json::<Credentials>()
            .await?;
        Ok(credentials)
    }
}

fn assertion_claims<'a>(client_email: &'a str, token_uri: &'a str, now: i64) -> AssertionClaims<'a> {
    AssertionClaims {
        iss: client_email,
        scope: SCOPES.join(" "),
        aud: token_uri,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_leaves_service_uninitialized() {
        let service = GoogleService::from_file("/nonexistent/google_service_account.json");
        assert!(!service.is_initialized());
        assert!(matches!(
            service.get_credentials().await,
            Err(GoogleError::NotInitialized)
        ));
    }

    #[test]
    fn malformed_private_key_is_rejected() {
        let service = GoogleService::from_key(ServiceAccountKey {
            client_email: "blog@project.iam.gserviceaccount.com".to_string(),
            private_key: "not a pem".to_string(),
            token_uri: default_token_uri(),
        });
        assert!(!service.is_initialized());
    }

    #[test]
    fn key_file_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email":"blog@project.iam.gserviceaccount.com","private_key":"pem"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn claims_cover_both_scopes_for_one_hour() {
        let claims = assertion_claims("blog@example.com", DEFAULT_TOKEN_URI, 1_000);
        assert_eq!(
            claims.scope,
            "https://www.googleapis.com/auth/indexing https://www.googleapis.com/auth/analytics.readonly"
        );
        assert_eq!(claims.aud, DEFAULT_TOKEN_URI);
        assert_eq!(claims.exp - claims.iat, 3600);
    }
}
