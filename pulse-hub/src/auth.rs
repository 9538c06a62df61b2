//! Auth gate.
//!
//! Credentials are presented once, when the connection is established, either
//! as `?token=<jwt>` or as an `Authorization: Bearer <jwt>` header. The gate
//! resolves them to an [`Identity`] through a [`TokenVerifier`]; the bundled
//! verifier is [`JwtManager`].

use async_trait::async_trait;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::error::{AuthError, HubError};

/// Resolved identity of an authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// User id
    pub user_id: String,
    /// Roles granted by the token issuer
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Identity {
    /// Returns true if the identity carries `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Verifies a credential and resolves it to an identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies `credential`.
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// JWT ID (unique identifier)
    pub jti: String,
    /// Granted roles
    #[serde(default)]
    pub roles: Vec<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            roles: claims.roles,
        }
    }
}

/// JWT token manager.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    expiration_secs: i64,
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration_secs", &self.expiration_secs)
            .finish_non_exhaustive()
    }
}

impl JwtManager {
    /// Creates a new JWT manager from configuration.
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            expiration_secs: i64::try_from(config.expiration_secs).unwrap_or(i64::MAX),
        }
    }

    /// Generates a new JWT token for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if token encoding fails.
    pub fn generate_token(&self, user_id: &str, roles: &[String]) -> Result<String, HubError> {
        self.generate_token_with_ttl(user_id, roles, Duration::seconds(self.expiration_secs))
    }

    fn generate_token_with_ttl(
        &self,
        user_id: &str,
        roles: &[String],
        ttl: Duration,
    ) -> Result<String, HubError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            roles: roles.to_vec(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| HubError::Internal(format!("Failed to generate token: {e}")))
    }

    /// Validates a JWT token and returns the claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Expired` for expired tokens and
    /// `AuthError::InvalidCredential` for anything else that fails validation.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;

        let token_data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidCredential(e.to_string()),
            })?;

        Ok(token_data.claims)
    }
}

#[async_trait]
impl TokenVerifier for JwtManager {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        self.validate_token(credential).map(Identity::from)
    }
}

/// Extracts the bearer token from an Authorization header value.
#[must_use]
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
}

/// Picks the credential for a connection request.
///
/// The query parameter wins over the header. Blank values count as absent.
#[must_use]
pub fn credential_from_request(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    query_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(extract_bearer_token)
                .filter(|token| !token.is_empty())
        })
        .map(String::from)
}

/// Runs the auth gate for one connection attempt.
///
/// Returns `Ok(None)` for an anonymous admission. A credential that is present
/// but fails verification is always an error, even when anonymous access is
/// allowed.
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    credential: Option<&str>,
    allow_anonymous: bool,
) -> Result<Option<Identity>, AuthError> {
    match credential {
        Some(token) => verifier.verify(token).await.map(Some),
        None if allow_anonymous => Ok(None),
        None => Err(AuthError::MissingCredential),
    }
}
