//! Access token issuing and validation with signing-key rotation.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use bazaar_core::config::AuthConfig;
use bazaar_core::error::AppError;
use bazaar_core::types::{SessionId, UserId};
use bazaar_entity::session::AssuranceLevel;

use super::claims::AccessClaims;
use super::digest::{generate_opaque_token, hash_token};

/// Random bytes in a refresh token.
const REFRESH_TOKEN_BYTES: usize = 32;

/// A freshly signed access token and what the session row must remember.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    /// Encoded JWT handed to the client.
    pub token: String,
    /// SHA-256 of `token`, stored as the session's access hash.
    pub hash: String,
    /// When the token stops validating.
    pub expires_at: chrono::DateTime<Utc>,
    /// Claims that were signed.
    pub claims: AccessClaims,
}

/// A verification key and the `kid` it is advertised under.
#[derive(Clone)]
struct VerificationKey {
    kid: String,
    key: DecodingKey,
}

/// Signs access tokens with the current secret and validates them against
/// the current secret plus any retired ones still in rotation.
#[derive(Clone)]
pub struct TokenService {
    /// HMAC key for signing.
    encoding_key: EncodingKey,
    /// `kid` header of tokens signed with the current key.
    current_kid: String,
    /// Current key first, then retired keys in configured order.
    verification_keys: Vec<VerificationKey>,
    /// Validation configuration.
    validation: Validation,
    /// `iss` claim value.
    issuer: String,
    /// Access token lifetime.
    access_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("current_kid", &self.current_kid)
            .field("verification_keys", &self.verification_keys.len())
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .finish()
    }
}

/// Key id derived from the secret, so a token names its key across rotations.
fn key_id(secret: &str) -> String {
    hex::encode(&Sha256::digest(secret.as_bytes())[..8])
}

impl TokenService {
    /// Creates a token service from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);

        let verification_keys = std::iter::once(&config.jwt_secret)
            .chain(config.jwt_previous_secrets.iter())
            .map(|secret| VerificationKey {
                kid: key_id(secret),
                key: DecodingKey::from_secret(secret.as_bytes()),
            })
            .collect();

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            current_kid: key_id(&config.jwt_secret),
            verification_keys,
            validation,
            issuer: config.jwt_issuer.clone(),
            access_ttl: config.access_ttl(),
        }
    }

    /// Signs a new access token for `session_id` at assurance `aal`.
    pub fn issue_access_token(
        &self,
        user_id: UserId,
        email: &str,
        session_id: SessionId,
        aal: AssuranceLevel,
    ) -> Result<IssuedAccessToken, AppError> {
        let now = Utc::now();
        let expires_at = now + self.access_ttl;
        let claims = AccessClaims {
            sub: user_id,
            email: email.to_string(),
            sid: session_id,
            aal: aal.as_u8(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
            iss: self.issuer.clone(),
        };

        let token = self.sign(&claims)?;
        Ok(IssuedAccessToken {
            hash: hash_token(&token),
            token,
            expires_at,
            claims,
        })
    }

    /// Validates signature, algorithm, issuer, expiry and claim shape.
    ///
    /// Does not consult the session store; a valid result says nothing
    /// about revocation.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        let header =
            decode_header(token).map_err(|_| AppError::unauthorized("Invalid token format"))?;
        if header.alg != Algorithm::HS256 {
            return Err(AppError::unauthorized("Unsupported token algorithm"));
        }

        let named = header
            .kid
            .as_deref()
            .and_then(|kid| self.verification_keys.iter().find(|k| k.kid == kid));
        let candidates: Vec<&VerificationKey> = match named {
            Some(key) => vec![key],
            None => self.verification_keys.iter().collect(),
        };

        for candidate in candidates {
            match decode::<AccessClaims>(token, &candidate.key, &self.validation) {
                Ok(data) => return Self::check_shape(data.claims),
                Err(e) if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::InvalidSignature) => {
                    debug!(kid = %candidate.kid, "Signature did not match key");
                }
                Err(e) => return Err(map_jwt_error(&e)),
            }
        }

        Err(AppError::unauthorized("Invalid token signature"))
    }

    /// Creates a new opaque refresh token (32 random bytes, base64url).
    pub fn generate_refresh_token(&self) -> String {
        generate_opaque_token(REFRESH_TOKEN_BYTES)
    }

    /// Deterministic one-way hash applied before storing or comparing tokens.
    pub fn hash_token(&self, raw: &str) -> String {
        hash_token(raw)
    }

    fn sign(&self, claims: &AccessClaims) -> Result<String, AppError> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.current_kid.clone());
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode access token: {e}")))
    }

    fn check_shape(claims: AccessClaims) -> Result<AccessClaims, AppError> {
        if AssuranceLevel::from_level(claims.aal).is_none() {
            return Err(AppError::unauthorized("Invalid assurance level claim"));
        }
        if claims.email.is_empty() || claims.iat > claims.exp {
            return Err(AppError::unauthorized("Malformed token claims"));
        }
        Ok(claims)
    }
}

fn map_jwt_error(e: &jsonwebtoken::errors::Error) -> AppError {
    use jsonwebtoken::errors::ErrorKind;

    match e.kind() {
        ErrorKind::ExpiredSignature => AppError::unauthorized("Token has expired"),
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AppError::unauthorized("Invalid token format")
        }
        ErrorKind::InvalidAlgorithm => AppError::unauthorized("Unsupported token algorithm"),
        ErrorKind::InvalidIssuer => AppError::unauthorized("Invalid token issuer"),
        ErrorKind::MissingRequiredClaim(claim) => {
            AppError::unauthorized(format!("Token is missing the {claim} claim"))
        }
        _ => AppError::unauthorized("Token validation failed"),
    }
}
