use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pulse_config::SecurityConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub jti: String, // JWT ID (unique per token)
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
    pub iss: String, // Issuer
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: i64,
}

/// Signs and verifies access tokens.
///
/// Key material decides the mode:
/// 1. RS256 full (sign + verify): `JWT_PRIVATE_KEY` + `JWT_PUBLIC_KEY`
/// 2. RS256 verify-only: `JWT_PUBLIC_KEY` (the gateway)
/// 3. HS256: `JWT_SECRET`
pub struct TokenManager {
    /// None if this process only verifies tokens
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_ttl_secs: i64,
    issuer: String,
}

impl TokenManager {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let (algorithm, encoding_key, decoding_key) =
            match (&config.jwt_private_key, &config.jwt_public_key, &config.jwt_secret) {
                (Some(private_key), Some(public_key), _) => {
                    tracing::info!("Initializing JWT with RS256 algorithm (sign and verify)");
                    let encoding_key = EncodingKey::from_rsa_pem(private_key.as_bytes())
                        .context("Failed to parse JWT_PRIVATE_KEY as RSA PEM")?;
                    let decoding_key = DecodingKey::from_rsa_pem(public_key.as_bytes())
                        .context("Failed to parse JWT_PUBLIC_KEY as RSA PEM")?;
                    (Algorithm::RS256, Some(encoding_key), decoding_key)
                }
                (None, Some(public_key), _) => {
                    tracing::info!("Initializing JWT with RS256 algorithm (verify-only)");
                    let decoding_key = DecodingKey::from_rsa_pem(public_key.as_bytes())
                        .context("Failed to parse JWT_PUBLIC_KEY as RSA PEM")?;
                    (Algorithm::RS256, None, decoding_key)
                }
                (_, None, Some(secret)) => {
                    tracing::info!("Initializing JWT with HS256 algorithm");
                    (
                        Algorithm::HS256,
                        Some(EncodingKey::from_secret(secret.as_bytes())),
                        DecodingKey::from_secret(secret.as_bytes()),
                    )
                }
                _ => anyhow::bail!(
                    "No JWT configuration provided. Set either:\n\
                    - JWT_SECRET (HS256)\n\
                    - JWT_PRIVATE_KEY + JWT_PUBLIC_KEY (RS256)\n\
                    - JWT_PUBLIC_KEY (verify-only)"
                ),
            };

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm,
            access_token_ttl_secs: config.access_token_ttl_secs(),
            issuer: config.jwt_issuer.clone(),
        })
    }

    /// HS256 manager from a bare secret
    pub fn from_secret(secret: &str, access_token_ttl_secs: i64, issuer: &str) -> Self {
        Self {
            encoding_key: Some(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            access_token_ttl_secs,
            issuer: issuer.to_string(),
        }
    }

    pub fn access_token_ttl_secs(&self) -> i64 {
        self.access_token_ttl_secs
    }

    /// Create a signed access token for `user_id`
    pub fn create_access_token(&self, user_id: &Uuid) -> Result<IssuedToken> {
        let encoding_key = self.encoding_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!("Cannot create tokens: TokenManager is in verify-only mode")
        })?;

        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_ttl_secs);
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, encoding_key)
            .context("Failed to encode JWT token")?;

        Ok(IssuedToken {
            token,
            jti,
            expires_at: exp.timestamp(),
        })
    }

    /// Verify signature, expiry and issuer.
    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[self.issuer.clone()]);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::from_secret("test-secret-key-for-unit-tests", 3600, "pulse")
    }

    #[test]
    fn test_token_roundtrip_carries_user_id() {
        let manager = manager();
        let user_id = Uuid::new_v4();

        let issued = manager.create_access_token(&user_id).unwrap();
        let claims = manager.verify_token(&issued.token).unwrap();

        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp, issued.expires_at);
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let issued = TokenManager::from_secret("other-secret", 3600, "pulse")
            .create_access_token(&Uuid::new_v4())
            .unwrap();
        assert!(manager().verify_token(&issued.token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = TokenManager::from_secret("test-secret-key-for-unit-tests", -60, "pulse");
        let issued = expired.create_access_token(&Uuid::new_v4()).unwrap();
        assert!(manager().verify_token(&issued.token).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let issued = TokenManager::from_secret("test-secret-key-for-unit-tests", 3600, "elsewhere")
            .create_access_token(&Uuid::new_v4())
            .unwrap();
        assert!(manager().verify_token(&issued.token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(manager().verify_token("not.a.jwt").is_err());
    }

    #[test]
    fn test_missing_key_material_is_an_error() {
        assert!(TokenManager::new(&SecurityConfig::default()).is_err());
    }
}
