//! Verification of bearer tokens issued by the external identity provider.

use crate::config::AuthConfig;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

/// Claims HustleDesk relies on. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self, AppError> {
        let (decoding_key, algorithm) = match (&config.jwt_public_key, &config.jwt_secret) {
            (Some(pem), _) => {
                let key = DecodingKey::from_rsa_pem(pem.replace("\\n", "\n").as_bytes())
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("Invalid AUTH_JWT_PUBLIC_KEY: {}", e))
                    })?;
                (key, Algorithm::RS256)
            }
            (None, Some(secret)) => (
                DecodingKey::from_secret(secret.expose_secret().as_bytes()),
                Algorithm::HS256,
            ),
            (None, None) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "No JWT verification key configured"
                )))
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        tracing::info!(algorithm = ?algorithm, "Token verifier initialized");

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}
