use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};

use crate::config::Config;
use crate::error::ConfigurationError;

/// Token signing material derived from the configured secret.
#[derive(Clone)]
pub struct Security {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub token_ttl: Duration,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security")
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

impl Security {
    pub const ALGORITHM: Algorithm = Algorithm::HS256;

    pub fn new(secret: impl AsRef<[u8]>, token_ttl: Duration) -> Security {
        Security {
            encoding: EncodingKey::from_secret(secret.as_ref()),
            decoding: DecodingKey::from_secret(secret.as_ref()),
            token_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Result<Security, ConfigurationError> {
        config.validate()?;
        tracing::info!(
            "Using HS256 token signing with a {} minute lifetime.",
            config.token_ttl_minutes
        );
        Ok(Security::new(
            config.jwt_secret.as_bytes(),
            Duration::minutes(config.token_ttl_minutes),
        ))
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn validation(&self) -> Validation {
        let mut validation = Validation::new(Self::ALGORITHM);
        validation.leeway = 0;
        validation
    }
}
