/// JWT signing and verification keys
///
/// Keys are built once from configuration and handed to whoever issues or
/// validates tokens. Two layouts are supported:
///
/// - **HS256** from a shared secret (single-service deployments)
/// - **RS256** from PEM-encoded RSA keys (when other services verify tokens)
///
/// Verification pins the algorithm the keys were built with, so a token
/// signed with a different algorithm is rejected outright.
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Minimum accepted length for HS256 secrets
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("JWT secret must be at least {min} bytes, got {actual}")]
    WeakSecret { min: usize, actual: usize },

    #[error("Failed to parse RSA private key: {0}")]
    InvalidPrivateKey(jsonwebtoken::errors::Error),

    #[error("Failed to parse RSA public key: {0}")]
    InvalidPublicKey(jsonwebtoken::errors::Error),
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    /// Build HS256 keys from a shared secret
    pub fn from_secret(secret: &str) -> Result<Self, KeyError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(KeyError::WeakSecret {
                min: MIN_SECRET_BYTES,
                actual: secret.len(),
            });
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
        })
    }

    /// Build RS256 keys from PEM strings
    pub fn from_rsa_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(KeyError::InvalidPrivateKey)?;
        let decoding = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(KeyError::InvalidPublicKey)?;

        Ok(Self {
            encoding,
            decoding,
            algorithm: Algorithm::RS256,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign `claims` with the configured algorithm
    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(self.algorithm), claims, &self.encoding)
    }

    /// Verify signature and expiry, returning the decoded claims.
    ///
    /// No clock leeway is applied: a token is dead the second `exp` passes.
    pub fn verify<C: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<C, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<C>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}
