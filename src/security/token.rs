//! HMAC-signed session tokens (compact JWS).
//!
//! Tokens are issued with HS256. Validation also accepts HS384 and HS512 so a
//! future switch does not invalidate live sessions; every other `alg`,
//! including `none`, is rejected before the signature is looked at.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use std::sync::Arc;
use tracing::debug;

use super::clock::Clock;
use super::config::{bounded_span, TokenConfig, MAX_TOKEN_TTL, MIN_SECRET_BYTES};
use super::error::AuthError;
use crate::store::{AdminAccount, AdminId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(value) => value == audience,
            Self::Many(values) => values.iter().any(|value| value == audience),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub admin_id: AdminId,
    pub login: String,
    pub sub: String,
    pub iss: String,
    pub aud: Audience,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Algorithm {
    Hs256,
    Hs384,
    Hs512,
}

impl Algorithm {
    fn parse(alg: &str) -> Option<Self> {
        match alg {
            "HS256" => Some(Self::Hs256),
            "HS384" => Some(Self::Hs384),
            "HS512" => Some(Self::Hs512),
            _ => None,
        }
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value)
        .map_err(|err| AuthError::Internal(format!("failed to encode token segment: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, AuthError> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)
}

fn mac<M: Mac + hmac::digest::KeyInit>(secret: &[u8], input: &[u8]) -> Result<M, AuthError> {
    let mut mac = <M as Mac>::new_from_slice(secret)
        .map_err(|err| AuthError::Configuration(format!("invalid signing key: {err}")))?;
    mac.update(input);
    Ok(mac)
}

#[derive(Debug)]
pub struct TokenService {
    config: TokenConfig,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// # Errors
    /// Returns `AuthError::Configuration` when the secret is shorter than 32
    /// bytes or the TTL is above [`MAX_TOKEN_TTL`].
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let length = config.secret().expose_secret().len();
        if length < MIN_SECRET_BYTES {
            return Err(AuthError::Configuration(format!(
                "token secret must be at least {MIN_SECRET_BYTES} bytes, got {length}"
            )));
        }
        let ttl = bounded_span("token ttl", config.ttl(), MAX_TOKEN_TTL)?;
        Ok(Self { config, ttl, clock })
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn sign(&self, algorithm: Algorithm, input: &[u8]) -> Result<Vec<u8>, AuthError> {
        let secret = self.config.secret().expose_secret().as_bytes();
        Ok(match algorithm {
            Algorithm::Hs256 => mac::<Hmac<Sha256>>(secret, input)?
                .finalize()
                .into_bytes()
                .to_vec(),
            Algorithm::Hs384 => mac::<Hmac<Sha384>>(secret, input)?
                .finalize()
                .into_bytes()
                .to_vec(),
            Algorithm::Hs512 => mac::<Hmac<Sha512>>(secret, input)?
                .finalize()
                .into_bytes()
                .to_vec(),
        })
    }

    fn verify(&self, algorithm: Algorithm, input: &[u8], signature: &[u8]) -> Result<(), AuthError> {
        let secret = self.config.secret().expose_secret().as_bytes();
        let checked = match algorithm {
            Algorithm::Hs256 => mac::<Hmac<Sha256>>(secret, input)?.verify_slice(signature),
            Algorithm::Hs384 => mac::<Hmac<Sha384>>(secret, input)?.verify_slice(signature),
            Algorithm::Hs512 => mac::<Hmac<Sha512>>(secret, input)?.verify_slice(signature),
        };
        checked.map_err(|_| AuthError::InvalidToken)
    }

    /// Issue an HS256 token for `account`, valid from now for the configured TTL.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if the claims cannot be encoded, or
    /// `AuthError::Configuration` if the expiry is past the representable range.
    pub fn issue(&self, account: &AdminAccount) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            AuthError::Configuration(format!("token ttl of {} overflows from {now}", self.ttl))
        })?;

        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            admin_id: account.id,
            login: account.login.clone(),
            sub: account.login.clone(),
            iss: self.config.issuer().to_string(),
            aud: Audience::Many(vec![self.config.audience().to_string()]),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let signing_input = format!("{}.{}", b64e_json(&header)?, b64e_json(&claims)?);
        let signature = self.sign(Algorithm::Hs256, signing_input.as_bytes())?;
        let token = format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        );

        Ok(IssuedToken {
            token,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .unwrap_or(expires_at),
        })
    }

    /// Verify the signature, issuer, audience and validity window of `token`.
    ///
    /// # Errors
    /// `ExpiredToken` when an otherwise valid token has reached `exp`;
    /// `InvalidToken` for everything else.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
        let claims_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
        let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
        if parts.next().is_some() {
            return Err(AuthError::InvalidToken);
        }

        let header: Header = b64d_json(header_b64)?;
        let Some(algorithm) = Algorithm::parse(&header.alg) else {
            debug!(alg = %header.alg, "rejected token algorithm");
            return Err(AuthError::InvalidToken);
        };

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| AuthError::InvalidToken)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        self.verify(algorithm, signing_input.as_bytes(), &signature)?;

        let claims: Claims = b64d_json(claims_b64)?;
        if claims.iss != self.config.issuer() || !claims.aud.contains(self.config.audience()) {
            return Err(AuthError::InvalidToken);
        }

        let now = self.clock.now().timestamp();
        if now >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }
        if now < claims.nbf {
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    /// # Errors
    /// Same as [`Self::validate`].
    pub fn extract_identity(&self, token: &str) -> Result<AdminId, AuthError> {
        self.validate(token).map(|claims| claims.admin_id)
    }
}
