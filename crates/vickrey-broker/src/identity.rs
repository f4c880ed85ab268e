//! Session tokens.
//!
//! The broker hands out RS256-signed JWTs whose subject is the team's
//! username. The same issuer verifies them when a participant asks for a
//! private page.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::RsaPrivateKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

use vickrey_core::config::IdentityConfig;

/// Key size used when no signing key is configured.
const EPHEMERAL_KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read signing key {path}: {source}")]
    KeyRead {
        path: String,
        source: std::io::Error,
    },
    #[error("signing key is not a PKCS#8 or PKCS#1 RSA private key in {0} form")]
    KeyParse(KeyEncoding),
    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("failed to sign token")]
    Signing,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
}

/// Container format of a signing key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    Pem,
    Der,
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyEncoding::Pem => "PEM",
            KeyEncoding::Der => "DER",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
    kid: String,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    /// The team username.
    pub sub: String,
    pub uid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and checks session tokens for authenticated teams.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// An opaque token asserting `subject`.
    async fn custom_token(&self, subject: &str) -> Result<String, IdentityError>;

    /// Check a token previously minted by this provider and return its claims.
    fn verify(&self, token: &str) -> Result<SessionClaims, IdentityError>;
}

/// RS256 JWT issuer backed by a single RSA key.
pub struct Rs256TokenIssuer {
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    key_id: String,
    issuer: String,
    audience: String,
    ttl_secs: i64,
}

impl Rs256TokenIssuer {
    /// Build from a PEM or DER encoded private key (PKCS#8 or PKCS#1).
    pub fn from_key_bytes(
        pem_or_der: &[u8],
        config: &IdentityConfig,
    ) -> Result<Self, IdentityError> {
        Ok(Self::from_private_key(decode_private_key(pem_or_der)?, config))
    }

    /// Load the configured key file, or generate a throwaway key when none is
    /// configured. Tokens signed with a throwaway key stop verifying once the
    /// process exits.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        match &config.private_key_path {
            Some(path) => {
                let bytes = std::fs::read(Path::new(path)).map_err(|source| {
                    IdentityError::KeyRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                info!(path = %path, kid = %config.key_id, "loaded token signing key");
                Self::from_key_bytes(&bytes, config)
            }
            None => {
                warn!("no signing key configured, generating an ephemeral one");
                let key = RsaPrivateKey::new(&mut OsRng, EPHEMERAL_KEY_BITS)?;
                Ok(Self::from_private_key(key, config))
            }
        }
    }

    fn from_private_key(key: RsaPrivateKey, config: &IdentityConfig) -> Self {
        let verifying_key = VerifyingKey::<Sha256>::new(key.to_public_key());
        Self {
            signing_key: SigningKey::<Sha256>::new(key),
            verifying_key,
            key_id: config.key_id.clone(),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl_secs: i64::try_from(config.token_ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Sign a token for `subject` as of `now` (unix seconds).
    pub fn sign_at(&self, subject: &str, now: i64) -> Result<String, IdentityError> {
        let header = TokenHeader {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
            kid: self.key_id.clone(),
        };
        let claims = SessionClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: subject.to_string(),
            uid: subject.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature: Signature = self
            .signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|_| IdentityError::Signing)?;
        let signature = Base64UrlUnpadded::encode_string(&signature.to_vec());
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify `token` as of `now` (unix seconds). The header is checked
    /// before the signature, and the claims only once the signature holds.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<SessionClaims, IdentityError> {
        let token = EncodedToken::split(token)?;

        let header: TokenHeader = decode_segment(token.header)?;
        if header.alg != "RS256" {
            return Err(IdentityError::UnsupportedAlg(header.alg));
        }
        if header.kid != self.key_id {
            return Err(IdentityError::UnknownKid(header.kid));
        }

        let signature = token.signature()?;
        self.verifying_key
            .verify(token.signing_input().as_bytes(), &signature)
            .map_err(|_| IdentityError::InvalidSignature)?;

        let claims: SessionClaims = decode_segment(token.claims)?;
        self.check_claims(&claims, now)?;
        Ok(claims)
    }

    fn check_claims(&self, claims: &SessionClaims, now: i64) -> Result<(), IdentityError> {
        if claims.iss != self.issuer {
            Err(IdentityError::InvalidIssuer)
        } else if claims.aud != self.audience {
            Err(IdentityError::InvalidAudience)
        } else if claims.exp <= now {
            Err(IdentityError::Expired)
        } else {
            Ok(())
        }
    }
}

/// The three base64url segments of a compact JWT.
struct EncodedToken<'a> {
    header: &'a str,
    claims: &'a str,
    signature: &'a str,
}

impl<'a> EncodedToken<'a> {
    fn split(token: &'a str) -> Result<Self, IdentityError> {
        let segments: Vec<&'a str> = token.split('.').collect();
        let [header, claims, signature] = segments.as_slice() else {
            return Err(IdentityError::TokenFormat);
        };
        Ok(Self {
            header: *header,
            claims: *claims,
            signature: *signature,
        })
    }

    fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.claims)
    }

    fn signature(&self) -> Result<Signature, IdentityError> {
        let bytes =
            Base64UrlUnpadded::decode_vec(self.signature).map_err(|_| IdentityError::Base64)?;
        Signature::try_from(bytes.as_slice()).map_err(|_| IdentityError::InvalidSignature)
    }
}

#[async_trait]
impl IdentityProvider for Rs256TokenIssuer {
    async fn custom_token(&self, subject: &str) -> Result<String, IdentityError> {
        self.sign_at(subject, Utc::now().timestamp())
    }

    fn verify(&self, token: &str) -> Result<SessionClaims, IdentityError> {
        self.verify_at(token, Utc::now().timestamp())
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, IdentityError> {
    Ok(Base64UrlUnpadded::encode_string(&serde_json::to_vec(value)?))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, IdentityError> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| IdentityError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Accept PKCS#8 or PKCS#1, PEM or DER. Text that opens with a PEM armor
/// line is treated as PEM; anything else as DER.
fn decode_private_key(bytes: &[u8]) -> Result<RsaPrivateKey, IdentityError> {
    let pem = std::str::from_utf8(bytes)
        .ok()
        .filter(|text| text.trim_start().starts_with("-----BEGIN"));
    let (encoding, key) = match pem {
        Some(text) => (
            KeyEncoding::Pem,
            RsaPrivateKey::from_pkcs8_pem(text)
                .ok()
                .or_else(|| RsaPrivateKey::from_pkcs1_pem(text).ok()),
        ),
        None => (
            KeyEncoding::Der,
            RsaPrivateKey::from_pkcs8_der(bytes)
                .ok()
                .or_else(|| RsaPrivateKey::from_pkcs1_der(bytes).ok()),
        ),
    };
    key.ok_or(IdentityError::KeyParse(encoding))
}
