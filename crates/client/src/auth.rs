//! Key-pair JWT authentication.
//!
//! [`KeyPairAuth`] signs short-lived RS256 tokens with the account's RSA
//! private key and hands the cached token to every request until it expires.
//! Refreshes are single-flight: when the token has expired, one caller signs
//! a new one while the others wait on an async lock and then reuse it. The
//! PEM is parsed into a signing key once per client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{Credentials, MAX_JWT_TOKEN_TTL};
use crate::error::{ClientError, Result};

/// Value of the header telling the service which auth scheme the bearer uses.
pub const AUTH_TOKEN_TYPE: &str = "KEYPAIR_JWT";

/// Claims carried by every key-pair token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// `{ORG-}ACCOUNT.USER.SHA256:<fingerprint>`
    pub iss: String,
    /// `{ORG-}ACCOUNT.USER`
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// A signed token and the epoch second at which it stops being valid.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub token: String,
    pub expires_at: u64,
}

impl AuthToken {
    fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Produces and caches key-pair bearer tokens for one client.
pub struct KeyPairAuth {
    credentials: Credentials,
    ttl: Duration,
    current: RwLock<Option<AuthToken>>,
    refresh: Mutex<()>,
    fingerprint: OnceLock<String>,
    encoding_key: OnceLock<EncodingKey>,
    signings: AtomicU64,
}

impl KeyPairAuth {
    /// The key is not parsed here; a bad key surfaces on the first [`token`](Self::token) call.
    pub fn new(credentials: Credentials, ttl: Duration) -> Self {
        let fingerprint = OnceLock::new();
        if let Some(supplied) = credentials.public_key_fingerprint.clone() {
            let _ = fingerprint.set(supplied);
        }
        Self {
            credentials,
            ttl: ttl.min(MAX_JWT_TOKEN_TTL),
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            fingerprint,
            encoding_key: OnceLock::new(),
            signings: AtomicU64::new(0),
        }
    }

    /// Current bearer token, signing a fresh one when the cached one has expired.
    pub async fn token(&self) -> Result<String> {
        self.token_at(unix_now()).await
    }

    pub(crate) async fn token_at(&self, now: u64) -> Result<String> {
        if let Some(token) = self.cached(now) {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.cached(now) {
            return Ok(token);
        }

        let fresh = self.sign(now)?;
        let token = fresh.token.clone();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(fresh);
        Ok(token)
    }

    /// Number of tokens signed so far.
    pub fn signings(&self) -> u64 {
        self.signings.load(Ordering::SeqCst)
    }

    /// Fingerprint of the public half of the key, computed once.
    pub fn public_key_fingerprint(&self) -> Result<String> {
        if let Some(fp) = self.fingerprint.get() {
            return Ok(fp.clone());
        }
        let fp = fingerprint_from_pem(&self.credentials.private_key_pem)?;
        Ok(self.fingerprint.get_or_init(|| fp).clone())
    }

    pub fn claims_at(&self, now: u64) -> Result<Claims> {
        let subject = format!(
            "{}.{}",
            self.credentials.qualified_account(),
            self.credentials.user.to_uppercase()
        );
        Ok(Claims {
            iss: format!("{}.{}", subject, self.public_key_fingerprint()?),
            sub: subject,
            iat: now,
            exp: now + self.ttl.as_secs(),
        })
    }

    fn cached(&self, now: u64) -> Option<String> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|t| t.is_valid_at(now))
            .map(|t| t.token.clone())
    }

    /// Signing key parsed from the PEM on first use and kept for the client's lifetime.
    fn encoding_key(&self) -> Result<&EncodingKey> {
        if let Some(key) = self.encoding_key.get() {
            return Ok(key);
        }
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key_pem.as_bytes())
            .map_err(|e| ClientError::InvalidKey(e.to_string()))?;
        debug!("Parsed signing key");
        Ok(self.encoding_key.get_or_init(|| key))
    }

    fn sign(&self, now: u64) -> Result<AuthToken> {
        let claims = self.claims_at(now)?;
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, self.encoding_key()?)
            .map_err(|e| ClientError::InvalidKey(e.to_string()))?;

        self.signings.fetch_add(1, Ordering::SeqCst);
        debug!(sub = %claims.sub, exp = claims.exp, "Signed new auth token");

        Ok(AuthToken {
            token,
            expires_at: claims.exp,
        })
    }
}

/// `SHA256:` + base64 of the SHA-256 digest of the DER-encoded public key.
pub fn fingerprint_from_pem(private_key_pem: &str) -> Result<String> {
    let key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
        .map_err(|e| ClientError::InvalidKey(e.to_string()))?;
    let der = key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| ClientError::InvalidKey(e.to_string()))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(format!("SHA256:{}", BASE64.encode(digest)))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
