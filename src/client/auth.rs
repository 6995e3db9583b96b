//! Credential signing for venue login frames.
//!
//! The login handshake needs a signature over a venue-defined payload. The
//! stream core only knows the [`Signer`] trait; two implementations ship:
//!
//! - [`HmacSha256Signer`]: base64 HMAC-SHA256 with the API secret (Coincatch,
//!   Bitget, OKX family)
//! - [`RsaPssSigner`]: base64 RSA-PSS/SHA-256 with a PKCS#8 private key
//!
//! # Example
//!
//! ```rust
//! use market_sync::client::auth::{HmacSha256Signer, Signer};
//!
//! let signer = HmacSha256Signer::new("secret");
//! let signature = signer.sign("1700000000GET/user/verify").unwrap();
//! assert_eq!(signature, "asp8h2LSGzNFWF9BshQJj0WiZA5uDIWsAk9FCfz2Ilk=");
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::SigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use crate::error::Error;

/// Produces the signature carried by a login frame
pub trait Signer: Send + Sync + fmt::Debug {
    /// Sign `payload`, returning the encoded signature
    fn sign(&self, payload: &str) -> Result<String, Error>;
}

/// HMAC-SHA256 signer, base64 output
pub struct HmacSha256Signer {
    secret: String,
}

impl HmacSha256Signer {
    /// Create a signer from the API secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for HmacSha256Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSha256Signer")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Signer for HmacSha256Signer {
    fn sign(&self, payload: &str) -> Result<String, Error> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())?;
        mac.update(payload.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

/// RSA-PSS signer, base64 output
#[derive(Debug)]
pub struct RsaPssSigner {
    signing_key: SigningKey<Sha256>,
}

impl RsaPssSigner {
    /// Create a new signer from a PEM-encoded private key
    ///
    /// # Arguments
    ///
    /// * `private_key_pem` - RSA private key in PEM format (PKCS#8)
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM cannot be parsed as a valid RSA private key.
    pub fn new(private_key_pem: &str) -> Result<Self, Error> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)?;
        Ok(Self::from_key(private_key))
    }

    /// Create a signer from an already parsed key
    pub fn from_key(private_key: RsaPrivateKey) -> Self {
        Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
        }
    }
}

impl Signer for RsaPssSigner {
    fn sign(&self, payload: &str) -> Result<String, Error> {
        let mut rng = rand::thread_rng();
        let signature = self.signing_key.sign_with_rng(&mut rng, payload.as_bytes());
        Ok(BASE64.encode(signature.to_bytes()))
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
